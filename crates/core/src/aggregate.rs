//! Aggregate traits: identity, versioning and the decide/evolve split.

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied to this aggregate so far.
    fn version(&self) -> u64;
}

/// Aggregate execution semantics.
///
/// - **Decision logic**: `handle(&self, cmd)` validates a command against the
///   current state and returns the events it would produce. No mutation.
/// - **State mutation**: `apply(&mut self, event)` evolves state. It must not
///   fail; every check belongs in `handle`.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
