//! `custody-events` — notification records and their distribution.
//!
//! The ledger emits facts (`Event`s); this crate wraps them in ordered
//! envelopes and fans them out to subscribers through an `EventBus`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
