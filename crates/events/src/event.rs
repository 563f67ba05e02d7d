use chrono::{DateTime, Utc};

/// A fact emitted by a successful ledger mutation.
///
/// Events are immutable and versioned. They describe what already happened;
/// observers may rely on them but the ledger state never depends on them.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "custody.ledger.deposited").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the operation was accepted.
    fn occurred_at(&self) -> DateTime<Utc>;
}
