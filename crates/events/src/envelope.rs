use serde::{Deserialize, Serialize};
use uuid::Uuid;

use custody_core::LedgerId;

use crate::event::Event;

/// Envelope for a published event.
///
/// `sequence_number` is strictly increasing per ledger, starting at 1, so
/// observers can detect gaps or duplicates on an at-least-once transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    ledger_id: LedgerId,
    event_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        ledger_id: LedgerId,
        event_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            ledger_id,
            event_type: event_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap `payload` with a fresh event id, taking the type name from the event.
    pub fn wrap(ledger_id: LedgerId, sequence_number: u64, payload: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            ledger_id,
            payload.event_type(),
            sequence_number,
            payload,
        )
    }
}
