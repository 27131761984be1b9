//! Lifecycle events for real-time displays.
//!
//! RULE: Events are an optimization, never a correctness mechanism.
//! The engine emits after commit and ignores delivery failures; every
//! display must still be able to rebuild its view by polling the store.

use crate::{
    model::TurnStatus,
    priority::PriorityTier,
    types::{AreaId, CounterId, OperatorId, ProcedureId, Timestamp, TurnId},
};
use serde::{Deserialize, Serialize};
use std::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Public view of a turn, safe to put on a waiting-room screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub turn_id: TurnId,
    pub visible_number: u32,
    pub status: TurnStatus,
    /// Person's name, or "N° <number>" for anonymous turns.
    pub display_name: String,
    pub procedure_id: ProcedureId,
    pub procedure_name: String,
    pub area_id: AreaId,
    pub area_name: String,
    pub counter_id: Option<CounterId>,
    pub counter_name: Option<String>,
    pub priority: PriorityTier,
    pub created_at: Timestamp,
}

/// Every event the desk emits.
/// Variants may be added, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TurnCreated {
        turn: TurnSnapshot,
    },
    TurnCalled {
        turn: TurnSnapshot,
        operator_id: OperatorId,
        /// True when an already-called turn is announced again.
        recall: bool,
    },
    TurnInProgress {
        turn: TurnSnapshot,
    },
    TurnCompleted {
        turn: TurnSnapshot,
        close_reason: Option<String>,
    },
    TurnNoShow {
        turn: TurnSnapshot,
        /// True when the expiry sweeper, not an operator, closed it.
        expired: bool,
    },
    TurnUpdated {
        turn: TurnSnapshot,
        change: String,
    },
}

impl TurnEvent {
    pub fn turn(&self) -> &TurnSnapshot {
        match self {
            Self::TurnCreated { turn }
            | Self::TurnCalled { turn, .. }
            | Self::TurnInProgress { turn }
            | Self::TurnCompleted { turn, .. }
            | Self::TurnNoShow { turn, .. }
            | Self::TurnUpdated { turn, .. } => turn,
        }
    }
}

/// Stable name for an event variant, matching its serde tag.
pub fn event_type_name(event: &TurnEvent) -> &'static str {
    match event {
        TurnEvent::TurnCreated { .. } => "turn_created",
        TurnEvent::TurnCalled { .. } => "turn_called",
        TurnEvent::TurnInProgress { .. } => "turn_in_progress",
        TurnEvent::TurnCompleted { .. } => "turn_completed",
        TurnEvent::TurnNoShow { .. } => "turn_no_show",
        TurnEvent::TurnUpdated { .. } => "turn_updated",
    }
}

/// What a notifier actually receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Lets displays drop duplicates.
    pub event_id: Uuid,
    pub emitted_at: Timestamp,
    #[serde(flatten)]
    pub event: TurnEvent,
}

impl EventEnvelope {
    pub fn new(event: TurnEvent, emitted_at: Timestamp) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            emitted_at,
            event,
        }
    }
}

/// Fire-and-forget sink. Implementations must not block for long and must
/// swallow their own failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, envelope: &EventEnvelope);
}

/// Drops everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _envelope: &EventEnvelope) {}
}

/// Writes each event as one JSON line through the `log` facade.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, envelope: &EventEnvelope) {
        match serde_json::to_string(envelope) {
            Ok(json) => log::info!(target: "turnero::events", "{json}"),
            Err(e) => log::warn!("Dropping unserializable event: {e}"),
        }
    }
}

/// Forwards events to an in-process consumer (display thread, bridge).
/// A disconnected receiver is not an error.
pub struct ChannelNotifier {
    tx: Mutex<mpsc::Sender<EventEnvelope>>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, envelope: &EventEnvelope) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if tx.send(envelope.clone()).is_err() {
            log::debug!("Event receiver gone; dropping {}", event_type_name(&envelope.event));
        }
    }
}

/// Keeps every event in memory. Used by tests and the runner summary.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|e| event_type_name(&e.event))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, envelope: &EventEnvelope) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(envelope.clone());
    }
}
