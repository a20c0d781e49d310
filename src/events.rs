use serde::Serialize;
use tokio::sync::broadcast;

use crate::interpret::Outcome;
use crate::session::SessionSnapshot;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControllerEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged { snapshot: SessionSnapshot },
    #[serde(rename_all = "camelCase")]
    OutcomeReported {
        session_id: String,
        outcome: Outcome,
        feedback: String,
    },
    #[serde(rename_all = "camelCase")]
    TargetAdvanced {
        session_id: String,
        target: Option<String>,
        round: u32,
    },
}

impl ControllerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerEvent::StateChanged { .. } => "session-state-changed",
            ControllerEvent::OutcomeReported { .. } => "outcome-reported",
            ControllerEvent::TargetAdvanced { .. } => "target-advanced",
        }
    }
}

/// Fan-out of controller events to whoever renders them. Emitting with no
/// subscriber is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ControllerEvent) {
        log::trace!("emit {}", event.name());
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
