use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::progress::SessionMode;
use crate::session::OutcomeTally;

/// What a finished session achieved, handed back from `stop()`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub completed_count: u32,
    /// Targets presented, including the one abandoned by the stop.
    pub rounds: u32,
    pub tally: OutcomeTally,
}

impl SessionSummary {
    pub fn duration_ms(&self) -> i64 {
        (self.stopped_at - self.started_at).num_milliseconds().max(0)
    }
}
