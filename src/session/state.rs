use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

use crate::classifier::ClassificationResult;
use crate::error::TransitionError;
use crate::interpret::Outcome;
use crate::liveness::LivenessRecord;
use crate::progress::Progress;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
    Degraded,
    Stopped,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Connecting => "Connecting",
            SessionStatus::Active => "Active",
            SessionStatus::Degraded => "Degraded",
            SessionStatus::Stopped => "Stopped",
        }
    }

    /// Connected and sampling.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Degraded)
    }

    /// Anything a stop request has to tear down.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Active | SessionStatus::Degraded
        )
    }

    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Idle, Connecting)
                | (Stopped, Connecting)
                | (Connecting, Active)
                | (Connecting, Stopped)
                | (Active, Degraded)
                | (Degraded, Active)
                | (Active, Stopped)
                | (Degraded, Stopped)
                | (Stopped, Idle)
        )
    }
}

/// Identity of one start..stop cycle. Late continuations compare their
/// token with the current one before touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeTally {
    pub matches: u32,
    pub mismatches: u32,
    pub no_detections: u32,
    pub errors: u32,
}

impl OutcomeTally {
    pub fn count(&mut self, outcome: &Outcome) {
        let slot = match outcome {
            Outcome::Match { .. } => &mut self.matches,
            Outcome::Mismatch { .. } => &mut self.mismatches,
            Outcome::NoDetection => &mut self.no_detections,
            Outcome::Error { .. } => &mut self.errors,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Everything the controller knows about the current session. Only the
/// transition methods below change `status`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub token: Option<SessionToken>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub progress: Progress,
    pub tally: OutcomeTally,
    pub status_text: String,
    pub feedback: Option<String>,
    pub last_result: Option<ClassificationResult>,
    pub liveness: LivenessRecord,
    /// When the session last entered Active from Connecting.
    pub active_since: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            status_text: "Disconnected".into(),
            ..Self::default()
        }
    }

    fn transition(&mut self, to: SessionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// True while `token` owns a connected session.
    pub fn is_current_live(&self, token: SessionToken) -> bool {
        self.token == Some(token) && self.status.is_live()
    }

    /// Idle/Stopped -> Connecting. Drops everything from the previous run.
    pub fn begin(&mut self, token: SessionToken, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Connecting)?;
        self.token = Some(token);
        self.started_at = Some(now);
        self.stopped_at = None;
        self.progress.clear();
        self.tally = OutcomeTally::default();
        self.feedback = None;
        self.last_result = None;
        self.liveness = LivenessRecord::default();
        self.active_since = None;
        self.status_text = "Connecting to classifier...".into();
        Ok(())
    }

    /// Connecting -> Active after a successful probe.
    pub fn activate(
        &mut self,
        now: Instant,
        first_target: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Active)?;
        self.active_since = Some(now);
        self.progress.set_target(first_target);
        self.status_text = "Connected".into();
        Ok(())
    }

    /// Connecting -> Stopped when the probe fails.
    pub fn fail_connect(
        &mut self,
        now: DateTime<Utc>,
        message: String,
    ) -> Result<(), TransitionError> {
        if self.status != SessionStatus::Connecting {
            return Err(TransitionError {
                from: self.status,
                to: SessionStatus::Stopped,
            });
        }
        self.transition(SessionStatus::Stopped)?;
        self.stopped_at = Some(now);
        self.status_text = "Connection failed".into();
        self.feedback = Some(message);
        Ok(())
    }

    /// Active -> Degraded. The liveness record is left untouched.
    pub fn degrade(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Degraded)?;
        self.status_text = "Waiting for data...".into();
        self.feedback = Some("No recent data from the device. Please check your device.".into());
        Ok(())
    }

    /// Degraded -> Active once data flows again.
    pub fn recover(&mut self) -> Result<(), TransitionError> {
        if self.status != SessionStatus::Degraded {
            return Err(TransitionError {
                from: self.status,
                to: SessionStatus::Active,
            });
        }
        self.transition(SessionStatus::Active)?;
        self.status_text = "Connected".into();
        Ok(())
    }

    /// Connecting/Active/Degraded -> Stopped on an explicit stop. Counters
    /// stay readable until the next start or [`SessionState::reset`].
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Stopped)?;
        self.stopped_at = Some(now);
        self.progress.expected_target = None;
        self.progress.settling = false;
        self.status_text = "Disconnected".into();
        self.feedback = None;
        Ok(())
    }

    /// Stopped -> Idle, forgetting the finished session.
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Idle)?;
        *self = Self::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connecting() -> (SessionState, SessionToken) {
        let mut state = SessionState::new();
        let token = SessionToken::new();
        state.begin(token, Utc::now()).unwrap();
        (state, token)
    }

    #[test]
    fn no_shortcut_from_idle_to_active() {
        let mut state = SessionState::new();
        let err = state.activate(Instant::now(), Some("B".into())).unwrap_err();
        assert_eq!(err.from, SessionStatus::Idle);
        assert_eq!(err.to, SessionStatus::Active);
        assert_eq!(state.status, SessionStatus::Idle);
    }

    #[test]
    fn degraded_only_from_active() {
        let (mut state, _) = connecting();
        assert!(state.degrade().is_err());
        assert!(state.recover().is_err());
    }

    #[test]
    fn full_lifecycle() {
        let (mut state, token) = connecting();
        assert_eq!(state.status, SessionStatus::Connecting);
        assert!(!state.is_current_live(token));

        state.activate(Instant::now(), Some("B".into())).unwrap();
        assert!(state.is_current_live(token));
        assert_eq!(state.progress.expected_target.as_deref(), Some("B"));

        state.degrade().unwrap();
        assert_eq!(state.status, SessionStatus::Degraded);
        assert_eq!(state.progress.expected_target.as_deref(), Some("B"));

        state.recover().unwrap();
        assert_eq!(state.status, SessionStatus::Active);

        state.stop(Utc::now()).unwrap();
        assert_eq!(state.status, SessionStatus::Stopped);
        assert_eq!(state.progress.expected_target, None);
        assert!(!state.is_current_live(token));

        state.reset().unwrap();
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.token, None);
    }

    #[test]
    fn failed_probe_is_terminal_until_restart() {
        let (mut state, _) = connecting();
        state.fail_connect(Utc::now(), "unreachable".into()).unwrap();
        assert_eq!(state.status, SessionStatus::Stopped);
        assert_eq!(state.feedback.as_deref(), Some("unreachable"));
        assert!(state.activate(Instant::now(), None).is_err());

        let token = SessionToken::new();
        state.begin(token, Utc::now()).unwrap();
        assert_eq!(state.status, SessionStatus::Connecting);
        assert_eq!(state.feedback, None);
    }

    #[test]
    fn begin_clears_previous_counters() {
        let (mut state, _) = connecting();
        state.activate(Instant::now(), Some("A".into())).unwrap();
        state.progress.completed_count = 4;
        state.stop(Utc::now()).unwrap();
        assert_eq!(state.progress.completed_count, 4);

        state.begin(SessionToken::new(), Utc::now()).unwrap();
        assert_eq!(state.progress.completed_count, 0);
        assert_eq!(state.progress.round, 0);
    }

    #[test]
    fn running_session_cannot_begin_again() {
        let (mut state, _) = connecting();
        assert!(state.begin(SessionToken::new(), Utc::now()).is_err());
    }

    #[test]
    fn stop_from_idle_is_rejected() {
        let mut state = SessionState::new();
        assert!(state.stop(Utc::now()).is_err());
    }
}
