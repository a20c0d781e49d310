use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionStatus;

/// Failure of a single request to the remote classifier.
///
/// Carried inside [`crate::classifier::ClassificationResult`] so it has to be
/// cheap to clone and serialisable for the "last received" diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ClassifierError {
    #[error("classifier unreachable: {0}")]
    Unreachable(String),
    #[error("classifier did not answer in time")]
    Timeout,
    #[error("classifier answered with status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("malformed classifier response: {0}")]
    Malformed(String),
    #[error("classifier transport error: {0}")]
    Transport(String),
    #[error("sample capture failed: {0}")]
    Capture(String),
}

impl ClassifierError {
    /// True for bodies that could not be decoded into a prediction.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ClassifierError::Malformed(_))
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClassifierError::Timeout
        } else if err.is_connect() {
            ClassifierError::Unreachable(err.to_string())
        } else if err.is_decode() {
            ClassifierError::Malformed(err.to_string())
        } else {
            ClassifierError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("classifier capability unreachable: {0}")]
    CapabilityUnreachable(String),
    #[error("classifier probe timed out after {0} ms")]
    ProbeTimeout(u64),
    #[error("malformed probe response: {0}")]
    MalformedResponse(String),
    #[error("session already running ({0:?})")]
    AlreadyRunning(SessionStatus),
    #[error("no running session")]
    NotRunning,
    #[error("session start was cancelled")]
    Cancelled,
    #[error("practice set has no targets")]
    NoTargets,
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ControllerError {
    /// Classifies a failed probe into the user-facing Connecting -> Stopped
    /// reason.
    pub fn from_probe_failure(err: ClassifierError, timeout_ms: u64) -> Self {
        match err {
            ClassifierError::Malformed(detail) => ControllerError::MalformedResponse(detail),
            ClassifierError::Timeout => ControllerError::ProbeTimeout(timeout_ms),
            other => ControllerError::CapabilityUnreachable(other.to_string()),
        }
    }

    /// Text shown to the user next to the "Connection failed" status.
    pub fn user_message(&self) -> String {
        match self {
            ControllerError::CapabilityUnreachable(_) => {
                "Failed to connect. Please check your device and the classifier backend.".into()
            }
            ControllerError::ProbeTimeout(_) => {
                "Connection timed out. The classifier backend did not answer.".into()
            }
            ControllerError::MalformedResponse(_) => {
                "Connected, but the classifier answered with an unexpected response.".into()
            }
            ControllerError::NoTargets => {
                "There is nothing to practise. Add letters to the practice set.".into()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_failures_map_to_distinct_reasons() {
        assert!(matches!(
            ControllerError::from_probe_failure(ClassifierError::Unreachable("refused".into()), 5_000),
            ControllerError::CapabilityUnreachable(_)
        ));
        assert!(matches!(
            ControllerError::from_probe_failure(ClassifierError::Malformed("no json".into()), 5_000),
            ControllerError::MalformedResponse(_)
        ));
        assert!(matches!(
            ControllerError::from_probe_failure(ClassifierError::Timeout, 5_000),
            ControllerError::ProbeTimeout(5_000)
        ));
        assert!(matches!(
            ControllerError::from_probe_failure(ClassifierError::Status {
                code: 503,
                body: String::new()
            }, 5_000),
            ControllerError::CapabilityUnreachable(_)
        ));
    }

    #[test]
    fn classifier_error_round_trips_through_json() {
        let err = ClassifierError::Status {
            code: 500,
            body: "boom".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(serde_json::from_str::<ClassifierError>(&json).unwrap(), err);
    }
}
