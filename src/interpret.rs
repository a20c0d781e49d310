//! Turns a raw [`ClassificationResult`] into what it means for the current
//! prompt.

use serde::Serialize;

use crate::classifier::ClassificationResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outcome {
    Match {
        label: String,
        confidence: f32,
    },
    /// Something was detected but it is not an acceptable answer. The label
    /// and confidence are passed through untouched for display.
    Mismatch {
        label: Option<String>,
        confidence: f32,
    },
    NoDetection,
    Error {
        message: String,
    },
}

impl Outcome {
    /// Label worth voicing, for Match and Mismatch only.
    pub fn spoken_label(&self) -> Option<&str> {
        match self {
            Outcome::Match { label, .. } => Some(label),
            Outcome::Mismatch { label, .. } => label.as_deref(),
            Outcome::NoDetection | Outcome::Error { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Outcome::Match { .. })
    }
}

/// Classifies `result` against `expected`.
///
/// A Match needs the exact expected label and a confidence strictly above
/// `threshold`; a confidence equal to the threshold is a Mismatch.
pub fn interpret(result: &ClassificationResult, expected: Option<&str>, threshold: f32) -> Outcome {
    if let Some(err) = &result.raised_error {
        return Outcome::Error {
            message: err.to_string(),
        };
    }

    if !result.detected {
        return Outcome::NoDetection;
    }

    match (result.label.as_deref(), expected) {
        (Some(label), Some(target)) if label == target && result.confidence > threshold => {
            Outcome::Match {
                label: label.to_string(),
                confidence: result.confidence,
            }
        }
        _ => Outcome::Mismatch {
            label: result.label.clone(),
            confidence: result.confidence,
        },
    }
}
