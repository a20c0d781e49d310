use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// One unit of raw input produced by an acquisition tick.
///
/// Samples are moved into the submission and dropped once the request has
/// been issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// JPEG-encoded camera frame.
    Frame(Vec<u8>),
    /// Flex-sensor readings, one per finger (thumb to pinky).
    Sensor(Vec<u16>),
    /// No local capture: ask the classifier for the device's latest prediction.
    Pull,
}

impl Sample {
    pub fn kind(&self) -> &'static str {
        match self {
            Sample::Frame(_) => "frame",
            Sample::Sensor(_) => "sensor",
            Sample::Pull => "pull",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub detected: bool,
    pub label: Option<String>,
    pub confidence: f32,
    pub raised_error: Option<ClassifierError>,
}

impl ClassificationResult {
    pub fn detection(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            detected: true,
            label: Some(label.into()),
            confidence: confidence.clamp(0.0, 1.0),
            raised_error: None,
        }
    }

    pub fn nothing() -> Self {
        Self {
            detected: false,
            label: None,
            confidence: 0.0,
            raised_error: None,
        }
    }

    pub fn failed(err: ClassifierError) -> Self {
        Self {
            detected: false,
            label: None,
            confidence: 0.0,
            raised_error: Some(err),
        }
    }

    /// Only error-free detections count as a sign of life from the source.
    pub fn is_success(&self) -> bool {
        self.detected && self.raised_error.is_none()
    }
}

/// Prediction body as returned by the classifier backend.
#[derive(Debug, Deserialize)]
pub(crate) struct WirePrediction {
    detected: Option<bool>,
    #[serde(alias = "label")]
    prediction: Option<String>,
    confidence: Option<f64>,
    error: Option<String>,
}

impl WirePrediction {
    pub(crate) fn into_result(self) -> Result<ClassificationResult, ClassifierError> {
        if let Some(message) = self.error {
            return Ok(ClassificationResult::failed(ClassifierError::Transport(
                message,
            )));
        }

        let detected = self
            .detected
            .ok_or_else(|| ClassifierError::Malformed("missing `detected` field".into()))?;

        let confidence = match self.confidence {
            Some(value) if !value.is_finite() => {
                return Err(ClassifierError::Malformed(format!(
                    "confidence is not a number: {value}"
                )))
            }
            Some(value) => value.clamp(0.0, 1.0) as f32,
            None => 0.0,
        };

        let label = self
            .prediction
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());

        Ok(ClassificationResult {
            detected,
            label,
            confidence,
            raised_error: None,
        })
    }
}

/// Informational device status reported by the backend during the probe.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceStatus {
    #[serde(default, rename = "esp32_model_loaded")]
    pub model_loaded: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub reachable: bool,
    pub device: Option<DeviceStatus>,
}

impl Probe {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            device: None,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            device: None,
        }
    }
}
