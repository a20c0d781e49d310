pub mod http;
pub mod types;

pub use http::HttpClassifier;
pub use types::{ClassificationResult, DeviceStatus, Probe, Sample};

use async_trait::async_trait;

use crate::error::ClassifierError;

/// The remote prediction service as seen by the session controller.
///
/// Implementations only move data; interpreting a result against the current
/// target is the controller's job.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Reachability check, performed once while the session is Connecting.
    async fn probe(&self) -> Result<Probe, ClassifierError>;

    /// Submits one captured sample for classification.
    async fn classify(&self, sample: &Sample) -> Result<ClassificationResult, ClassifierError>;

    /// Pulls the most recent prediction made for the paired device.
    async fn fetch_latest(&self) -> Result<ClassificationResult, ClassifierError>;
}
