pub mod controller;
pub mod loop_worker;
pub mod sources;

pub use controller::{AcquisitionScheduler, TickStats};
pub use sources::{DeviceStreamSource, FrameDirSource, SimulatedGloveSource};

use anyhow::Result;
use async_trait::async_trait;

use crate::classifier::Sample;

/// Produces one [`Sample`] per scheduler tick.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn capture(&self) -> Result<Sample>;

    /// Frees whatever the source holds (device handles, cached frames).
    /// Called once when the scheduler tears down.
    fn release(&self) {}

    fn name(&self) -> &'static str;
}

/// Receives each captured sample. The scheduler never runs two `handle`
/// calls at once.
#[async_trait]
pub trait SampleHandler: Send + Sync {
    async fn handle(&self, sample: Sample);

    /// Called instead of `handle` when the tick's capture failed or timed out.
    async fn capture_failed(&self, _message: String) {}
}
