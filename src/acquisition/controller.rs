use anyhow::{bail, Context, Result};
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::acquisition_loop;
use super::{SampleHandler, SampleSource};

/// Counters exposing how often ticks were issued or dropped for overlap.
#[derive(Debug, Default)]
pub struct TickStats {
    issued: AtomicU64,
    skipped: AtomicU64,
}

impl TickStats {
    pub(crate) fn record_issue(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Owns the periodic acquisition task of one session.
pub struct AcquisitionScheduler {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    stats: Arc<TickStats>,
}

impl AcquisitionScheduler {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            stats: Arc::new(TickStats::default()),
        }
    }

    pub fn start(
        &mut self,
        period: Duration,
        source: Arc<dyn SampleSource>,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("acquisition already active");
        }
        if period.is_zero() {
            bail!("acquisition period must be greater than zero");
        }

        info!(
            "Starting {} acquisition every {}ms",
            source.name(),
            period.as_millis()
        );

        let cancel_token = CancellationToken::new();
        let stats = Arc::new(TickStats::default());
        let handle = tokio::spawn(acquisition_loop(
            period,
            source,
            handler,
            cancel_token.clone(),
            Arc::clone(&stats),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.stats = stats;
        Ok(())
    }

    /// Signals the loop to exit and hands back its task without waiting.
    /// The loop releases the source once it has dropped its in-flight
    /// submission.
    pub fn halt(&mut self) -> Option<JoinHandle<()>> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handle.take()
    }

    /// Safe from any state and any number of times. Returns once the loop
    /// has exited, its in-flight submission is gone and the source released.
    pub async fn stop(&mut self) -> Result<()> {
        match self.halt() {
            Some(handle) => handle
                .await
                .context("acquisition loop task failed to join"),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stats(&self) -> Arc<TickStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for AcquisitionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AcquisitionScheduler {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
