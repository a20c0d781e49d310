use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::controller::TickStats;
use super::{SampleHandler, SampleSource};

// Set to false to silence per-tick logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const CAPTURE_TIMEOUT_SECS: u64 = 10;

/// Fixed-period capture loop. A tick that finds the previous submission
/// still running is dropped, so at most one submission exists at a time.
pub async fn acquisition_loop(
    period: Duration,
    source: Arc<dyn SampleSource>,
    handler: Arc<dyn SampleHandler>,
    cancel_token: CancellationToken,
    stats: Arc<TickStats>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("acquisition loop ({}) shutting down", source.name());
                break;
            }
            _ = ticker.tick() => {
                let busy = in_flight.as_ref().is_some_and(|handle| !handle.is_finished());
                if busy {
                    stats.record_skip();
                    log_debug!("previous {} submission still in flight, skipping tick", source.name());
                } else {
                    stats.record_issue();
                    in_flight = Some(tokio::spawn(submit(
                        Arc::clone(&source),
                        Arc::clone(&handler),
                        cancel_token.clone(),
                    )));
                }
            }
        }
    }

    if let Some(handle) = in_flight.take() {
        handle.abort();
        let _ = handle.await;
    }
    source.release();
}

async fn submit(
    source: Arc<dyn SampleSource>,
    handler: Arc<dyn SampleHandler>,
    cancel_token: CancellationToken,
) {
    let capture_start = Instant::now();
    let sample = match tokio::time::timeout(
        Duration::from_secs(CAPTURE_TIMEOUT_SECS),
        source.capture(),
    )
    .await
    {
        Ok(Ok(sample)) => sample,
        Ok(Err(err)) => {
            log_error!("{} capture failed: {err:?}", source.name());
            if !cancel_token.is_cancelled() {
                handler.capture_failed(format!("{err:#}")).await;
            }
            return;
        }
        Err(_) => {
            log_warn!("{} capture timeout (> {}s)", source.name(), CAPTURE_TIMEOUT_SECS);
            if !cancel_token.is_cancelled() {
                handler
                    .capture_failed(format!("no sample within {CAPTURE_TIMEOUT_SECS}s"))
                    .await;
            }
            return;
        }
    };

    if cancel_token.is_cancelled() {
        return;
    }

    log_debug!(
        "captured {} sample in {}ms",
        sample.kind(),
        capture_start.elapsed().as_millis()
    );
    handler.handle(sample).await;
}
