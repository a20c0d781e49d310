use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::session::{SessionController, SessionToken};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Recency of the last successful detection for the running session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessRecord {
    pub last_success_at: Option<Instant>,
}

impl LivenessRecord {
    pub fn record_success(&mut self, at: Instant) {
        self.last_success_at = Some(at);
    }

    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_success_at
            .map(|at| now.saturating_duration_since(at))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Fresh,
    Stale,
}

/// Pure staleness check. Before the first success the session's activation
/// time stands in for `last_success_at`.
pub fn assess(
    record: &LivenessRecord,
    active_since: Instant,
    now: Instant,
    window: Duration,
) -> Liveness {
    let reference = record.last_success_at.unwrap_or(active_since);
    if now.saturating_duration_since(reference) >= window {
        Liveness::Stale
    } else {
        Liveness::Fresh
    }
}

/// Periodically asks the controller to re-evaluate liveness for `token`.
/// Ends on cancellation or once the session it was started for is gone.
pub fn spawn_liveness_monitor(
    controller: SessionController,
    token: SessionToken,
    every: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log_debug!("liveness monitor for {} cancelled", token);
                    break;
                }
                _ = ticker.tick() => {
                    if !controller.check_liveness(token, Instant::now()).await {
                        log_info!("liveness monitor for {} no longer applies, exiting", token);
                        break;
                    }
                }
            }
        }
    })
}
