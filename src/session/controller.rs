use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, MutexGuard,
};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    acquisition::{AcquisitionScheduler, SampleHandler, SampleSource, TickStats},
    audio::{AudioLibrary, Playback},
    classifier::{ClassificationResult, Classifier, Sample},
    error::{ClassifierError, ControllerError},
    events::{ControllerEvent, EventBus},
    feedback::Dispatcher,
    interpret::{interpret, Outcome},
    liveness::{assess, spawn_liveness_monitor, Liveness},
    models::SessionSummary,
    progress::{ProgressChange, SessionMode, TargetPolicy},
    settings::ControllerSettings,
};

use super::{OutcomeTally, SessionState, SessionStatus, SessionToken};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub mode: SessionMode,
    pub expected_target: Option<String>,
    pub completed_count: u32,
    pub round: u32,
    pub settling: bool,
    pub status_text: String,
    pub feedback: Option<String>,
    pub last_result: Option<ClassificationResult>,
    pub tally: OutcomeTally,
    pub audio_enabled: bool,
}

/// Timers owned by the running session besides the scheduler.
#[derive(Default)]
struct Background {
    liveness: Option<(JoinHandle<()>, CancellationToken)>,
    settle: Option<JoinHandle<()>>,
}

/// Drives one recognition session at a time: probe, periodic acquisition,
/// interpretation, progress, liveness and feedback.
///
/// Lock order is `state` before `scheduler`. The acquisition loop is never
/// joined while `state` is held, because in-flight submissions need `state`
/// to finish.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    settings: Arc<ControllerSettings>,
    classifier: Arc<dyn Classifier>,
    source: Arc<dyn SampleSource>,
    policy: Arc<std::sync::Mutex<Box<dyn TargetPolicy>>>,
    mode: SessionMode,
    dispatcher: Dispatcher,
    scheduler: Arc<Mutex<AcquisitionScheduler>>,
    background: Arc<std::sync::Mutex<Background>>,
    audio_enabled: Arc<AtomicBool>,
    events: EventBus,
}

impl SessionController {
    pub fn new(
        settings: ControllerSettings,
        classifier: Arc<dyn Classifier>,
        source: Arc<dyn SampleSource>,
        policy: Box<dyn TargetPolicy>,
        playback: Arc<dyn Playback>,
    ) -> Self {
        let dispatcher = Dispatcher::new(AudioLibrary::new(&settings.audio), playback);
        let audio_enabled = settings.audio_enabled;
        let mode = policy.mode();

        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            settings: Arc::new(settings),
            classifier,
            source,
            policy: Arc::new(std::sync::Mutex::new(policy)),
            mode,
            dispatcher,
            scheduler: Arc::new(Mutex::new(AcquisitionScheduler::new())),
            background: Arc::new(std::sync::Mutex::new(Background::default())),
            audio_enabled: Arc::new(AtomicBool::new(audio_enabled)),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Relaxed)
    }

    /// Takes effect from the next outcome on.
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::Relaxed);
        info!("Audio feedback {}", if enabled { "enabled" } else { "disabled" });
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    /// Token of the most recent session, for push-based feeds calling
    /// [`SessionController::apply_result`].
    pub async fn current_token(&self) -> Option<SessionToken> {
        self.state.lock().await.token
    }

    pub async fn scheduler_stats(&self) -> Arc<TickStats> {
        self.scheduler.lock().await.stats()
    }

    /// Idle/Stopped -> Connecting -> Active, or -> Stopped when the probe
    /// fails. Returns [`ControllerError::Cancelled`] when a stop or a newer
    /// start overtook the probe.
    pub async fn start(&self) -> Result<SessionSnapshot, ControllerError> {
        let token = SessionToken::new();
        {
            let mut state = self.state.lock().await;
            if state.status.is_running() {
                return Err(ControllerError::AlreadyRunning(state.status));
            }
            if !self.policy().has_targets() {
                return Err(ControllerError::NoTargets);
            }
            state.begin(token, Utc::now())?;
            info!("Session {} connecting ({:?} mode)", token, self.mode);
            let snapshot = self.snapshot_of(&state);
            drop(state);
            self.events.emit(ControllerEvent::StateChanged { snapshot });
        }

        let probe_timeout_ms = self.settings.probe_timeout_ms;
        let probed = match time::timeout(self.settings.probe_timeout(), self.classifier.probe()).await
        {
            Ok(Ok(probe)) if probe.reachable => Ok(probe),
            Ok(Ok(_)) => Err(ControllerError::CapabilityUnreachable(
                "health check rejected".into(),
            )),
            Ok(Err(err)) => Err(ControllerError::from_probe_failure(err, probe_timeout_ms)),
            Err(_) => Err(ControllerError::ProbeTimeout(probe_timeout_ms)),
        };

        let mut state = self.state.lock().await;
        if state.token != Some(token) || state.status != SessionStatus::Connecting {
            debug!("Probe for session {} resolved after it was abandoned", token);
            return Err(ControllerError::Cancelled);
        }

        let probe = match probed {
            Ok(probe) => probe,
            Err(err) => {
                warn!("Session {} failed to connect: {}", token, err);
                state.fail_connect(Utc::now(), err.user_message())?;
                let snapshot = self.snapshot_of(&state);
                let acquisition = self.halt().await;
                drop(state);
                join_acquisition(acquisition).await;
                self.events.emit(ControllerEvent::StateChanged { snapshot });
                return Err(err);
            }
        };

        if let Some(device) = &probe.device {
            info!(
                "Device status: model loaded = {}, {} extra field(s)",
                device.model_loaded,
                device.extra.len()
            );
        }

        let handler = Arc::new(SessionSampleHandler {
            controller: self.clone(),
            token,
        });
        let started = self.scheduler.lock().await.start(
            self.settings.poll_interval(),
            Arc::clone(&self.source),
            handler,
        );
        if let Err(err) = started {
            error!("Session {} could not start acquisition: {:#}", token, err);
            state.fail_connect(Utc::now(), err.to_string())?;
            let snapshot = self.snapshot_of(&state);
            let acquisition = self.halt().await;
            drop(state);
            join_acquisition(acquisition).await;
            self.events.emit(ControllerEvent::StateChanged { snapshot });
            return Err(err.into());
        }

        let first_target = self.policy().next_target();
        state.activate(Instant::now(), first_target.clone())?;
        info!(
            "Session {} active, first target {:?}",
            token, first_target
        );

        let cancel_token = CancellationToken::new();
        let monitor = spawn_liveness_monitor(
            self.clone(),
            token,
            self.settings.liveness_check(),
            cancel_token.clone(),
        );
        self.background().liveness = Some((monitor, cancel_token));

        let snapshot = self.snapshot_of(&state);
        let round = state.progress.round;
        drop(state);

        self.events.emit(ControllerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        self.events.emit(ControllerEvent::TargetAdvanced {
            session_id: token.to_string(),
            target: first_target,
            round,
        });
        Ok(snapshot)
    }

    /// Ends the current session from any running state. Safe to call again
    /// or before any start, in which case it only makes sure nothing is
    /// left running and returns `None`.
    pub async fn stop(&self) -> Result<Option<SessionSummary>, ControllerError> {
        let (summary, snapshot, acquisition) = {
            let mut state = self.state.lock().await;
            if !state.status.is_running() {
                let acquisition = self.halt().await;
                drop(state);
                join_acquisition(acquisition).await;
                return Ok(None);
            }

            let was_connecting = state.status == SessionStatus::Connecting;
            state.stop(Utc::now())?;
            info!(
                "Session {} stopped after {} completed",
                state.token.map(|t| t.to_string()).unwrap_or_default(),
                state.progress.completed_count
            );

            let summary = if was_connecting {
                None
            } else {
                self.summary_of(&state)
            };
            (summary, self.snapshot_of(&state), self.halt().await)
        };

        join_acquisition(acquisition).await;
        self.events.emit(ControllerEvent::StateChanged { snapshot });
        Ok(summary)
    }

    /// Stopped -> Idle.
    pub async fn reset(&self) -> Result<SessionSnapshot, ControllerError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.reset()?;
            self.snapshot_of(&state)
        };
        self.events.emit(ControllerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Re-rolls the target and zeroes the count without leaving the live
    /// state. A pending settle is dropped.
    pub async fn reset_progress(&self) -> Result<SessionSnapshot, ControllerError> {
        let mut state = self.state.lock().await;
        if !state.status.is_live() {
            return Err(ControllerError::NotRunning);
        }

        if let Some(settle) = self.background().settle.take() {
            settle.abort();
        }

        let target = self.policy().next_target();
        state.progress.completed_count = 0;
        state.progress.set_target(target.clone());
        state.feedback = None;

        let snapshot = self.snapshot_of(&state);
        let round = state.progress.round;
        let session_id = state.token.map(|t| t.to_string()).unwrap_or_default();
        drop(state);

        info!("Progress reset, new target {:?}", target);
        self.events.emit(ControllerEvent::TargetAdvanced {
            session_id,
            target,
            round,
        });
        self.events.emit(ControllerEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Sends one captured sample to the classifier and applies the answer.
    /// Request failures become an `Error` outcome for this tick only.
    pub async fn submit_sample(&self, token: SessionToken, sample: Sample) -> Option<Outcome> {
        if !self.state.lock().await.is_current_live(token) {
            debug!("Dropping {} sample for stale session {}", sample.kind(), token);
            return None;
        }

        let request = async {
            match &sample {
                Sample::Pull => self.classifier.fetch_latest().await,
                other => self.classifier.classify(other).await,
            }
        };

        let result = match time::timeout(self.settings.request_timeout(), request).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!("Classifier request failed: {}", err);
                ClassificationResult::failed(err)
            }
            Err(_) => {
                warn!(
                    "Classifier request timed out after {}ms",
                    self.settings.request_timeout_ms
                );
                ClassificationResult::failed(ClassifierError::Timeout)
            }
        };

        self.apply_result(token, result).await
    }

    /// Feeds one classification result into the session that `token`
    /// belongs to. Returns `None` when that session is no longer live.
    pub async fn apply_result(
        &self,
        token: SessionToken,
        result: ClassificationResult,
    ) -> Option<Outcome> {
        let mut state = self.state.lock().await;
        if !state.is_current_live(token) {
            debug!("Discarding result for stale session {}", token);
            return None;
        }

        state.last_result = Some(result.clone());

        let mut recovered = false;
        if result.is_success() {
            state.liveness.record_success(Instant::now());
            if state.status == SessionStatus::Degraded {
                match state.recover() {
                    Ok(()) => {
                        info!("Session {} receiving data again", token);
                        recovered = true;
                    }
                    Err(err) => warn!("{}", err),
                }
            }
        }

        let expected = state.progress.expected_target.clone();
        let outcome = interpret(&result, expected.as_deref(), self.settings.match_threshold);

        let change = state.progress.record(&outcome);
        state.tally.count(&outcome);

        let plan = self.dispatcher.plan(&outcome, self.audio_enabled());
        let feedback = self
            .policy()
            .feedback(&outcome, expected.as_deref(), plan.plays_audio());
        state.feedback = Some(feedback.clone());

        if change == ProgressChange::Completed {
            debug!(
                "Target {:?} completed ({} so far)",
                expected, state.progress.completed_count
            );
            self.schedule_settle(token);
        }

        let snapshot = recovered.then(|| self.snapshot_of(&state));
        drop(state);

        self.dispatcher.execute(&plan);
        self.events.emit(ControllerEvent::OutcomeReported {
            session_id: token.to_string(),
            outcome: outcome.clone(),
            feedback,
        });
        if let Some(snapshot) = snapshot {
            self.events.emit(ControllerEvent::StateChanged { snapshot });
        }
        Some(outcome)
    }

    /// One liveness evaluation. Returns `false` once `token` no longer owns
    /// a live session, which ends the monitor.
    pub async fn check_liveness(&self, token: SessionToken, now: Instant) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_current_live(token) {
            return false;
        }
        let Some(active_since) = state.active_since else {
            return true;
        };

        let verdict = assess(
            &state.liveness,
            active_since,
            now,
            self.settings.staleness_window(),
        );
        if verdict == Liveness::Stale && state.status == SessionStatus::Active {
            if let Err(err) = state.degrade() {
                warn!("{}", err);
                return true;
            }
            warn!(
                "Session {} degraded: no detection for {:?}",
                token,
                state.liveness.age(now)
            );
            let snapshot = self.snapshot_of(&state);
            drop(state);
            self.events.emit(ControllerEvent::StateChanged { snapshot });
        }
        true
    }

    fn schedule_settle(&self, token: SessionToken) {
        let controller = self.clone();
        let delay = self.settings.settle_delay();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            controller.advance_target(token).await;
        });

        if let Some(previous) = self.background().settle.replace(handle) {
            previous.abort();
        }
    }

    async fn advance_target(&self, token: SessionToken) {
        let mut state = self.state.lock().await;
        if !state.is_current_live(token) || !state.progress.settling {
            debug!("Settle for session {} no longer applies", token);
            return;
        }

        let target = self.policy().next_target();
        state.progress.set_target(target.clone());
        state.feedback = None;
        let round = state.progress.round;
        let snapshot = self.snapshot_of(&state);
        drop(state);

        debug!("Advanced to target {:?} (round {})", target, round);
        self.events.emit(ControllerEvent::TargetAdvanced {
            session_id: token.to_string(),
            target,
            round,
        });
        self.events.emit(ControllerEvent::StateChanged { snapshot });
    }

    /// Cancels every timer of the session, signals the acquisition loop and
    /// frees playback. Called with `state` locked, so a start that follows
    /// cannot lose its own timers or audio. The returned loop handle must be
    /// joined after `state` is released, since the loop's in-flight
    /// submission may be waiting for it.
    async fn halt(&self) -> Option<JoinHandle<()>> {
        let (liveness, settle) = {
            let mut background = self.background();
            (background.liveness.take(), background.settle.take())
        };
        if let Some((handle, cancel_token)) = liveness {
            cancel_token.cancel();
            handle.abort();
        }
        if let Some(handle) = settle {
            handle.abort();
        }

        let acquisition = self.scheduler.lock().await.halt();
        self.dispatcher.release();
        acquisition
    }

    fn policy(&self) -> MutexGuard<'_, Box<dyn TargetPolicy>> {
        self.policy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn background(&self) -> MutexGuard<'_, Background> {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot_of(&self, state: &SessionState) -> SessionSnapshot {
        SessionSnapshot {
            status: state.status,
            session_id: state.token.map(|t| t.to_string()),
            mode: self.mode,
            expected_target: state.progress.expected_target.clone(),
            completed_count: state.progress.completed_count,
            round: state.progress.round,
            settling: state.progress.settling,
            status_text: state.status_text.clone(),
            feedback: state.feedback.clone(),
            last_result: state.last_result.clone(),
            tally: state.tally,
            audio_enabled: self.audio_enabled(),
        }
    }

    fn summary_of(&self, state: &SessionState) -> Option<SessionSummary> {
        Some(SessionSummary {
            id: state.token?.to_string(),
            mode: self.mode,
            started_at: state.started_at?,
            stopped_at: state.stopped_at?,
            completed_count: state.progress.completed_count,
            rounds: state.progress.round,
            tally: state.tally,
        })
    }
}

async fn join_acquisition(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if let Err(err) = handle.await {
            error!("Acquisition loop task failed to join: {}", err);
        }
    }
}

/// Scheduler callback bound to the session it was started for.
struct SessionSampleHandler {
    controller: SessionController,
    token: SessionToken,
}

#[async_trait]
impl SampleHandler for SessionSampleHandler {
    async fn handle(&self, sample: Sample) {
        self.controller.submit_sample(self.token, sample).await;
    }

    async fn capture_failed(&self, message: String) {
        self.controller
            .apply_result(
                self.token,
                ClassificationResult::failed(ClassifierError::Capture(message)),
            )
            .await;
    }
}
