use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error};

use crate::audio::{AudioLibrary, Playback};
use crate::interpret::Outcome;

/// What the dispatcher will do for one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchPlan {
    pub playback: Option<PlaybackRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub label: String,
    pub resource: PathBuf,
}

impl DispatchPlan {
    pub fn plays_audio(&self) -> bool {
        self.playback.is_some()
    }
}

/// Fires user-facing side effects for interpreted outcomes. It never looks
/// at or changes session state.
#[derive(Clone)]
pub struct Dispatcher {
    library: AudioLibrary,
    playback: Arc<dyn Playback>,
}

impl Dispatcher {
    pub fn new(library: AudioLibrary, playback: Arc<dyn Playback>) -> Self {
        Self { library, playback }
    }

    /// Every Match or Mismatch with a label is voiced while audio is on,
    /// including repeats of the same label.
    pub fn plan(&self, outcome: &Outcome, audio_enabled: bool) -> DispatchPlan {
        if !audio_enabled {
            return DispatchPlan::default();
        }
        let playback = outcome.spoken_label().and_then(|label| {
            self.library
                .resource_for(label)
                .map(|resource| PlaybackRequest {
                    label: label.to_string(),
                    resource,
                })
        });
        DispatchPlan { playback }
    }

    /// Fire-and-forget; failures are logged only.
    pub fn execute(&self, plan: &DispatchPlan) {
        if let Some(request) = &plan.playback {
            debug!(
                "Playing audio for letter {} ({})",
                request.label,
                request.resource.display()
            );
            if let Err(e) = self.playback.play(&request.resource) {
                error!("Error playing audio for {}: {}", request.label, e);
            }
        }
    }

    pub fn release(&self) {
        self.playback.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingPlayback;
    use crate::settings::AudioSettings;

    struct FailingPlayback;

    impl Playback for FailingPlayback {
        fn play(&self, _path: &std::path::Path) -> Result<(), String> {
            Err("playback rejected".into())
        }

        fn release(&self) {}
    }

    fn dispatcher(playback: Arc<dyn Playback>) -> Dispatcher {
        Dispatcher::new(AudioLibrary::new(&AudioSettings::default()), playback)
    }

    #[test]
    fn match_and_mismatch_are_voiced() {
        let recorder = Arc::new(RecordingPlayback::default());
        let dispatcher = dispatcher(recorder.clone());

        for outcome in [
            Outcome::Match {
                label: "B".into(),
                confidence: 0.9,
            },
            Outcome::Mismatch {
                label: Some("W".into()),
                confidence: 0.6,
            },
            Outcome::Mismatch {
                label: Some("W".into()),
                confidence: 0.6,
            },
        ] {
            let plan = dispatcher.plan(&outcome, true);
            assert!(plan.plays_audio());
            dispatcher.execute(&plan);
        }

        let played: Vec<_> = recorder
            .played()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(played, vec!["B.mp3", "W.mp3", "W.mp3"]);
    }

    #[test]
    fn nothing_is_voiced_without_a_label_or_with_audio_off() {
        let dispatcher = dispatcher(Arc::new(RecordingPlayback::default()));
        assert!(!dispatcher.plan(&Outcome::NoDetection, true).plays_audio());
        assert!(!dispatcher
            .plan(
                &Outcome::Error {
                    message: "timeout".into()
                },
                true
            )
            .plays_audio());
        assert!(!dispatcher
            .plan(
                &Outcome::Mismatch {
                    label: None,
                    confidence: 0.4
                },
                true
            )
            .plays_audio());
        assert!(!dispatcher
            .plan(
                &Outcome::Match {
                    label: "B".into(),
                    confidence: 0.9
                },
                false
            )
            .plays_audio());
    }

    #[test]
    fn playback_failure_is_swallowed() {
        let dispatcher = dispatcher(Arc::new(FailingPlayback));
        let plan = dispatcher.plan(
            &Outcome::Match {
                label: "A".into(),
                confidence: 0.9,
            },
            true,
        );
        dispatcher.execute(&plan);
    }
}
