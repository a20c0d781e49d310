//! Target selection and the feedback wording for the two session flavours:
//! letter practice (prompted targets) and device pairing (echo whatever the
//! glove signs).

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::interpret::Outcome;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionMode {
    Practice,
    Pairing,
}

/// Decides what the user should sign next and how results are phrased.
///
/// Implementations must be interchangeable behind the same controller.
pub trait TargetPolicy: Send {
    fn mode(&self) -> SessionMode;

    /// Picks the next expected target. `None` means the policy does not
    /// prompt for anything.
    fn next_target(&mut self) -> Option<String>;

    /// False when a prompting policy has nothing left to prompt for; such a
    /// session must not start.
    fn has_targets(&self) -> bool {
        true
    }

    /// Status line for an outcome. `audio_played` reports whether the
    /// dispatcher triggered playback for it.
    fn feedback(&self, outcome: &Outcome, expected: Option<&str>, audio_played: bool) -> String;
}

/// Uniform random choice from the configured practice set. The previous
/// target is not excluded, so repeats happen.
pub struct PracticePolicy {
    targets: Vec<String>,
    rng: StdRng,
}

impl PracticePolicy {
    pub fn new(targets: Vec<String>) -> Self {
        Self::with_rng(targets, StdRng::from_entropy())
    }

    pub fn with_rng(targets: Vec<String>, rng: StdRng) -> Self {
        let targets = targets
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { targets, rng }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

impl TargetPolicy for PracticePolicy {
    fn mode(&self) -> SessionMode {
        SessionMode::Practice
    }

    fn next_target(&mut self) -> Option<String> {
        self.targets.choose(&mut self.rng).cloned()
    }

    fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    fn feedback(&self, outcome: &Outcome, expected: Option<&str>, _audio_played: bool) -> String {
        let target = expected.unwrap_or("?");
        match outcome {
            Outcome::Match { label, confidence } => {
                format!("Correct! That was {} ({:.1}%).", label, confidence * 100.0)
            }
            Outcome::Mismatch {
                label: Some(label),
                confidence,
            } => format!(
                "That looks like {} ({:.1}%). Try {} again.",
                label,
                confidence * 100.0,
                target
            ),
            Outcome::Mismatch { label: None, .. } => {
                format!("Sign not recognised. Try {} again.", target)
            }
            Outcome::NoDetection => format!("No hand detected. Show the sign for {}.", target),
            Outcome::Error { message } => format!("Classifier error: {}", message),
        }
    }
}

/// Pairing mode: nothing to practise, every detected letter is echoed.
#[derive(Debug, Default)]
pub struct EchoPolicy;

impl TargetPolicy for EchoPolicy {
    fn mode(&self) -> SessionMode {
        SessionMode::Pairing
    }

    fn next_target(&mut self) -> Option<String> {
        None
    }

    fn feedback(&self, outcome: &Outcome, _expected: Option<&str>, audio_played: bool) -> String {
        match outcome.spoken_label() {
            Some(label) if audio_played => format!("Letter {} detected! Audio played.", label),
            Some(label) => format!("Letter {} detected!", label),
            None => match outcome {
                Outcome::Error { message } => format!("Classifier error: {}", message),
                _ => "No letter detected".to_string(),
            },
        }
    }
}

/// Effect of one outcome on the session's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressChange {
    Unchanged,
    /// Count was bumped; a new target is due after the settle delay.
    Completed,
}

/// Counters and target owned by one session.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub expected_target: Option<String>,
    pub completed_count: u32,
    /// Number of targets presented so far in this session.
    pub round: u32,
    /// A Match is being held for the settle delay.
    pub settling: bool,
}

impl Progress {
    pub fn set_target(&mut self, target: Option<String>) {
        self.expected_target = target;
        self.round = self.round.saturating_add(1);
        self.settling = false;
    }

    /// Match bumps the count once per target; everything else leaves the
    /// progress alone.
    pub fn record(&mut self, outcome: &Outcome) -> ProgressChange {
        if !outcome.is_match() || self.settling {
            return ProgressChange::Unchanged;
        }
        self.completed_count = self.completed_count.saturating_add(1);
        self.settling = true;
        ProgressChange::Completed
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(targets: &[&str]) -> PracticePolicy {
        PracticePolicy::with_rng(
            targets.iter().map(|t| t.to_string()).collect(),
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn practice_targets_come_from_the_set() {
        let mut policy = seeded(&["A", "B", "C"]);
        for _ in 0..100 {
            let target = policy.next_target().unwrap();
            assert!(["A", "B", "C"].contains(&target.as_str()));
        }
    }

    #[test]
    fn repeats_are_allowed() {
        let mut policy = seeded(&["A", "B"]);
        let picks: Vec<_> = (0..50).filter_map(|_| policy.next_target()).collect();
        assert!(picks.windows(2).any(|w| w[0] == w[1]));
    }

    #[test]
    fn blank_targets_are_ignored() {
        let policy = seeded(&["A", " ", ""]);
        assert_eq!(policy.targets(), &["A".to_string()]);
    }

    #[test]
    fn only_blank_targets_leave_nothing_to_practise() {
        assert!(!seeded(&[" ", ""]).has_targets());
        assert!(seeded(&["A"]).has_targets());
        assert!(EchoPolicy.has_targets());
    }

    #[test]
    fn echo_policy_has_no_target() {
        let mut policy = EchoPolicy;
        assert_eq!(policy.next_target(), None);
        assert_eq!(policy.mode(), SessionMode::Pairing);
    }

    #[test]
    fn echo_feedback_mentions_audio_only_when_played() {
        let outcome = Outcome::Mismatch {
            label: Some("B".into()),
            confidence: 0.9,
        };
        assert_eq!(
            EchoPolicy.feedback(&outcome, None, true),
            "Letter B detected! Audio played."
        );
        assert_eq!(EchoPolicy.feedback(&outcome, None, false), "Letter B detected!");
        assert_eq!(
            EchoPolicy.feedback(&Outcome::NoDetection, None, false),
            "No letter detected"
        );
    }

    #[test]
    fn practice_feedback_shows_confidence_for_mismatch() {
        let policy = seeded(&["B"]);
        let outcome = Outcome::Mismatch {
            label: Some("W".into()),
            confidence: 0.734,
        };
        assert_eq!(
            policy.feedback(&outcome, Some("B"), true),
            "That looks like W (73.4%). Try B again."
        );
    }

    #[test]
    fn match_counts_once_until_next_target() {
        let mut progress = Progress::default();
        progress.set_target(Some("B".into()));
        let hit = Outcome::Match {
            label: "B".into(),
            confidence: 0.8,
        };

        assert_eq!(progress.record(&hit), ProgressChange::Completed);
        assert_eq!(progress.record(&hit), ProgressChange::Unchanged);
        assert_eq!(progress.completed_count, 1);

        progress.set_target(Some("C".into()));
        assert!(!progress.settling);
        assert_eq!(progress.round, 2);
    }

    #[test]
    fn misses_leave_progress_alone() {
        let mut progress = Progress::default();
        progress.set_target(Some("B".into()));
        let before = progress.clone();

        progress.record(&Outcome::NoDetection);
        progress.record(&Outcome::Mismatch {
            label: Some("A".into()),
            confidence: 0.9,
        });
        assert_eq!(progress, before);
    }
}
