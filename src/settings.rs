use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

pub const CONFIG_ENV: &str = "SPEAKEZ_CONFIG";
pub const CLASSIFIER_URL_ENV: &str = "SPEAKEZ_CLASSIFIER_URL";

/// Static ASL letters: the alphabet minus the motion letters J and Z.
const DEFAULT_PRACTICE_SET: &[&str] = &[
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T",
    "U", "V", "W", "X", "Y",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierSettings {
    pub base_url: String,
    pub health_path: String,
    /// Queried after the health check when set; pairing mode only.
    pub device_status_path: Option<String>,
    pub frame_path: String,
    pub sensor_path: String,
    pub latest_path: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            health_path: "/health".into(),
            device_status_path: Some("/esp32/status".into()),
            frame_path: "/predict".into(),
            sensor_path: "/esp32/predict".into(),
            latest_path: "/esp32/latest".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    pub dir: PathBuf,
    pub extension: String,
    /// Labels that have no recording.
    pub silent_labels: Vec<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("audio"),
            extension: "mp3".into(),
            silent_labels: vec!["J".into(), "Z".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerSettings {
    pub poll_interval_ms: u64,
    pub staleness_window_ms: u64,
    pub liveness_check_ms: u64,
    pub match_threshold: f32,
    pub settle_delay_ms: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub practice_set: Vec<String>,
    pub audio_enabled: bool,
    pub audio: AudioSettings,
    pub classifier: ClassifierSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            staleness_window_ms: 10_000,
            liveness_check_ms: 2_000,
            match_threshold: 0.5,
            settle_delay_ms: 1_500,
            probe_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            practice_set: DEFAULT_PRACTICE_SET.iter().map(|s| s.to_string()).collect(),
            audio_enabled: true,
            audio: AudioSettings::default(),
            classifier: ClassifierSettings::default(),
        }
    }
}

impl ControllerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    pub fn liveness_check(&self) -> Duration {
        Duration::from_millis(self.liveness_check_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            bail!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            );
        }
        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("staleness_window_ms", self.staleness_window_ms),
            ("liveness_check_ms", self.liveness_check_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.practice_set.iter().all(|t| t.trim().is_empty()) {
            bail!("practice_set must contain at least one target");
        }
        if self.classifier.base_url.trim().is_empty() {
            bail!("classifier.base_url is empty");
        }
        Ok(())
    }

    /// Applies `SPEAKEZ_CLASSIFIER_URL` on top of whatever was loaded.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(CLASSIFIER_URL_ENV) {
            if !url.trim().is_empty() {
                self.classifier.base_url = url.trim().to_string();
            }
        }
    }
}

/// JSON-backed settings file shared by the CLI and the controller.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ControllerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            ControllerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Resolves the settings path from `SPEAKEZ_CONFIG`, falling back to
    /// `speakez.json` in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("speakez.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn get(&self) -> ControllerSettings {
        self.read().clone()
    }

    pub fn update_audio_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = self.write();
        guard.audio_enabled = enabled;
        self.persist(&guard)
    }

    fn persist(&self, data: &ControllerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, ControllerSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ControllerSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_documented_policy() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.staleness_window(), Duration::from_secs(10));
        assert_eq!(settings.settle_delay(), Duration::from_millis(1500));
        assert_eq!(settings.liveness_check(), Duration::from_secs(2));
        assert_eq!(settings.match_threshold, 0.5);
        assert!(!settings.practice_set.contains(&"J".to_string()));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speakez.json");
        fs::write(&path, r#"{"match_threshold": 0.8, "practice_set": ["A", "B"]}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.get();
        assert_eq!(settings.match_threshold, 0.8);
        assert_eq!(settings.practice_set, vec!["A", "B"]);
        assert_eq!(settings.poll_interval_ms, 2_000);
        assert_eq!(settings.classifier.base_url, "http://localhost:5000");
    }

    #[test]
    fn audio_toggle_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speakez.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store.update_audio_enabled(false).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert!(!reopened.get().audio_enabled);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut settings = ControllerSettings::default();
        settings.match_threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        settings.poll_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        settings.practice_set = vec![" ".into()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speakez.json");
        fs::write(&path, "{not json").unwrap();
        assert!(SettingsStore::new(path).is_err());
    }
}
