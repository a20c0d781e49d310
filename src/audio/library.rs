use std::collections::HashSet;
use std::path::PathBuf;

use crate::settings::AudioSettings;

/// Maps recognised labels to their spoken recording on disk.
#[derive(Debug, Clone)]
pub struct AudioLibrary {
    dir: PathBuf,
    extension: String,
    silent: HashSet<String>,
}

impl AudioLibrary {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            dir: settings.dir.clone(),
            extension: settings.extension.trim_start_matches('.').to_string(),
            silent: settings
                .silent_labels
                .iter()
                .map(|l| l.trim().to_ascii_uppercase())
                .collect(),
        }
    }

    /// Path of the recording for `label`, if the label has one. Only plain
    /// alphanumeric labels resolve, so a label can never point outside `dir`.
    pub fn resource_for(&self, label: &str) -> Option<PathBuf> {
        let label = label.trim();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        let key = label.to_ascii_uppercase();
        if self.silent.contains(&key) {
            return None;
        }
        Some(self.dir.join(format!("{}.{}", key, self.extension)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> AudioLibrary {
        AudioLibrary::new(&AudioSettings::default())
    }

    #[test]
    fn letters_map_to_files() {
        assert_eq!(
            library().resource_for("b"),
            Some(PathBuf::from("audio").join("B.mp3"))
        );
    }

    #[test]
    fn motion_letters_are_silent() {
        assert_eq!(library().resource_for("Z"), None);
        assert_eq!(library().resource_for("J"), None);
    }

    #[test]
    fn odd_labels_never_resolve() {
        assert_eq!(library().resource_for("../etc/passwd"), None);
        assert_eq!(library().resource_for(""), None);
        assert_eq!(library().resource_for("A B"), None);
    }
}
