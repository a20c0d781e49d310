pub mod library;

pub use library::AudioLibrary;

use log::{debug, error};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

/// Output side of the feedback dispatcher.
///
/// `play` only hands the request off; decoding and device errors surface in
/// the log, never to the caller.
pub trait Playback: Send + Sync {
    fn play(&self, path: &Path) -> Result<(), String>;

    /// Stops everything still sounding and frees the output device.
    fn release(&self);
}

enum AudioCommand {
    Play(PathBuf),
    Release,
}

/// rodio-backed playback on a dedicated thread, since the output stream is
/// not `Send`.
pub struct RodioPlayback {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl RodioPlayback {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("feedback-audio".to_string())
            .spawn(move || {
                let mut stream: Option<(OutputStream, OutputStreamHandle)> = None;
                // Earlier clips keep playing when a new one starts.
                let mut sinks: Vec<Sink> = Vec::new();

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play(path) => {
                            sinks.retain(|s| !s.empty());
                            if let Err(e) = start_clip(&mut stream, &mut sinks, &path) {
                                error!("Failed to play '{}': {}", path.display(), e);
                            }
                        }
                        AudioCommand::Release => {
                            for sink in sinks.drain(..) {
                                sink.stop();
                            }
                            stream = None;
                            debug!("Feedback audio released");
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl Default for RodioPlayback {
    fn default() -> Self {
        Self::new()
    }
}

fn start_clip(
    stream: &mut Option<(OutputStream, OutputStreamHandle)>,
    sinks: &mut Vec<Sink>,
    path: &Path,
) -> Result<(), String> {
    if stream.is_none() {
        let opened = OutputStream::try_default()
            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
        *stream = Some(opened);
    }
    let Some((_, handle)) = stream.as_ref() else {
        return Err("audio output stream unavailable".into());
    };

    let file = File::open(path).map_err(|e| format!("missing audio resource: {}", e))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| format!("Failed to decode audio: {}", e))?;
    let sink =
        Sink::try_new(handle).map_err(|e| format!("Failed to create audio sink: {}", e))?;
    sink.append(source);
    sinks.push(sink);
    Ok(())
}

impl Playback for RodioPlayback {
    fn play(&self, path: &Path) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::Play(path.to_path_buf()))
            .map_err(|e| e.to_string())
    }

    fn release(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Release);
        }
    }
}

/// Records requests instead of producing sound; used headless and in tests.
#[derive(Default)]
pub struct RecordingPlayback {
    played: Mutex<Vec<PathBuf>>,
    releases: Mutex<u32>,
}

impl RecordingPlayback {
    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn release_count(&self) -> u32 {
        self.releases.lock().map(|g| *g).unwrap_or_default()
    }
}

impl Playback for RecordingPlayback {
    fn play(&self, path: &Path) -> Result<(), String> {
        self.played
            .lock()
            .map_err(|e| e.to_string())?
            .push(path.to_path_buf());
        Ok(())
    }

    fn release(&self) {
        if let Ok(mut releases) = self.releases.lock() {
            *releases += 1;
        }
    }
}
