use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use log::{debug, info};
use rand::Rng;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::classifier::Sample;

use super::SampleSource;

pub const FRAME_WIDTH: u32 = 400;
pub const FRAME_HEIGHT: u32 = 240;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Camera stand-in: replays the still images of a directory in name order.
/// Frames are mirrored like a front-facing webcam and re-encoded as JPEG at
/// the capture resolution.
pub struct FrameDirSource {
    dir: PathBuf,
    frames: Mutex<Option<Vec<PathBuf>>>,
    cursor: AtomicUsize,
}

impl FrameDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: Mutex::new(None),
            cursor: AtomicUsize::new(0),
        }
    }

    fn next_frame_path(&self) -> Result<PathBuf> {
        let mut guard = self
            .frames
            .lock()
            .map_err(|_| anyhow!("frame list lock poisoned"))?;

        if guard.is_none() {
            let listed = list_frames(&self.dir)?;
            info!("Loaded {} frames from {}", listed.len(), self.dir.display());
            *guard = Some(listed);
        }

        let frames = guard.as_ref().map(Vec::as_slice).unwrap_or_default();
        if frames.is_empty() {
            bail!("no image frames in {}", self.dir.display());
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % frames.len();
        Ok(frames[index].clone())
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Mirrors, resizes and JPEG-encodes one frame.
pub fn encode_frame(image: &DynamicImage) -> Result<Vec<u8>> {
    let prepared = image
        .fliph()
        .resize_exact(FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle);
    let rgb = DynamicImage::ImageRgb8(prepared.to_rgb8());

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .context("failed to encode frame as JPEG")?;
    Ok(buffer.into_inner())
}

#[async_trait]
impl SampleSource for FrameDirSource {
    async fn capture(&self) -> Result<Sample> {
        let path = self.next_frame_path()?;
        let jpeg = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let image = image::open(&path)
                .with_context(|| format!("failed to open frame {}", path.display()))?;
            encode_frame(&image)
        })
        .await
        .context("frame encoder worker join failed")??;
        Ok(Sample::Frame(jpeg))
    }

    fn release(&self) {
        if let Ok(mut guard) = self.frames.lock() {
            *guard = None;
        }
        self.cursor.store(0, Ordering::Relaxed);
        debug!("Released frame source {}", self.dir.display());
    }

    fn name(&self) -> &'static str {
        "camera"
    }
}

/// Random flex-sensor readings, for exercising the glove endpoint without
/// hardware.
#[derive(Debug, Default)]
pub struct SimulatedGloveSource;

pub const SENSOR_COUNT: usize = 5;
pub const SENSOR_MAX: u16 = 1024;

#[async_trait]
impl SampleSource for SimulatedGloveSource {
    async fn capture(&self) -> Result<Sample> {
        let values = {
            let mut rng = rand::thread_rng();
            (0..SENSOR_COUNT)
                .map(|_| rng.gen_range(0..SENSOR_MAX))
                .collect::<Vec<u16>>()
        };
        debug!("Simulated sensor data: {:?}", values);
        Ok(Sample::Sensor(values))
    }

    fn name(&self) -> &'static str {
        "simulated-glove"
    }
}

/// The device pushes to the backend on its own; each tick just pulls the
/// latest prediction.
#[derive(Debug, Default)]
pub struct DeviceStreamSource;

#[async_trait]
impl SampleSource for DeviceStreamSource {
    async fn capture(&self) -> Result<Sample> {
        Ok(Sample::Pull)
    }

    fn name(&self) -> &'static str {
        "device-stream"
    }
}
