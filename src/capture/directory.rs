//! Directory-backed camera
//!
//! Serves still images from a folder in rotation, one per snapshot. Used on
//! hosts without a media-capture API and for replaying recorded VIN plates.
//! Frames are decoded on the blocking pool when the stream starts, so a
//! snapshot is a buffer copy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::frame::CapturedFrame;
use super::{CameraDevice, Facing};
use crate::error::CameraError;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Camera that replays image files from a directory
pub struct DirectoryCamera {
    dir: PathBuf,
    facing: Facing,
    name: String,
    frames: Vec<CapturedFrame>,
    cursor: usize,
    streaming: bool,
}

impl DirectoryCamera {
    /// Create a camera over `dir` that reports the given facing
    pub fn new(dir: impl Into<PathBuf>, facing: Facing) -> Self {
        let dir = dir.into();
        let name = format!("dir:{}", dir.display());
        Self {
            dir,
            facing,
            name,
            frames: Vec::new(),
            cursor: 0,
            streaming: false,
        }
    }

    /// Whether tracks are currently running
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| CameraError::Unavailable(format!("{}: {}", dir.display(), e)))?;

        let mut frames = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CameraError::Unavailable(e.to_string()))?
        {
            let path = entry.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                frames.push(path);
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Decode every frame off the async executor
    async fn decode_frames(paths: Vec<PathBuf>) -> Result<Vec<CapturedFrame>, CameraError> {
        tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|path| {
                    debug!("Decoding {:?}", path);
                    image::open(path)
                        .map(|image| CapturedFrame::from_image(&image))
                        .map_err(|e| CameraError::Unavailable(format!("{}: {}", path.display(), e)))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| CameraError::Unavailable(format!("frame decoder failed: {e}")))?
    }
}

#[async_trait]
impl CameraDevice for DirectoryCamera {
    async fn start(&mut self, facing: Facing) -> Result<(), CameraError> {
        if self.streaming {
            return Err(CameraError::Unavailable(format!("{} is already streaming", self.name)));
        }
        if facing != Facing::Any && facing != self.facing {
            return Err(CameraError::NoMatchingDevice(facing.to_string()));
        }

        let paths = Self::list_frames(&self.dir).await?;
        if paths.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "no image frames in {}",
                self.dir.display()
            )));
        }
        let frames = Self::decode_frames(paths).await?;

        info!("Streaming {} frames from {}", frames.len(), self.dir.display());
        self.frames = frames;
        self.cursor = 0;
        self.streaming = true;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<CapturedFrame, CameraError> {
        if !self.is_streaming() || self.frames.is_empty() {
            return Err(CameraError::FrameUnavailable("camera not started".to_string()));
        }

        let index = self.cursor % self.frames.len();
        self.cursor = self.cursor.wrapping_add(1);
        let source = &self.frames[index];
        Ok(CapturedFrame::new(source.data.clone(), source.width, source.height))
    }

    fn stop(&mut self) {
        self.streaming = false;
        self.frames.clear();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
