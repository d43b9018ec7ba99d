//! Tesseract OCR backend
//!
//! Runs the `tesseract` executable on each frame. The frame is written to a
//! temporary PNG, recognized text is read from stdout. The PNG lives exactly
//! as long as the recognition future, so an aborted attempt leaves nothing
//! behind.

use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, trace};

use super::ocr::{OcrAdapter, Recognition};
use super::vin::VIN_ALPHABET;
use crate::capture::frame::CapturedFrame;
use crate::config::OcrConfig;
use crate::error::OcrError;

/// OCR adapter backed by the Tesseract command line tool
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
    page_segmentation_mode: u8,
    restrict_to_vin_alphabet: bool,
    scratch_dir: PathBuf,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
            restrict_to_vin_alphabet: config.restrict_to_vin_alphabet,
            scratch_dir: config.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Command line arguments for one recognition of `image_path`
    fn arguments(&self, image_path: &Path) -> Vec<String> {
        let mut args = vec![
            image_path.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            self.page_segmentation_mode.to_string(),
        ];
        if self.restrict_to_vin_alphabet {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", VIN_ALPHABET));
        }
        args
    }

    /// Encode `frame` into a scratch PNG on the blocking pool; deleted on drop
    async fn write_frame(&self, frame: &CapturedFrame) -> Result<NamedTempFile, OcrError> {
        let image = frame.to_rgba_image().ok_or_else(|| {
            OcrError::Image(format!("frame buffer does not match {}x{}", frame.width, frame.height))
        })?;
        let scratch_dir = self.scratch_dir.clone();

        tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix("vin-frame-")
                .suffix(".png")
                .tempfile_in(&scratch_dir)
                .map_err(|e| OcrError::Image(format!("{}: {}", scratch_dir.display(), e)))?;
            image
                .write_to(file.as_file_mut(), ImageFormat::Png)
                .map_err(|e| OcrError::Image(e.to_string()))?;
            Ok::<_, OcrError>(file)
        })
        .await
        .map_err(|e| OcrError::Image(format!("frame encoder failed: {e}")))?
    }
}

#[async_trait]
impl OcrAdapter for TesseractOcr {
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Recognition, OcrError> {
        let scratch = self.write_frame(frame).await?;
        let args = self.arguments(scratch.path());
        trace!("Running {:?} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await;

        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            debug!("Could not remove scratch frame {:?}: {}", path, e);
        }

        let output = output.map_err(|e| OcrError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(OcrError::Engine {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("Tesseract recognized {} characters", text.trim().len());
        Ok(Recognition::new(text))
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
