//! Application Configuration
//!
//! Settings stored in TOML format. Every section has defaults, so a partial
//! file (or no file at all) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CameraPreference, Facing};
use crate::error::ScanError;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Invoicing backend settings
    pub api: ApiConfig,
    /// Scan loop settings
    pub scan: ScanConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
}

/// Field naming used by the vehicle lookup endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleSchema {
    /// Detect from the response keys
    #[default]
    Auto,
    /// `vin`, `make`, `year`, `bodyType`, ...
    LowerCamel,
    /// `VIN`, `Make`, `ModelYear`, `BodyClass`, ...
    UpperCamel,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base endpoint every request is resolved against
    pub base_url: String,
    /// Path of the CSRF token endpoint
    pub csrf_token_path: String,
    /// Fixed CSRF token; skips the token fetch when set
    pub static_csrf_token: Option<String>,
    /// Request timeout; transport default when absent
    pub timeout_secs: Option<u64>,
    /// Vehicle record field naming
    pub vehicle_schema: VehicleSchema,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2913".to_string(),
            csrf_token_path: "/api/csrf/token".to_string(),
            static_csrf_token: None,
            timeout_secs: None,
            vehicle_schema: VehicleSchema::Auto,
        }
    }
}

/// Scan loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Time between OCR sampling attempts
    pub sample_interval_ms: u64,
    /// Hard deadline after the camera starts streaming
    pub deadline_ms: u64,
    /// Consecutive OCR failures that end the scan with an error
    pub max_consecutive_ocr_failures: u32,
    /// Preferred camera facing
    pub camera_facing: Facing,
    /// Open any camera when the preferred one is missing
    pub allow_camera_fallback: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            deadline_ms: 7000,
            max_consecutive_ocr_failures: 3,
            camera_facing: Facing::Environment,
            allow_camera_fallback: true,
        }
    }
}

/// Validated scan timing and camera settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub sample_interval: Duration,
    pub deadline: Duration,
    pub max_consecutive_failures: u32,
    pub camera: CameraPreference,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            deadline: Duration::from_secs(7),
            max_consecutive_failures: 3,
            camera: CameraPreference::default(),
        }
    }
}

impl ScanConfig {
    /// Check the timing values and convert them to durations
    pub fn settings(&self) -> Result<ScanSettings, ScanError> {
        if self.sample_interval_ms == 0 {
            return Err(ScanError::InvalidSettings("sample_interval_ms must be > 0".into()));
        }
        if self.deadline_ms == 0 {
            return Err(ScanError::InvalidSettings("deadline_ms must be > 0".into()));
        }
        if self.sample_interval_ms > self.deadline_ms {
            return Err(ScanError::InvalidSettings(
                "sample_interval_ms must not exceed deadline_ms".into(),
            ));
        }
        if self.max_consecutive_ocr_failures == 0 {
            return Err(ScanError::InvalidSettings(
                "max_consecutive_ocr_failures must be >= 1".into(),
            ));
        }

        Ok(ScanSettings {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            deadline: Duration::from_millis(self.deadline_ms),
            max_consecutive_failures: self.max_consecutive_ocr_failures,
            camera: CameraPreference {
                facing: self.camera_facing,
                allow_fallback: self.allow_camera_fallback,
            },
        })
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Path or name of the tesseract executable
    pub tesseract_path: PathBuf,
    /// Tesseract language pack
    pub language: String,
    /// Tesseract page segmentation mode
    pub page_segmentation_mode: u8,
    /// Only let the engine emit VIN characters
    pub restrict_to_vin_alphabet: bool,
    /// Where scratch frames are written; the system temp directory when unset
    pub scratch_dir: Option<PathBuf>,
    /// Frame filters applied before recognition
    pub preprocessing: OcrPreprocessing,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            page_segmentation_mode: 6,
            restrict_to_vin_alphabet: true,
            scratch_dir: None,
            preprocessing: OcrPreprocessing::default(),
        }
    }
}

/// Frame filters applied before OCR
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrPreprocessing {
    /// Master switch
    pub enabled: bool,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Contrast factor, 1.0 leaves the frame unchanged
    pub contrast: f32,
    /// Unsharp mask strength, 0.0 disables
    pub sharpen: f32,
    /// Integer upscale factor, 1 disables
    pub scale: u32,
    /// Invert colors (light text on dark plates)
    pub invert: bool,
}

impl Default for OcrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: true,
            grayscale: true,
            contrast: 1.5,
            sharpen: 0.5,
            scale: 2,
            invert: false,
        }
    }
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "vininvoice", "VinInvoice")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Default location of `config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file, creating parent directories
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
