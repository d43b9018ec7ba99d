//! Camera Capture Layer
//!
//! A [`CameraDevice`] is the platform video source. A [`CameraSession`] is the
//! scoped acquisition of that device: opening it starts the video tracks and
//! every exit path (explicit close, early return, drop) stops them again.
//! The session borrows the device mutably, so at most one session can hold a
//! camera at a time.

pub mod directory;
pub mod frame;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::CameraError;
use frame::CapturedFrame;

pub use directory::DirectoryCamera;

/// Which way the requested camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Rear camera, pointing away from the operator
    #[default]
    Environment,
    /// Front camera
    User,
    /// Whatever device is available
    Any,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Environment => write!(f, "environment"),
            Facing::User => write!(f, "user"),
            Facing::Any => write!(f, "any"),
        }
    }
}

/// Camera selection preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraPreference {
    /// Preferred facing
    pub facing: Facing,
    /// Open any camera when the preferred facing is missing
    pub allow_fallback: bool,
}

impl Default for CameraPreference {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            allow_fallback: true,
        }
    }
}

/// A video capture device
#[async_trait]
pub trait CameraDevice: Send {
    /// Start the video tracks of a device matching `facing`.
    ///
    /// Resolves once the first frame is available. On error no track may be
    /// left running.
    async fn start(&mut self, facing: Facing) -> Result<(), CameraError>;

    /// Render the current frame of a started stream
    fn snapshot(&mut self) -> Result<CapturedFrame, CameraError>;

    /// Stop every track started by [`CameraDevice::start`]
    fn stop(&mut self);

    /// Human readable device name for logs
    fn name(&self) -> &str;
}

/// Scoped acquisition of a camera device
pub struct CameraSession<'a> {
    device: &'a mut dyn CameraDevice,
    facing: Facing,
    released: bool,
}

impl<'a> CameraSession<'a> {
    /// Acquire the camera, falling back to any device if allowed
    pub async fn open(
        device: &'a mut dyn CameraDevice,
        preference: CameraPreference,
    ) -> Result<CameraSession<'a>, CameraError> {
        debug!("Requesting {} camera from {}", preference.facing, device.name());

        let facing = match device.start(preference.facing).await {
            Ok(()) => preference.facing,
            Err(CameraError::NoMatchingDevice(wanted))
                if preference.allow_fallback && preference.facing != Facing::Any =>
            {
                warn!("No {} camera on {}, falling back to any camera", wanted, device.name());
                device.start(Facing::Any).await?;
                Facing::Any
            }
            Err(e) => return Err(e),
        };

        info!("Camera {} acquired ({} facing)", device.name(), facing);

        Ok(Self {
            device,
            facing,
            released: false,
        })
    }

    /// Facing of the device actually opened
    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Capture the current frame
    pub fn snapshot(&mut self) -> Result<CapturedFrame, CameraError> {
        if self.released {
            return Err(CameraError::FrameUnavailable("camera session closed".to_string()));
        }
        self.device.snapshot()
    }

    /// Release the camera now
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.device.stop();
        self.released = true;
        info!("Camera {} released", self.device.name());
    }
}

impl Drop for CameraSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
