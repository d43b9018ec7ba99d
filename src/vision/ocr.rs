//! OCR (Optical Character Recognition) adapter seam

use async_trait::async_trait;

use crate::capture::frame::CapturedFrame;
use crate::error::OcrError;

/// Text recognized in one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    /// Recognized text, lines separated by `\n`
    pub text: String,
}

impl Recognition {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Frame-to-text engine.
///
/// Recognition may take longer than the scan sampling interval; callers run
/// several attempts concurrently and discard stale results.
#[async_trait]
pub trait OcrAdapter: Send + Sync {
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Recognition, OcrError>;

    /// Engine name for logs
    fn name(&self) -> &str;
}
