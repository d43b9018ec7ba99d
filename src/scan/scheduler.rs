//! Scan scheduler
//!
//! Drives one [`ScanSession`]: acquire the camera, sample a frame at a fixed
//! cadence, run OCR and VIN extraction on each sample, and stop at the first
//! VIN, the hard deadline, an unrecoverable error or cancellation. The
//! sampling ticker and the deadline are owned by the loop and dropped with
//! it, so nothing keeps firing after the session closes.
//!
//! Frame filters run on the blocking pool; the loop itself only copies
//! frames and polls timers, so the deadline fires on time however slow a
//! recognition is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::session::{ScanSession, ScanState};
use crate::capture::frame::CapturedFrame;
use crate::capture::{CameraDevice, CameraSession};
use crate::config::{OcrPreprocessing, ScanSettings};
use crate::error::{OcrError, ScanError};
use crate::vision::{extract_vin, prepare_frame, OcrAdapter, Recognition};

/// How a scan ended
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// A VIN was read
    Found(String),
    /// No VIN before the deadline
    TimedOut,
    /// The caller cancelled the scan
    Cancelled,
    /// Camera or OCR failure
    Failed(ScanError),
}

/// Summary of a finished scan session
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub session_id: Uuid,
    pub outcome: ScanOutcome,
    /// Always `Closed` unless closing itself failed
    pub final_state: ScanState,
    pub attempts: u32,
    /// Time spent in `Scanning`, if the camera ever started
    pub scanning_time: Option<Duration>,
}

impl ScanReport {
    /// The VIN, when the scan found one
    pub fn vin(&self) -> Option<&str> {
        match &self.outcome {
            ScanOutcome::Found(vin) => Some(vin),
            _ => None,
        }
    }
}

/// Runs bounded, cancellable VIN scans
pub struct ScanScheduler {
    ocr: Arc<dyn OcrAdapter>,
    preprocessing: OcrPreprocessing,
    settings: ScanSettings,
}

impl ScanScheduler {
    pub fn new(ocr: Arc<dyn OcrAdapter>, preprocessing: OcrPreprocessing, settings: ScanSettings) -> Self {
        Self {
            ocr,
            preprocessing,
            settings,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Run one scan session to completion.
    ///
    /// The camera is released before this returns, whatever the outcome.
    pub async fn run(&self, camera: &mut dyn CameraDevice, cancel: &CancellationToken) -> ScanReport {
        let mut session = ScanSession::new();
        info!("Scan {} starting with {} OCR", session.id(), self.ocr.name());

        let outcome = self.drive(&mut session, camera, cancel).await;
        let scanning_time = session.started_at().map(|started| started.elapsed());

        if let Err(e) = session.transition(ScanState::Closed) {
            error!("Scan {} could not close: {}", session.id(), e);
        }

        match &outcome {
            ScanOutcome::Found(vin) => info!("Scan {} found VIN {}", session.id(), vin),
            ScanOutcome::TimedOut => info!("Scan {} timed out: no VIN found", session.id()),
            ScanOutcome::Cancelled => info!("Scan {} cancelled", session.id()),
            ScanOutcome::Failed(e) => warn!("Scan {} failed: {}", session.id(), e),
        }

        ScanReport {
            session_id: session.id(),
            outcome,
            final_state: session.state(),
            attempts: session.attempts(),
            scanning_time,
        }
    }

    async fn drive(
        &self,
        session: &mut ScanSession,
        camera: &mut dyn CameraDevice,
        cancel: &CancellationToken,
    ) -> ScanOutcome {
        if cancel.is_cancelled() {
            return ScanOutcome::Cancelled;
        }
        if let Err(e) = session.transition(ScanState::AcquiringCamera) {
            return ScanOutcome::Failed(e);
        }

        let mut camera = match CameraSession::open(camera, self.settings.camera).await {
            Ok(camera) => camera,
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                return conclude(session, ScanState::Error, ScanOutcome::Failed(e.into()));
            }
        };

        // Acquisition is not interrupted; a cancel that arrived meanwhile wins now
        if cancel.is_cancelled() {
            camera.close();
            return ScanOutcome::Cancelled;
        }
        if let Err(e) = session.transition(ScanState::Scanning) {
            camera.close();
            return ScanOutcome::Failed(e);
        }
        debug!("Scanning with the {} camera", camera.facing());

        let outcome = self.sample(session, &mut camera, cancel).await;
        camera.close();
        outcome
    }

    async fn sample(
        &self,
        session: &mut ScanSession,
        camera: &mut CameraSession<'_>,
        cancel: &CancellationToken,
    ) -> ScanOutcome {
        let deadline = tokio::time::sleep(self.settings.deadline);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.settings.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: JoinSet<Result<Recognition, OcrError>> = JoinSet::new();
        let mut attempt_of: HashMap<task::Id, u32> = HashMap::new();
        let mut consecutive_failures = 0u32;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break ScanOutcome::Cancelled;
                }

                _ = &mut deadline => {
                    break conclude(session, ScanState::TimedOut, ScanOutcome::TimedOut);
                }

                Some(joined) = in_flight.join_next_with_id() => {
                    let (attempt, result) = match joined {
                        Ok((id, result)) => (attempt_of.remove(&id).unwrap_or_default(), result),
                        Err(e) => {
                            let attempt = attempt_of.remove(&e.id()).unwrap_or_default();
                            error!("Attempt {}: OCR task died: {}", attempt, e);
                            let stderr = format!("attempt {}: {}", attempt, e);
                            (attempt, Err(OcrError::Engine { code: None, stderr }))
                        }
                    };

                    match result {
                        Ok(recognition) => {
                            consecutive_failures = 0;
                            if let Some(vin) = extract_vin(&recognition.text) {
                                debug!("Attempt {} matched {}", attempt, vin);
                                break conclude(session, ScanState::Found, ScanOutcome::Found(vin.to_string()));
                            }
                            debug!("Attempt {}: no VIN in recognized text", attempt);
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            warn!("Attempt {}: OCR failed ({} in a row): {}", attempt, consecutive_failures, e);
                            if consecutive_failures >= self.settings.max_consecutive_failures {
                                let failure = ScanError::RecognitionFailure {
                                    attempts: consecutive_failures,
                                    last: e,
                                };
                                break conclude(session, ScanState::Error, ScanOutcome::Failed(failure));
                            }
                        }
                    }
                }

                _ = ticker.tick() => {
                    let frame = match camera.snapshot() {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Camera stopped delivering frames: {}", e);
                            break conclude(session, ScanState::Error, ScanOutcome::Failed(e.into()));
                        }
                    };

                    session.record_attempt();
                    let attempt = session.attempts();
                    let ocr = Arc::clone(&self.ocr);
                    let preprocessing = self.preprocessing.clone();
                    let (width, height) = frame.dimensions();
                    debug!("Attempt {} started on a {}x{} frame ({} in flight)", attempt, width, height, in_flight.len());

                    let handle = in_flight.spawn(async move {
                        let captured_at = frame.timestamp;
                        let result = match preprocess(frame, preprocessing).await {
                            Ok(prepared) => ocr.recognize(&prepared).await,
                            Err(e) => Err(e),
                        };
                        trace!("Attempt {} done {:?} after capture", attempt, captured_at.elapsed());
                        result
                    });
                    attempt_of.insert(handle.id(), attempt);
                }
            }
        };

        if !in_flight.is_empty() {
            debug!("Discarding {} in-flight OCR attempts", in_flight.len());
        }
        in_flight.abort_all();
        outcome
    }
}

/// Apply the frame filters on the blocking pool
async fn preprocess(frame: CapturedFrame, settings: OcrPreprocessing) -> Result<CapturedFrame, OcrError> {
    if !settings.enabled {
        return Ok(frame);
    }
    tokio::task::spawn_blocking(move || prepare_frame(&frame, &settings))
        .await
        .map_err(|e| OcrError::Image(format!("preprocessing task failed: {e}")))?
}

fn conclude(session: &mut ScanSession, state: ScanState, outcome: ScanOutcome) -> ScanOutcome {
    debug_assert!(state.is_terminal());
    match session.transition(state) {
        Ok(()) => outcome,
        Err(e) => ScanOutcome::Failed(e),
    }
}
