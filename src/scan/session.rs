//! Scan session state machine
//!
//! ```text
//! Idle -> AcquiringCamera -> Scanning -> {Found | TimedOut | Error} -> Closed
//! ```
//! Any state except `Closed` may also go straight to `Closed` (cancellation).
//! `transition` is the only way the state changes.

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::ScanError;

/// Lifecycle state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    AcquiringCamera,
    Scanning,
    Found,
    TimedOut,
    Error,
    Closed,
}

impl ScanState {
    /// Found, TimedOut and Error end the scan
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Found | ScanState::TimedOut | ScanState::Error)
    }

    fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, AcquiringCamera) => true,
            (AcquiringCamera, Scanning) | (AcquiringCamera, Error) => true,
            (Scanning, Found) | (Scanning, TimedOut) | (Scanning, Error) => true,
            _ => false,
        }
    }
}

/// One bounded attempt to read a VIN
#[derive(Debug, Clone)]
pub struct ScanSession {
    id: Uuid,
    state: ScanState,
    started_at: Option<Instant>,
    attempts: u32,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ScanState::Idle,
            started_at: None,
            attempts: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// When the session entered `Scanning`
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Sampling attempts started while scanning
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: ScanState) -> Result<(), ScanError> {
        if !self.state.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!("Scan {}: {:?} -> {:?}", self.id, self.state, next);
        if next == ScanState::Scanning {
            self.started_at = Some(Instant::now());
        }
        self.state = next;
        Ok(())
    }

    /// Count a sampling attempt; only valid while scanning
    pub fn record_attempt(&mut self) -> bool {
        if self.state != ScanState::Scanning {
            return false;
        }
        self.attempts += 1;
        true
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}
