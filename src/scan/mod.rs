//! VIN scan loop
//!
//! [`session::ScanSession`] holds the lifecycle state of one scan; [`ScanScheduler`]
//! drives it over a camera and an OCR adapter.

pub mod scheduler;
pub mod session;

pub use scheduler::{ScanOutcome, ScanReport, ScanScheduler};
pub use session::ScanState;
