//! Error types
//!
//! One enum per concern. Camera and OCR errors stay local to a scan attempt;
//! lookup and invoice errors are surfaced to the operator.

use thiserror::Error;

use crate::scan::ScanState;

/// Camera acquisition and frame errors (ResourceUnavailable)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("no camera facing {0} is available")]
    NoMatchingDevice(String),

    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("no frame available: {0}")]
    FrameUnavailable(String),
}

/// OCR adapter failures (RecognitionFailure for a single attempt)
#[derive(Error, Debug, Clone)]
pub enum OcrError {
    #[error("failed to start OCR engine: {0}")]
    Spawn(String),

    #[error("OCR engine failed (code {code:?}): {stderr}")]
    Engine { code: Option<i32>, stderr: String },

    #[error("could not prepare frame for OCR: {0}")]
    Image(String),
}

/// Terminal scan failures
#[derive(Error, Debug, Clone)]
pub enum ScanError {
    #[error("camera resource unavailable: {0}")]
    ResourceUnavailable(#[from] CameraError),

    #[error("OCR failed {attempts} times in a row: {last}")]
    RecognitionFailure { attempts: u32, last: OcrError },

    #[error("invalid scan transition {from:?} -> {to:?}")]
    InvalidTransition { from: ScanState, to: ScanState },

    #[error("invalid scan settings: {0}")]
    InvalidSettings(String),
}

/// Transport-level errors shared by the backend clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Status { status: u16, detail: Option<String> },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("could not obtain CSRF token: {0}")]
    Token(String),

    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Vehicle lookup failures (LookupFailure)
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("invalid VIN format: {0:?}")]
    InvalidVin(String),

    #[error("vehicle lookup failed: {0}")]
    Api(#[from] ApiError),
}

/// Invoice create/append failures (InvoiceOperationFailure)
#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("invoice operation rejected{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Rejected { status: u16, detail: Option<String> },

    #[error("invoice backend unreachable: {0}")]
    Api(ApiError),

    #[error("invoice id missing from response")]
    MissingInvoiceId,

    #[error("invalid line item: {0}")]
    InvalidDraft(String),
}

impl From<ApiError> for InvoiceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, detail } => InvoiceError::Rejected { status, detail },
            other => InvoiceError::Api(other),
        }
    }
}

/// Workflow sequencing errors
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("no customer selected")]
    NoCustomer,

    #[error("no vehicle resolved yet; scan a VIN first")]
    NoVehicle,

    #[error("customer has no invoice today")]
    NoInvoice,

    #[error("no VIN found")]
    NoVinFound,

    #[error("scan cancelled")]
    ScanCancelled,

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Invoice(#[from] InvoiceError),
}
