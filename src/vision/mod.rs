//! Vision/OCR Layer
//!
//! Turns camera frames into text and text into a candidate VIN.

pub mod ocr;
pub mod ocr_preprocess;
pub mod tesseract;
pub mod vin;

pub use ocr::{OcrAdapter, Recognition};
pub use ocr_preprocess::prepare_frame;
pub use tesseract::TesseractOcr;
pub use vin::{extract_vin, is_vin_shaped};
