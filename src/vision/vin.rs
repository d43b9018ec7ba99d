//! VIN extraction from recognized text
//!
//! A VIN is 17 characters over `A-Z` and `0-9`, excluding `I`, `O` and `Q`.
//! The check digit is not validated.

use regex::Regex;

/// Number of characters in a VIN
pub const VIN_LENGTH: usize = 17;

/// Characters allowed in a VIN
pub const VIN_ALPHABET: &str = "ABCDEFGHJKLMNPRSTUVWXYZ0123456789";

lazy_static::lazy_static! {
    static ref VIN_TOKEN_RE: Regex = Regex::new(r"\b[A-HJ-NPR-Z0-9]{17}\b").unwrap();
}

/// Return the first standalone 17-character VIN token in `text`
pub fn extract_vin(text: &str) -> Option<&str> {
    VIN_TOKEN_RE.find(text).map(|m| m.as_str())
}

/// Whether `candidate` is exactly one VIN-shaped token
pub fn is_vin_shaped(candidate: &str) -> bool {
    candidate.len() == VIN_LENGTH && candidate.chars().all(|c| VIN_ALPHABET.contains(c))
}
