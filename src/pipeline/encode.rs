//! Result encoding: final PDF bytes → Base64 text for the JSON response.
//!
//! Standard alphabet with padding, since that is what browsers' `atob` and
//! most HTTP clients expect in a JSON string field.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode PDF bytes as standard Base64.
pub fn encode_pdf(pdf: &[u8]) -> String {
    let b64 = STANDARD.encode(pdf);
    debug!("Encoded PDF {} bytes → {} bytes base64", pdf.len(), b64.len());
    b64
}

/// Decode a Base64 PDF payload, tolerating embedded whitespace.
pub fn decode_pdf(b64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned)
}
