//! Utility functions for backupdir

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::{SystemTime, UNIX_EPOCH};

/// Encode credential material for transport (base64)
pub fn encode_transport(raw: &str) -> String {
    STANDARD.encode(raw.as_bytes())
}

/// Decode base64 transport encoding back into the stored text form
pub fn decode_transport(encoded: &str) -> crate::Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| crate::Error::InvalidEncoding(format!("base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| crate::Error::InvalidEncoding(format!("utf-8: {}", e)))
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
