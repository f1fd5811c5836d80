//! Base64 helpers for the payment wire format.
//!
//! Transaction bytes travel base64-encoded inside the payment header; these
//! helpers wrap the STANDARD engine used everywhere in the protocol so that
//! callers never pick an engine themselves.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes raw bytes as a base64 string.
pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
    STANDARD.encode(input.as_ref())
}

/// Decodes a base64 string into raw bytes.
///
/// # Errors
///
/// Returns an error if the input is not valid base64.
pub fn decode<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(input.as_ref())
}
