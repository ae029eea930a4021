//! Codec for encoding and decoding pushed payloads.
//!
//! Payloads are JSON documents; the content type travels with every push so
//! receivers can tell the serialization apart.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Content type of encoded payloads.
pub const CONTENT_TYPE: &str = "application/json";

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload exceeds maximum size.
    #[error("Payload size {0} exceeds maximum {MAX_PAYLOAD_SIZE}")]
    PayloadTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a value to bytes.
///
/// # Errors
///
/// Returns an error if serialization fails or the payload is too large.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, CodecError> {
    let payload = serde_json::to_vec(value)?;

    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a value from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or is not a valid document.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(data.len()));
    }
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, SituationUpdate, VehicleJourneyUpdate};

    #[test]
    fn test_event_variants_stay_apart() {
        let et: Event = VehicleJourneyUpdate::new("L1", "J1").into();
        let sx: Event = SituationUpdate::new("status-1", 2).into();

        let decoded_et: Event = decode(&encode(&et).unwrap()).unwrap();
        let decoded_sx: Event = decode(&encode(&sx).unwrap()).unwrap();

        assert_eq!(decoded_et, et);
        assert_eq!(decoded_sx, sx);
    }

    #[test]
    fn test_decode_invalid() {
        match decode::<Event>(b"{not json") {
            Err(CodecError::Json(_)) => {}
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_too_large() {
        let large = vec![b' '; MAX_PAYLOAD_SIZE + 1];

        match decode::<Event>(&large) {
            Err(CodecError::PayloadTooLarge(_)) => {}
            other => panic!("Expected PayloadTooLarge error, got {:?}", other),
        }
    }
}
