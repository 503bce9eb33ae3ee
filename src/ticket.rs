//! Flight descriptor and ticket encoding.
//!
//! A dataset is addressed by a bare id. Both the canonical JSON form
//! (`{"dataset_id": "..."}`) and a raw UTF-8 id are accepted on decode;
//! encoding always produces the canonical JSON form.

use serde::{Deserialize, Serialize};

use crate::error::{FlightTransportError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct TicketBody {
    dataset_id: String,
}

/// Encodes a dataset id as canonical Flight ticket bytes.
///
/// # Example
///
/// ```
/// use tabular_flight::ticket::{encode_ticket, decode_ticket};
///
/// let bytes = encode_ticket("sample");
/// assert_eq!(decode_ticket(&bytes).unwrap(), "sample");
/// ```
#[must_use]
pub fn encode_ticket(dataset_id: &str) -> Vec<u8> {
    serde_json::to_vec(&TicketBody {
        dataset_id: dataset_id.to_string(),
    })
    .unwrap_or_else(|_| dataset_id.as_bytes().to_vec())
}

/// Decodes ticket bytes into a dataset id.
///
/// Accepts either the canonical `{"dataset_id": "..."}` JSON form or a
/// raw UTF-8 id.
///
/// # Errors
///
/// Returns [`FlightTransportError::InvalidArgument`] if the bytes are
/// neither valid JSON in the expected shape nor valid UTF-8.
pub fn decode_ticket(bytes: &[u8]) -> Result<String> {
    if let Ok(body) = serde_json::from_slice::<TicketBody>(bytes) {
        return Ok(body.dataset_id);
    }
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| FlightTransportError::InvalidArgument(format!("invalid ticket bytes: {e}")))
}

/// Decodes a Flight descriptor's `PATH` or `CMD` form into a dataset id.
///
/// `path` is used when non-empty (`path[0]` is the id); otherwise `cmd`
/// is decoded the same way as a ticket.
///
/// # Errors
///
/// Returns [`FlightTransportError::InvalidArgument`] if both `path` and
/// `cmd` are empty, or `cmd` cannot be decoded.
pub fn decode_descriptor(path: &[String], cmd: &[u8]) -> Result<String> {
    if let Some(first) = path.first() {
        return Ok(first.clone());
    }
    if cmd.is_empty() {
        return Err(FlightTransportError::InvalidArgument(
            "flight descriptor has neither a path nor a command".to_string(),
        ));
    }
    decode_ticket(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_json_form() {
        let bytes = encode_ticket("orders");
        assert_eq!(decode_ticket(&bytes).unwrap(), "orders");
    }

    #[test]
    fn accepts_raw_utf8_id() {
        assert_eq!(decode_ticket(b"orders").unwrap(), "orders");
    }

    #[test]
    fn rejects_invalid_utf8() {
        let bytes = vec![0xFF, 0xFE, 0xFD];
        assert!(decode_ticket(&bytes).is_err());
    }

    #[test]
    fn descriptor_prefers_path_over_cmd() {
        let id = decode_descriptor(&["orders".to_string()], b"ignored").unwrap();
        assert_eq!(id, "orders");
    }

    #[test]
    fn descriptor_falls_back_to_cmd() {
        let cmd = encode_ticket("orders");
        let id = decode_descriptor(&[], &cmd).unwrap();
        assert_eq!(id, "orders");
    }

    #[test]
    fn descriptor_with_neither_is_an_error() {
        assert!(decode_descriptor(&[], &[]).is_err());
    }
}
