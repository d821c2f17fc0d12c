//! Streaming envelope framing.
//!
//! Streaming calls frame every message in an envelope:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```
//!
//! End-of-stream is its own frame (flag `0x02`) carrying a JSON payload:
//! `{}` when the stream finished cleanly, `{"error": {...}}` when it failed.

use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Status};

/// Envelope flags.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
    /// End of stream.
    pub const END_STREAM: u8 = 0x02;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Wrap payload in an envelope with the given flags.
///
/// Fails with [`EnvelopeError::MessageTooLarge`] when the payload does not
/// fit the 32-bit length prefix.
pub fn wrap_envelope(flags: u8, payload: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let length = envelope_length(payload.len())?;
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn envelope_length(size: usize) -> Result<u32, EnvelopeError> {
    u32::try_from(size).map_err(|_| EnvelopeError::MessageTooLarge {
        size,
        limit: u32::MAX as usize,
    })
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)`.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

#[derive(Serialize, Deserialize, Default)]
struct EndStreamBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Status>,
}

/// Build a complete end-of-stream frame, optionally carrying an error.
pub fn end_stream_frame(error: Option<&Status>) -> Result<Vec<u8>, EnvelopeError> {
    let body = EndStreamBody {
        error: error.cloned(),
    };
    let payload = serde_json::to_vec(&body)
        .map_err(|e| EnvelopeError::MalformedEndStream(e.to_string()))?;
    wrap_envelope(envelope_flags::END_STREAM, &payload)
}

/// Parse an end-of-stream payload.
///
/// Returns `Ok(None)` for a clean end, `Ok(Some(status))` when the peer
/// finished with an error. An empty payload counts as a clean end.
pub fn parse_end_stream(payload: &[u8]) -> Result<Option<Status>, EnvelopeError> {
    if payload.is_empty() {
        return Ok(None);
    }
    let body: EndStreamBody = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::MalformedEndStream(e.to_string()))?;
    Ok(body.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[test]
    fn test_wrap_envelope() {
        let frame = wrap_envelope(envelope_flags::MESSAGE, b"hello").unwrap();

        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_envelope_length_overflow() {
        assert_eq!(envelope_length(u32::MAX as usize), Ok(u32::MAX));

        let size = u32::MAX as usize + 1;
        assert_eq!(
            envelope_length(size),
            Err(EnvelopeError::MessageTooLarge {
                size,
                limit: u32::MAX as usize
            })
        );
    }

    #[test]
    fn test_parse_envelope_header() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let (flags, length) = parse_envelope_header(&data).unwrap();

        assert_eq!(flags, envelope_flags::MESSAGE);
        assert_eq!(length, 5);
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let result = parse_envelope_header(&[0x00, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_end_stream_frame_success() {
        let frame = end_stream_frame(None).unwrap();
        assert_eq!(frame[0], envelope_flags::END_STREAM);
        assert_eq!(&frame[5..], b"{}");
        assert_eq!(parse_end_stream(&frame[5..]).unwrap(), None);
    }

    #[test]
    fn test_end_stream_frame_error() {
        let status = Status::deadline_exceeded("too slow");
        let frame = end_stream_frame(Some(&status)).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&frame[5..]).unwrap();
        assert_eq!(json["error"]["code"], "deadline_exceeded");
        assert_eq!(json["error"]["message"], "too slow");

        let parsed = parse_end_stream(&frame[5..]).unwrap().unwrap();
        assert_eq!(parsed.code(), Code::DeadlineExceeded);
    }

    #[test]
    fn test_parse_end_stream_ignores_metadata() {
        let parsed = parse_end_stream(br#"{"metadata":{"x-trace":["1"]}}"#).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_end_stream_malformed() {
        let result = parse_end_stream(b"not json");
        assert!(matches!(result, Err(EnvelopeError::MalformedEndStream(_))));
    }
}
