//! Status codes and the error envelope.
//!
//! - [`Code`]: Status codes, numbered like the Connect protocol
//! - [`Status`]: The `{code, message}` error envelope every failure maps to
//! - [`EnvelopeError`]: Envelope framing errors

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// RPC status codes.
///
/// Handler failures only ever use `InvalidArgument`, `NotFound`, `Internal`,
/// `Canceled` and `DeadlineExceeded`; the remaining codes are produced by the
/// transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    ResourceExhausted = 8,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::ResourceExhausted => "resource_exhausted",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
        }
    }

    /// Whether the code reports that the call was aborted by its caller or
    /// its time budget.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Code::Canceled | Code::DeadlineExceeded)
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code")]
pub struct ParseCodeError(());

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Code::Ok),
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            _ => Err(ParseCodeError(())),
        }
    }
}

// Codes we don't model (e.g. "permission_denied" from a foreign peer) decode as Unknown.
impl<'de> Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(Code::Unknown))
    }
}

/// The error envelope: a code plus a human-readable message.
///
/// Serializes to the Connect JSON error shape:
///
/// ```json
/// {"code": "not_found", "message": "There is no blog with id: ..."}
/// ```
///
/// # Example
///
/// ```
/// use callwire_core::{Code, Status};
///
/// let status = Status::invalid_argument("Received negative number: -12");
/// assert_eq!(status.code(), Code::InvalidArgument);
/// assert_eq!(status.message(), Some("Received negative number: -12"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: Code,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str())?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// The byte stream ended in the middle of a frame.
    #[error("stream ended inside a frame: {buffered} bytes left unparsed")]
    Truncated { buffered: usize },

    /// Invalid frame flags.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// The peer sent a compressed frame; per-message compression is not negotiated.
    #[error("compressed frames are not supported")]
    UnsupportedCompression,

    /// A message frame is larger than the configured limit.
    #[error("message size {size} bytes exceeds maximum allowed size of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// The end-of-stream payload is not valid JSON.
    #[error("malformed end-of-stream frame: {0}")]
    MalformedEndStream(String),

    /// The underlying byte stream failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl EnvelopeError {
    /// Translate the framing failure into the status reported to the peer.
    pub fn to_status(&self) -> Status {
        match self {
            EnvelopeError::MessageTooLarge { .. } => Status::resource_exhausted(self.to_string()),
            EnvelopeError::Transport(_) => Status::cancelled(self.to_string()),
            _ => Status::invalid_argument(self.to_string()),
        }
    }
}
