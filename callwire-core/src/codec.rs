//! Message encodings.
//!
//! Every message type is a prost message that also derives serde, so a call
//! can carry binary protobuf or JSON depending on what the peer negotiated.

use bytes::Bytes;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Status;

/// Wire encoding of a call's messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    Proto,
    Json,
}

/// Message encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode {encoding} message: {reason}")]
    Encode {
        encoding: &'static str,
        reason: String,
    },
    #[error("failed to decode {encoding} message: {reason}")]
    Decode {
        encoding: &'static str,
        reason: String,
    },
}

impl CodecError {
    /// Undecodable input is the caller's fault; unencodable output is ours.
    pub fn to_status(&self) -> Status {
        match self {
            CodecError::Encode { .. } => Status::internal(self.to_string()),
            CodecError::Decode { .. } => Status::invalid_argument(self.to_string()),
        }
    }
}

impl From<CodecError> for Status {
    fn from(err: CodecError) -> Self {
        err.to_status()
    }
}

impl Encoding {
    /// Short name, used in content types and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Proto => "proto",
            Encoding::Json => "json",
        }
    }

    pub fn encode<T>(&self, message: &T) -> Result<Bytes, CodecError>
    where
        T: Message + Serialize,
    {
        match self {
            Encoding::Proto => Ok(Bytes::from(message.encode_to_vec())),
            Encoding::Json => serde_json::to_vec(message)
                .map(Bytes::from)
                .map_err(|e| CodecError::Encode {
                    encoding: self.name(),
                    reason: e.to_string(),
                }),
        }
    }

    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: Message + DeserializeOwned + Default,
    {
        let decode_err = |reason: String| CodecError::Decode {
            encoding: self.name(),
            reason,
        };
        match self {
            Encoding::Proto => T::decode(bytes).map_err(|e| decode_err(e.to_string())),
            Encoding::Json => serde_json::from_slice(bytes).map_err(|e| decode_err(e.to_string())),
        }
    }
}
