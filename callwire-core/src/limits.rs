//! Message size limits.
//!
//! Enforced on every inbound message, unary bodies and streaming frames
//! alike. The default of 4 MiB matches gRPC's default receive limit.

use crate::error::EnvelopeError;

/// Default maximum message size (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Configuration for message size limits.
///
/// # Example
///
/// ```rust
/// use callwire_core::MessageLimits;
///
/// let limits = MessageLimits::default();
/// assert!(limits.check_size(1024).is_ok());
///
/// let tight = MessageLimits::new(16);
/// assert!(tight.check_size(17).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageLimits {
    /// `None` means unlimited.
    max_message_size: Option<usize>,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }
}

impl MessageLimits {
    /// Create new limits with the specified maximum message size in bytes.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size: Some(max_message_size),
        }
    }

    /// Create limits with no maximum. Only meant for in-process channels.
    pub fn unlimited() -> Self {
        Self {
            max_message_size: None,
        }
    }

    /// Returns the maximum message size, or `None` if unlimited.
    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }

    /// Check a message size against the configured limit.
    pub fn check_size(&self, size: usize) -> Result<(), EnvelopeError> {
        match self.max_message_size {
            Some(limit) if size > limit => Err(EnvelopeError::MessageTooLarge { size, limit }),
            _ => Ok(()),
        }
    }
}
