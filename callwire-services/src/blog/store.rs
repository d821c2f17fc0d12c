use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::stream::BoxStream;

/// Identifier of a stored record.
///
/// Twelve bytes: four of big-endian seconds since the epoch, five drawn once
/// per process, three of a wrapping counter. Rendered as 24 lowercase hex
/// digits; parsing also accepts uppercase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId([u8; 12]);

static PROCESS_BYTES: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: AtomicU32 = AtomicU32::new(0);

impl RecordId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Allocate a fresh identifier.
    pub fn generate() -> Result<Self, StoreError> {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::IdAllocation(e.to_string()))?
            .as_secs();
        let seconds = u32::try_from(seconds)
            .map_err(|_| StoreError::IdAllocation(format!("timestamp {seconds} out of range")))?;
        let process = PROCESS_BYTES.get_or_init(rand::random::<[u8; 5]>);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Ok(Self(bytes))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record id: {0:?}")]
pub struct InvalidRecordId(pub String);

impl FromStr for RecordId {
    type Err = InvalidRecordId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(InvalidRecordId(s.to_owned()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidRecordId(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

/// Record contents without an identity; used for inserts and replacements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlogFields {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// A persisted record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlogDocument {
    pub id: RecordId,
    pub fields: BlogFields,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("cannot allocate record id: {0}")]
    IdAllocation(String),

    #[error("cannot decode stored record: {0}")]
    Decode(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Document storage used by the blog service.
///
/// Implementations synchronize internally; one store is shared by every
/// in-flight call. The single-record operations are atomic.
pub trait DocumentStore: Send + Sync + 'static {
    /// Persist a new record and return its assigned identity.
    fn insert(
        &self,
        fields: BlogFields,
    ) -> impl Future<Output = Result<RecordId, StoreError>> + Send;

    fn find_one(
        &self,
        id: RecordId,
    ) -> impl Future<Output = Result<Option<BlogDocument>, StoreError>> + Send;

    /// Replace the fields of a live record and return the new version.
    fn find_one_and_update(
        &self,
        id: RecordId,
        fields: BlogFields,
    ) -> impl Future<Output = Result<Option<BlogDocument>, StoreError>> + Send;

    /// Remove a live record and return what was removed.
    fn find_one_and_delete(
        &self,
        id: RecordId,
    ) -> impl Future<Output = Result<Option<BlogDocument>, StoreError>> + Send;

    /// Lazily yield every live record.
    fn find(&self) -> BoxStream<'static, Result<BlogDocument, StoreError>>;
}
