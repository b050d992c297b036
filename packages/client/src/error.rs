//! Typed operation failures and classification of raw backing-store errors.
//!
//! Script-reported failures arrive as wire status codes (see
//! [`capcoll_core::ErrorKind`]); transport-level failures arrive as
//! [`redis::RedisError`]. Both are normalized into [`Error`] so callers
//! branch on one taxonomy.

use capcoll_core::ErrorKind;

/// Operation failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller passed a missing or malformed value.
    #[error("invalid argument: {0}")]
    MismatchArg(String),

    /// Data length exceeds the configured per-item ceiling.
    #[error("data of {size} bytes exceeds the {max} byte limit")]
    DataTooLarge { size: u64, max: u64 },

    /// Connection to the backing store failed or was closed.
    #[error("backing store connection failed: {0}")]
    Network(#[source] redis::RedisError),

    /// The backing store rejected a write for out-of-memory; forced eviction
    /// was already attempted inside the script.
    #[error("out of memory after forced eviction: {0}")]
    MaxMemoryLimit(String),

    /// The backing store evicts keys on its own, or collection structures
    /// were found missing mid-operation.
    #[error("incompatible memory policy: {0}")]
    MaxMemoryPolicy(String),

    /// The status record is missing.
    #[error("the collection has been deleted")]
    CollectionDeleted,

    /// Any other error reply from the backing store.
    #[error("backing store error: {0}")]
    BackingStore(String),

    /// Duplicate data id within a list.
    #[error("data id already exists in the list")]
    DataIdExists,

    /// Data time is older than the last removed time and the collection
    /// does not admit older items.
    #[error("data time is older than the last removed time")]
    OlderThanAllowed,

    /// Update target is absent.
    #[error("no such data id in the list")]
    NonExistentDataId,

    /// Stored schema marker differs from the supported one.
    #[error("stored data version {stored} is not supported (expected {expected})")]
    IncompatibleDataVersion { stored: u64, expected: u64 },

    /// The protocol returned nothing where a reply was expected.
    #[error("the backing store returned no reply where one was expected")]
    NoReply,

    /// Catch-all carrying the raw payload.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The machine-readable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MismatchArg(_) => ErrorKind::MismatchArg,
            Error::DataTooLarge { .. } => ErrorKind::DataTooLarge,
            Error::Network(_) => ErrorKind::Network,
            Error::MaxMemoryLimit(_) => ErrorKind::MaxMemoryLimit,
            Error::MaxMemoryPolicy(_) => ErrorKind::MaxMemoryPolicy,
            Error::CollectionDeleted => ErrorKind::CollectionDeleted,
            Error::BackingStore(_) => ErrorKind::BackingStore,
            Error::DataIdExists => ErrorKind::DataIdExists,
            Error::OlderThanAllowed => ErrorKind::OlderThanAllowed,
            Error::NonExistentDataId => ErrorKind::NonExistentDataId,
            Error::IncompatibleDataVersion { .. } => ErrorKind::IncompatibleDataVersion,
            Error::NoReply => ErrorKind::NoReply,
            Error::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// Maps a non-zero wire status code and optional message to a typed error.
///
/// Codes the scripts never emit (argument, size, and version checks run
/// client-side) fall through to [`Error::Unknown`].
pub(crate) fn from_wire(code: i64, msg: Option<String>) -> Error {
    let text = msg.unwrap_or_default();
    match ErrorKind::from_code(code) {
        Some(ErrorKind::MismatchArg) => Error::MismatchArg(text),
        Some(ErrorKind::MaxMemoryLimit) => Error::MaxMemoryLimit(text),
        Some(ErrorKind::MaxMemoryPolicy) => Error::MaxMemoryPolicy(text),
        Some(ErrorKind::CollectionDeleted) => Error::CollectionDeleted,
        Some(ErrorKind::BackingStore) => Error::BackingStore(text),
        Some(ErrorKind::DataIdExists) => Error::DataIdExists,
        Some(ErrorKind::OlderThanAllowed) => Error::OlderThanAllowed,
        Some(ErrorKind::NonExistentDataId) => Error::NonExistentDataId,
        _ => Error::Unknown(format!("wire code {code}: {text}")),
    }
}

/// Classifies a raw backing-store error into the taxonomy.
///
/// Connection-class errors become [`Error::Network`]; replies carrying an
/// out-of-memory marker become [`Error::MaxMemoryLimit`]; everything else is
/// [`Error::BackingStore`]. No-such-script replies are handled earlier by
/// the dispatch loop and never reach this function.
pub(crate) fn classify_redis_error(err: redis::RedisError) -> Error {
    if err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_io_error()
        || err.is_timeout()
    {
        return Error::Network(err);
    }
    let text = err.to_string();
    if err.code() == Some("OOM") || text.contains("maxmemory") {
        return Error::MaxMemoryLimit(text);
    }
    Error::BackingStore(text)
}
