//! Wire status-code taxonomy shared between the transactional scripts and
//! the client driver.
//!
//! Every script reply is an array whose first element is one of these codes;
//! the driver maps non-zero codes to typed errors. The numeric values are
//! part of the stored-data contract and must not be reordered.

use std::fmt;

use serde::Serialize;

/// Outcome classes of every operation, with stable wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ErrorKind {
    /// Successful completion.
    NoError = 0,
    /// Caller passed a missing or malformed value.
    MismatchArg = 1,
    /// Data length exceeds the configured ceiling.
    DataTooLarge = 2,
    /// Connection to the backing store failed or was closed.
    Network = 3,
    /// The backing store rejected a write for out-of-memory after forced
    /// eviction was attempted.
    MaxMemoryLimit = 4,
    /// The backing store evicts keys on its own, or collection structures
    /// were found missing mid-operation.
    MaxMemoryPolicy = 5,
    /// The status record disappeared mid-operation.
    CollectionDeleted = 6,
    /// Any other error reply from the backing store.
    BackingStore = 7,
    /// Duplicate data id within a list.
    DataIdExists = 8,
    /// Data time is older than `last_removed_time` and the collection does
    /// not admit older items.
    OlderThanAllowed = 9,
    /// Update target is absent.
    NonExistentDataId = 10,
    /// Stored schema marker differs from the supported one.
    IncompatibleDataVersion = 11,
    /// The protocol returned nothing where a reply was expected.
    NoReply = 12,
    /// Catch-all carrying the raw payload.
    Unknown = 13,
}

impl ErrorKind {
    /// All kinds in wire-code order.
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::NoError,
        ErrorKind::MismatchArg,
        ErrorKind::DataTooLarge,
        ErrorKind::Network,
        ErrorKind::MaxMemoryLimit,
        ErrorKind::MaxMemoryPolicy,
        ErrorKind::CollectionDeleted,
        ErrorKind::BackingStore,
        ErrorKind::DataIdExists,
        ErrorKind::OlderThanAllowed,
        ErrorKind::NonExistentDataId,
        ErrorKind::IncompatibleDataVersion,
        ErrorKind::NoReply,
        ErrorKind::Unknown,
    ];

    /// The wire code of this kind.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a wire code; `None` for codes outside the taxonomy.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code)
            .ok()
            .and_then(|c| Self::ALL.get(usize::from(c)).copied())
    }

    /// Whether the kind denotes a failure (everything except [`ErrorKind::NoError`]).
    #[must_use]
    pub fn is_error(self) -> bool {
        self != ErrorKind::NoError
    }

    /// Constant name used in the Lua sources for this kind.
    #[must_use]
    pub fn lua_name(self) -> &'static str {
        match self {
            ErrorKind::NoError => "E_NO_ERROR",
            ErrorKind::MismatchArg => "E_MISMATCH_ARG",
            ErrorKind::DataTooLarge => "E_DATA_TOO_LARGE",
            ErrorKind::Network => "E_NETWORK",
            ErrorKind::MaxMemoryLimit => "E_MAXMEMORY_LIMIT",
            ErrorKind::MaxMemoryPolicy => "E_MAXMEMORY_POLICY",
            ErrorKind::CollectionDeleted => "E_COLLECTION_DELETED",
            ErrorKind::BackingStore => "E_REDIS",
            ErrorKind::DataIdExists => "E_DATA_ID_EXISTS",
            ErrorKind::OlderThanAllowed => "E_OLDER_THAN_ALLOWED",
            ErrorKind::NonExistentDataId => "E_NONEXISTENT_DATA_ID",
            ErrorKind::IncompatibleDataVersion => "E_INCOMP_DATA_VERSION",
            ErrorKind::NoReply => "E_NO_REPLY",
            ErrorKind::Unknown => "E_UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoError => "no error",
            ErrorKind::MismatchArg => "mismatched argument",
            ErrorKind::DataTooLarge => "data too large",
            ErrorKind::Network => "network failure",
            ErrorKind::MaxMemoryLimit => "out of memory after forced eviction",
            ErrorKind::MaxMemoryPolicy => "incompatible memory policy or damaged collection",
            ErrorKind::CollectionDeleted => "collection deleted",
            ErrorKind::BackingStore => "backing store error",
            ErrorKind::DataIdExists => "data id exists",
            ErrorKind::OlderThanAllowed => "older than allowed",
            ErrorKind::NonExistentDataId => "non-existent data id",
            ErrorKind::IncompatibleDataVersion => "incompatible data version",
            ErrorKind::NoReply => "no reply",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(i64::from(kind.code())), Some(kind));
        }
    }

    #[test]
    fn codes_are_dense_and_ordered() {
        for (index, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(usize::from(kind.code()), index);
        }
    }

    #[test]
    fn out_of_range_codes_decode_to_none() {
        assert_eq!(ErrorKind::from_code(14), None);
        assert_eq!(ErrorKind::from_code(-1), None);
        assert_eq!(ErrorKind::from_code(i64::MAX), None);
    }

    #[test]
    fn only_no_error_is_success() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.is_error(), kind != ErrorKind::NoError);
        }
    }
}
