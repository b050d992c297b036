//! Key derivation for a collection and its lists on the backing store.
//!
//! A collection named `N` under namespace prefix `P` owns exactly four kinds
//! of keys:
//!
//! - `P:Q:N` -- the queue index, a sorted set of list ids scored by the data
//!   time of each list's oldest item
//! - `P:S:N` -- the status record, a hash of collection counters and settings
//! - `P:D:N:L` -- the data map of list `L`, data id to data bytes
//! - `P:T:N:L` -- the time index of list `L`, data id scored by data time
//!   (present only while the list holds two or more items)
//!
//! # Naming rules
//!
//! Collection names and list ids must be non-empty and must not contain the
//! `:` character, so that `P:D:N:*` enumerates exactly the data maps of `N`
//! and nothing else.

use std::fmt;

/// Default namespace prefix used when the caller does not configure one.
pub const DEFAULT_NAMESPACE: &str = "C";

/// Rejected collection name, list id, or namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("{what} must not be empty")]
    Empty { what: &'static str },
    #[error("{what} must not contain ':': {value:?}")]
    ContainsColon { what: &'static str, value: String },
}

/// Checks a collection name, list id, or namespace prefix against the naming
/// rules: non-empty and colon-free.
pub fn validate_id(what: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty { what });
    }
    if value.contains(':') {
        return Err(IdError::ContainsColon {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Derives the backing-store key names belonging to one collection.
///
/// Constructed once per collection handle; list-level keys are derived on
/// demand from a validated list id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    collection: String,
}

impl KeySpace {
    /// Creates a key space for `collection` under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if either part is empty or contains `:`.
    pub fn new(prefix: &str, collection: &str) -> Result<Self, IdError> {
        validate_id("namespace prefix", prefix)?;
        validate_id("collection name", collection)?;
        Ok(Self {
            prefix: prefix.to_string(),
            collection: collection.to_string(),
        })
    }

    /// The namespace prefix `P`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The collection name `N`.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Queue index key `P:Q:N`.
    #[must_use]
    pub fn queue_key(&self) -> String {
        format!("{}:Q:{}", self.prefix, self.collection)
    }

    /// Status record key `P:S:N`.
    #[must_use]
    pub fn status_key(&self) -> String {
        format!("{}:S:{}", self.prefix, self.collection)
    }

    /// Data map key `P:D:N:L` for list `L`.
    #[must_use]
    pub fn data_key(&self, list_id: &str) -> String {
        format!("{}:D:{}:{}", self.prefix, self.collection, list_id)
    }

    /// Time index key `P:T:N:L` for list `L`.
    #[must_use]
    pub fn time_key(&self, list_id: &str) -> String {
        format!("{}:T:{}:{}", self.prefix, self.collection, list_id)
    }

    /// Glob matching every data map of the collection: `P:D:N:*`.
    #[must_use]
    pub fn data_pattern(&self) -> String {
        format!("{}:D:{}:*", self.prefix, self.collection)
    }

    /// Glob matching every time index of the collection: `P:T:N:*`.
    #[must_use]
    pub fn time_pattern(&self) -> String {
        format!("{}:T:{}:*", self.prefix, self.collection)
    }

    /// Extracts the list id from a data map key of this collection.
    ///
    /// Returns `None` for keys that belong to another collection or another
    /// key kind.
    #[must_use]
    pub fn list_id_from_data_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let head = format!("{}:D:{}:", self.prefix, self.collection);
        key.strip_prefix(head.as_str())
    }
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:*:{}", self.prefix, self.collection)
    }
}
