//! Handle configuration.

use serde::{Deserialize, Serialize};

use capcoll_core::{validate_id, CollectionParams, DEFAULT_NAMESPACE};

use crate::error::{Error, Result};
use crate::probe;

/// Configuration for opening a [`Collection`](crate::Collection) handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Backing store URL, e.g. `redis://127.0.0.1:6379/`.
    pub url: String,
    /// Collection name. Non-empty, colon-free.
    pub name: String,
    /// Namespace prefix shared by every key of the collection.
    pub namespace: String,
    /// Collection settings written on first open and validated against the
    /// stored values afterwards.
    pub params: CollectionParams,
    /// Reconnect once on a network-class failure. Argument and policy
    /// errors never trigger a reconnect.
    pub reconnect_on_error: bool,
    /// Per-item size bound. `None` derives `min(512 MiB, maxmemory)` from
    /// the server at open time.
    pub max_datasize: Option<u64>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
            name: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            params: CollectionParams::default(),
            reconnect_on_error: false,
            max_datasize: None,
        }
    }
}

impl CollectionConfig {
    /// Creates a configuration with default settings for `name` at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id("collection name", &self.name)
            .map_err(|e| Error::MismatchArg(e.to_string()))?;
        validate_id("namespace prefix", &self.namespace)
            .map_err(|e| Error::MismatchArg(e.to_string()))?;
        self.params
            .validate()
            .map_err(|e| Error::MismatchArg(e.to_string()))?;
        if let Some(max) = self.max_datasize {
            if max == 0 || max > probe::MAX_DATASIZE_CEILING {
                return Err(Error::MismatchArg(format!(
                    "max_datasize {max} outside 1..={}",
                    probe::MAX_DATASIZE_CEILING
                )));
            }
        }
        Ok(())
    }
}
