//! Status-record schema and collection parameter types.
//!
//! The status record `P:S:N` is a hash holding the collection's counters and
//! settings. Counters (`lists`, `items`, `last_removed_time`) are maintained
//! by the transactional scripts; settings are written once by
//! `verify_collection` and adjusted by `resize`.

use serde::{Deserialize, Serialize};

/// Schema marker stored in every status record. An open against a record
/// carrying a different version fails with an incompatible-data-version error.
pub const DATA_VERSION: u32 = 3;

/// Lower bound for [`CollectionParams::memory_reserve`].
pub const MIN_MEMORY_RESERVE: f64 = 0.05;

/// Upper bound for [`CollectionParams::memory_reserve`].
pub const MAX_MEMORY_RESERVE: f64 = 0.5;

/// Field names of the status record, shared with the Lua scripts.
pub mod field {
    /// Number of non-empty lists.
    pub const LISTS: &str = "lists";
    /// Number of data items across all lists.
    pub const ITEMS: &str = "items";
    /// Whether items older than `last_removed_time` are admitted (0 or 1).
    pub const OLDER_ALLOWED: &str = "older_allowed";
    /// Advance-cleanup byte threshold.
    pub const ADVANCE_CLEANUP_BYTES: &str = "advance_cleanup_bytes";
    /// Advance-cleanup item-count threshold.
    pub const ADVANCE_CLEANUP_NUM: &str = "advance_cleanup_num";
    /// Fraction of `maxmemory` kept free as headroom.
    pub const MEMORY_RESERVE: &str = "memory_reserve";
    /// Schema marker, see [`DATA_VERSION`](super::DATA_VERSION).
    pub const DATA_VERSION: &str = "data_version";
    /// Data time of the most recently evicted or popped item, 0 if none.
    pub const LAST_REMOVED_TIME: &str = "last_removed_time";
}

/// Rejected collection parameter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("memory_reserve {value} is outside {min}..={max}")]
    MemoryReserveOutOfRange { value: f64, min: f64, max: f64 },
}

/// Collection settings supplied at open time and stored in the status record.
///
/// `verify_collection` writes these on first open and validates subsequent
/// opens against the stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionParams {
    /// Admit items whose data time is older than `last_removed_time`.
    pub older_allowed: bool,
    /// Once eviction starts, keep evicting until at least this many bytes of
    /// data were removed. 0 disables the byte threshold.
    pub advance_cleanup_bytes: u64,
    /// Once eviction starts, keep evicting until this many items were
    /// removed (capped at the current item count). 0 disables the threshold.
    pub advance_cleanup_num: u64,
    /// Fraction of `maxmemory` kept free; eviction begins while
    /// `used * (1 + memory_reserve) >= maxmemory`.
    pub memory_reserve: f64,
}

impl Default for CollectionParams {
    fn default() -> Self {
        Self {
            older_allowed: false,
            advance_cleanup_bytes: 0,
            advance_cleanup_num: 0,
            memory_reserve: MIN_MEMORY_RESERVE,
        }
    }
}

impl CollectionParams {
    /// Validates parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] if `memory_reserve` lies outside
    /// [`MIN_MEMORY_RESERVE`]`..=`[`MAX_MEMORY_RESERVE`].
    pub fn validate(&self) -> Result<(), ParamError> {
        if !(MIN_MEMORY_RESERVE..=MAX_MEMORY_RESERVE).contains(&self.memory_reserve) {
            return Err(ParamError::MemoryReserveOutOfRange {
                value: self.memory_reserve,
                min: MIN_MEMORY_RESERVE,
                max: MAX_MEMORY_RESERVE,
            });
        }
        Ok(())
    }
}

/// Snapshot of a collection returned by `collection_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    /// Number of non-empty lists.
    pub lists: u64,
    /// Number of data items across all lists.
    pub items: u64,
    /// Stored collection settings.
    pub params: CollectionParams,
    /// Schema marker of the stored record.
    pub data_version: u32,
    /// Data time of the most recently removed item, 0.0 if none.
    pub last_removed_time: f64,
    /// Data time of the globally oldest item, `None` when empty.
    pub oldest_time: Option<f64>,
}

/// Snapshot of one list returned by `list_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListInfo {
    /// Number of data items in the list.
    pub items: u64,
    /// Data time of the list's oldest item, `None` when the list is absent.
    pub oldest_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params() {
        let params = CollectionParams::default();
        assert!(!params.older_allowed);
        assert_eq!(params.advance_cleanup_bytes, 0);
        assert_eq!(params.advance_cleanup_num, 0);
        assert!((params.memory_reserve - MIN_MEMORY_RESERVE).abs() < f64::EPSILON);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn memory_reserve_bounds_are_inclusive() {
        let mut params = CollectionParams::default();

        params.memory_reserve = MIN_MEMORY_RESERVE;
        assert!(params.validate().is_ok());

        params.memory_reserve = MAX_MEMORY_RESERVE;
        assert!(params.validate().is_ok());

        params.memory_reserve = 0.04;
        assert!(matches!(
            params.validate(),
            Err(ParamError::MemoryReserveOutOfRange { .. })
        ));

        params.memory_reserve = 0.51;
        assert!(params.validate().is_err());
    }

    #[test]
    fn params_serde_round_trip() {
        let params = CollectionParams {
            older_allowed: true,
            advance_cleanup_bytes: 1024,
            advance_cleanup_num: 7,
            memory_reserve: 0.2,
        };
        let json = serde_json::to_string(&params).unwrap();
        let decoded: CollectionParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, decoded);
    }
}
