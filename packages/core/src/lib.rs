//! Capped-collection core -- key space, status schema, wire codes, and the
//! transactional scripts.
//!
//! This crate is the backing-store-independent half of the engine:
//!
//! - **KeySpace** ([`keyspace`]): key derivation and naming rules for a
//!   collection's queue, status, data, and time keys
//! - **Status** ([`status`]): status-record field names, schema version,
//!   collection parameters, and info snapshots
//! - **Errors** ([`error`]): the wire status-code taxonomy shared between
//!   scripts and driver
//! - **Scripts** ([`scripts`]): the Lua sources executed atomically on the
//!   backing store, embedding the memory probe, the evictor, and the
//!   rollback guard

pub mod error;
pub mod keyspace;
pub mod scripts;
pub mod status;

pub use error::ErrorKind;
pub use keyspace::{validate_id, IdError, KeySpace, DEFAULT_NAMESPACE};
pub use scripts::ScriptName;
pub use status::{
    CollectionInfo, CollectionParams, ListInfo, ParamError, DATA_VERSION, MAX_MEMORY_RESERVE,
    MIN_MEMORY_RESERVE,
};
