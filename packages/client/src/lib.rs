//! Capped-collection client -- Redis driver and eviction-aware operations.
//!
//! A capped collection is a named container of many lists of `(data id,
//! data time, bytes)` items, stored on one Redis instance and aged out
//! oldest-first across all lists when the server approaches its memory
//! ceiling. All mutations run as atomic server-side scripts (see
//! `capcoll-core`); this crate owns the connection, the script-digest
//! cache, reply decoding, and the typed operation surface.
//!
//! - **Collection** ([`collection`]): the public handle -- insert, update,
//!   upsert, receive, pop-oldest, info, and maintenance operations
//! - **Config** ([`config`]): open-time settings
//! - **Errors** ([`error`]): the operation failure taxonomy
//! - **Driver** ([`driver`]): digest-or-source script dispatch
//! - **Probe** ([`probe`]): server memory usage, ceiling, and policy
//!
//! The server must run with `maxmemory-policy noeviction`; any other policy
//! deletes keys behind the engine's back, and [`Collection::open`] refuses
//! to operate.
//!
//! # Examples
//!
//! ```no_run
//! use capcoll_client::{Collection, CollectionConfig};
//!
//! # async fn demo() -> Result<(), capcoll_client::Error> {
//! let mut config = CollectionConfig::new("redis://127.0.0.1:6379/", "events");
//! config.params.older_allowed = true;
//! let mut collection = Collection::open(config).await?;
//!
//! collection.insert("sensor-1", "reading-1", b"hello", Some(1.0)).await?;
//! let data = collection.receive("sensor-1", "reading-1").await?;
//! assert_eq!(data.as_deref(), Some(&b"hello"[..]));
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
mod decode;
mod driver;
pub mod error;
pub mod probe;

pub use capcoll_core::{
    CollectionInfo, CollectionParams, ErrorKind, ListInfo, DATA_VERSION, DEFAULT_NAMESPACE,
};
pub use collection::{Collection, ResizeRequest};
pub use config::CollectionConfig;
pub use error::{Error, Result};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn reexports_accessible() {
        let _config = crate::CollectionConfig::default();
        let _params = crate::CollectionParams::default();
        let _kind = crate::ErrorKind::NoError;
        let _request = crate::ResizeRequest::default();
    }
}
