//! The public collection handle.
//!
//! One handle owns one connection and addresses one collection. Every
//! operation is a single script dispatch (one round-trip, atomic on the
//! server); the handle only validates arguments, formats times, and decodes
//! the status-coded reply.

use std::time::{SystemTime, UNIX_EPOCH};

use redis::{cmd, Value};
use serde::Serialize;
use tracing::debug;

use capcoll_core::status::field;
use capcoll_core::{
    validate_id, CollectionInfo, CollectionParams, ErrorKind, KeySpace, ListInfo, ScriptName,
    DATA_VERSION,
};

use crate::config::CollectionConfig;
use crate::decode;
use crate::driver::ClientDriver;
use crate::error::{Error, Result};
use crate::probe;

/// Wall-clock seconds since the Unix epoch, at the four-decimal-place
/// resolution the engine stores.
fn wall_clock() -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    round_time(now.as_secs_f64())
}

fn round_time(time: f64) -> f64 {
    (time * 10_000.0).round() / 10_000.0
}

fn format_time(time: f64) -> String {
    format!("{time:.4}")
}

fn validate_time(what: &'static str, time: Option<f64>) -> Result<()> {
    if let Some(t) = time {
        if !t.is_finite() || t <= 0.0 {
            return Err(Error::MismatchArg(format!(
                "{what} must be a positive number, got {t}"
            )));
        }
    }
    Ok(())
}

/// Status fields adjustable through [`Collection::resize`]. `None` fields
/// are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResizeRequest {
    pub advance_cleanup_bytes: Option<u64>,
    pub advance_cleanup_num: Option<u64>,
    pub memory_reserve: Option<f64>,
    pub older_allowed: Option<bool>,
}

/// A capped collection on one backing-store instance.
///
/// Opened with [`Collection::open`]; creation is idempotent, and reopening
/// an existing collection validates the supplied parameters against the
/// stored ones.
#[derive(Debug)]
pub struct Collection {
    driver: ClientDriver,
    keys: KeySpace,
    params: CollectionParams,
    max_datasize: u64,
    last_errorcode: ErrorKind,
}

impl Collection {
    /// Opens (creating if necessary) the collection described by `config`.
    ///
    /// # Errors
    ///
    /// [`Error::MismatchArg`] for invalid configuration or parameters that
    /// differ from the stored ones; [`Error::MaxMemoryPolicy`] when the
    /// server is configured to evict keys on its own;
    /// [`Error::IncompatibleDataVersion`] for a schema mismatch;
    /// [`Error::Network`] when the server is unreachable.
    pub async fn open(config: CollectionConfig) -> Result<Self> {
        config.validate()?;
        let keys = KeySpace::new(&config.namespace, &config.name)
            .map_err(|e| Error::MismatchArg(e.to_string()))?;
        let driver = ClientDriver::connect(&config.url, config.reconnect_on_error).await?;

        let mut collection = Self {
            driver,
            keys,
            params: config.params.clone(),
            max_datasize: 0,
            last_errorcode: ErrorKind::NoError,
        };

        let policy = collection.maxmemory_policy().await?;
        if policy != probe::REQUIRED_MAXMEMORY_POLICY {
            return Err(Error::MaxMemoryPolicy(format!(
                "maxmemory-policy is {policy}, the engine requires {}",
                probe::REQUIRED_MAXMEMORY_POLICY
            )));
        }

        let maxmemory = collection.maxmemory().await?;
        collection.max_datasize = match config.max_datasize {
            Some(value) => value,
            None => probe::default_max_datasize(maxmemory),
        };

        collection.verify(&config.params).await?;
        debug!(
            collection = collection.keys.collection(),
            namespace = collection.keys.prefix(),
            "collection opened"
        );
        Ok(collection)
    }

    /// Creates the status record or validates this handle's parameters
    /// against a pre-existing one.
    async fn verify(&mut self, params: &CollectionParams) -> Result<()> {
        let reply = self
            .call(
                ScriptName::VerifyCollection,
                vec![
                    u8::from(params.older_allowed).to_string().into_bytes(),
                    params.advance_cleanup_bytes.to_string().into_bytes(),
                    params.advance_cleanup_num.to_string().into_bytes(),
                    params.memory_reserve.to_string().into_bytes(),
                    DATA_VERSION.to_string().into_bytes(),
                ],
            )
            .await?;

        let created = decode::as_u64(decode::field(&reply, 0)?)? == 1;
        if created {
            return Ok(());
        }

        let stored_version = decode::as_u64(decode::field(&reply, 5)?)?;
        if stored_version != u64::from(DATA_VERSION) {
            return self.invalid(Error::IncompatibleDataVersion {
                stored: stored_version,
                expected: u64::from(DATA_VERSION),
            });
        }
        let stored_older = decode::as_u64(decode::field(&reply, 1)?)? == 1;
        let stored_bytes = decode::as_u64(decode::field(&reply, 2)?)?;
        let stored_num = decode::as_u64(decode::field(&reply, 3)?)?;
        let stored_reserve = decode::as_f64(decode::field(&reply, 4)?)?;

        if stored_older != params.older_allowed {
            return self.invalid(Error::MismatchArg(format!(
                "older_allowed mismatch: stored {stored_older}, requested {}",
                params.older_allowed
            )));
        }
        if stored_bytes != params.advance_cleanup_bytes {
            return self.invalid(Error::MismatchArg(format!(
                "advance_cleanup_bytes mismatch: stored {stored_bytes}, requested {}",
                params.advance_cleanup_bytes
            )));
        }
        if stored_num != params.advance_cleanup_num {
            return self.invalid(Error::MismatchArg(format!(
                "advance_cleanup_num mismatch: stored {stored_num}, requested {}",
                params.advance_cleanup_num
            )));
        }
        if (stored_reserve - params.memory_reserve).abs() > 1e-9 {
            return self.invalid(Error::MismatchArg(format!(
                "memory_reserve mismatch: stored {stored_reserve}, requested {}",
                params.memory_reserve
            )));
        }
        Ok(())
    }

    // --- Item operations ---

    /// Inserts one item. `data_time` defaults to the current wall clock.
    ///
    /// Returns the list id the item landed in. Insertion may evict older
    /// items first when the server is under memory pressure.
    pub async fn insert(
        &mut self,
        list_id: &str,
        data_id: &str,
        data: &[u8],
        data_time: Option<f64>,
    ) -> Result<String> {
        self.check_list_id(list_id)?;
        if let Err(e) = validate_time("data_time", data_time) {
            return self.invalid(e);
        }
        self.check_data_size(data)?;
        let time = data_time.map_or_else(wall_clock, round_time);

        let reply = self
            .call(
                ScriptName::Insert,
                vec![
                    list_id.into(),
                    data_id.into(),
                    data.to_vec(),
                    format_time(time).into_bytes(),
                ],
            )
            .await?;
        let cleanings = decode::as_u64(decode::field(&reply, 0)?)?;
        if cleanings > 0 {
            debug!(list_id, cleanings, "insert evicted older items");
        }
        Ok(list_id.to_string())
    }

    /// Overwrites the data of an existing item; `new_data_time` moves it to
    /// a new time, `None` keeps the existing one.
    pub async fn update(
        &mut self,
        list_id: &str,
        data_id: &str,
        data: &[u8],
        new_data_time: Option<f64>,
    ) -> Result<bool> {
        self.check_list_id(list_id)?;
        if let Err(e) = validate_time("new_data_time", new_data_time) {
            return self.invalid(e);
        }
        self.check_data_size(data)?;
        let time_arg = new_data_time.map_or_else(|| "0".to_string(), |t| format_time(round_time(t)));

        let reply = self
            .call(
                ScriptName::Update,
                vec![
                    list_id.into(),
                    data_id.into(),
                    data.to_vec(),
                    time_arg.into_bytes(),
                ],
            )
            .await?;
        let cleanings = decode::as_u64(decode::field(&reply, 0)?)?;
        if cleanings > 0 {
            debug!(list_id, cleanings, "update evicted older items");
        }
        Ok(true)
    }

    /// Updates the item when `data_id` exists in the list, inserts it
    /// otherwise. One atomic dispatch; semantics match whichever branch is
    /// taken.
    pub async fn upsert(
        &mut self,
        list_id: &str,
        data_id: &str,
        data: &[u8],
        data_time: Option<f64>,
    ) -> Result<String> {
        self.check_list_id(list_id)?;
        if let Err(e) = validate_time("data_time", data_time) {
            return self.invalid(e);
        }
        self.check_data_size(data)?;
        let time_arg = data_time.map_or_else(String::new, |t| format_time(round_time(t)));

        let reply = self
            .call(
                ScriptName::Upsert,
                vec![
                    list_id.into(),
                    data_id.into(),
                    data.to_vec(),
                    time_arg.into_bytes(),
                    format_time(wall_clock()).into_bytes(),
                ],
            )
            .await?;
        let cleanings = decode::as_u64(decode::field(&reply, 0)?)?;
        if cleanings > 0 {
            debug!(list_id, cleanings, "upsert evicted older items");
        }
        Ok(list_id.to_string())
    }

    /// Reads one item's data. `None` when the list or the id is absent.
    pub async fn receive(&mut self, list_id: &str, data_id: &str) -> Result<Option<Vec<u8>>> {
        self.check_list_id(list_id)?;
        let reply = self
            .call(
                ScriptName::Receive,
                vec![list_id.into(), b"val".to_vec(), data_id.into()],
            )
            .await?;
        match reply.into_iter().next() {
            None | Some(Value::Nil) => Ok(None),
            Some(value) => decode::into_bytes(value).map(Some),
        }
    }

    /// Reads the data of every item in the list, in backing-store order.
    pub async fn receive_values(&mut self, list_id: &str) -> Result<Vec<Vec<u8>>> {
        self.check_list_id(list_id)?;
        let mut reply = self
            .call(
                ScriptName::Receive,
                vec![list_id.into(), b"vals".to_vec(), Vec::new()],
            )
            .await?;
        if reply.is_empty() {
            return Ok(Vec::new());
        }
        decode::into_bytes_vec(reply.swap_remove(0))
    }

    /// Reads every `(data id, data)` pair in the list.
    pub async fn receive_all(&mut self, list_id: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.check_list_id(list_id)?;
        let mut reply = self
            .call(
                ScriptName::Receive,
                vec![list_id.into(), b"all".to_vec(), Vec::new()],
            )
            .await?;
        if reply.is_empty() {
            return Ok(Vec::new());
        }
        decode::into_pairs(reply.swap_remove(0))
    }

    /// Number of items in the list; 0 when absent.
    pub async fn list_len(&mut self, list_id: &str) -> Result<u64> {
        self.check_list_id(list_id)?;
        let reply = self
            .call(
                ScriptName::Receive,
                vec![list_id.into(), b"len".to_vec(), Vec::new()],
            )
            .await?;
        decode::as_u64(decode::field(&reply, 0)?)
    }

    /// Removes and returns the globally oldest item as `(list id, data)`,
    /// or `None` when the collection is empty.
    pub async fn pop_oldest(&mut self) -> Result<Option<(String, Vec<u8>)>> {
        let reply = self.call(ScriptName::PopOldest, Vec::new()).await?;
        let mut it = reply.into_iter();
        let popped = decode::as_u64(&it.next().ok_or(Error::NoReply)?)? == 1;
        if !popped {
            return Ok(None);
        }
        let list_id = decode::into_string(it.next().ok_or(Error::NoReply)?)?;
        let data = decode::into_bytes(it.next().ok_or(Error::NoReply)?)?;
        Ok(Some((list_id, data)))
    }

    // --- Inspection ---

    /// Counters, settings, and the globally oldest time.
    pub async fn collection_info(&mut self) -> Result<CollectionInfo> {
        let reply = self.call(ScriptName::CollectionInfo, Vec::new()).await?;
        let lists = decode::as_u64(decode::field(&reply, 0)?)?;
        let items = decode::as_u64(decode::field(&reply, 1)?)?;
        let older_allowed = decode::as_u64(decode::field(&reply, 2)?)? == 1;
        let advance_cleanup_bytes = decode::as_u64(decode::field(&reply, 3)?)?;
        let advance_cleanup_num = decode::as_u64(decode::field(&reply, 4)?)?;
        let memory_reserve = decode::as_f64(decode::field(&reply, 5)?)?;
        let data_version = decode::as_u64(decode::field(&reply, 6)?)?;
        let data_version = u32::try_from(data_version)
            .map_err(|_| Error::Unknown(format!("data_version {data_version} out of range")))?;
        let last_removed_time = decode::as_f64(decode::field(&reply, 7)?)?;
        let oldest_time = decode::opt_f64(&reply, 8)?;
        Ok(CollectionInfo {
            lists,
            items,
            params: CollectionParams {
                older_allowed,
                advance_cleanup_bytes,
                advance_cleanup_num,
                memory_reserve,
            },
            data_version,
            last_removed_time,
            oldest_time,
        })
    }

    /// Item count and oldest time of one list.
    pub async fn list_info(&mut self, list_id: &str) -> Result<ListInfo> {
        self.check_list_id(list_id)?;
        let reply = self
            .call(ScriptName::ListInfo, vec![list_id.into()])
            .await?;
        let items = decode::as_u64(decode::field(&reply, 0)?)?;
        let oldest_time = decode::opt_f64(&reply, 1)?;
        Ok(ListInfo { items, oldest_time })
    }

    /// Data time of the globally oldest item, `None` when empty.
    pub async fn oldest_time(&mut self) -> Result<Option<f64>> {
        let reply = self.call(ScriptName::OldestTime, Vec::new()).await?;
        decode::opt_f64(&reply, 0)
    }

    /// Whether the list currently holds at least one item.
    pub async fn list_exists(&mut self, list_id: &str) -> Result<bool> {
        self.check_list_id(list_id)?;
        let mut exists = cmd("EXISTS");
        exists.arg(self.keys.data_key(list_id));
        let value = self.raw(&exists).await?;
        Ok(decode::as_u64(&value)? == 1)
    }

    /// Whether the collection's status record exists.
    pub async fn collection_exists(&mut self) -> Result<bool> {
        let mut exists = cmd("EXISTS");
        exists.arg(self.keys.status_key());
        let value = self.raw(&exists).await?;
        Ok(decode::as_u64(&value)? == 1)
    }

    /// Enumerates the list ids of the collection.
    ///
    /// Backed by pattern key enumeration, O(keys on the instance); a
    /// maintenance call, like drop and clear.
    pub async fn lists(&mut self) -> Result<Vec<String>> {
        let mut keys_cmd = cmd("KEYS");
        keys_cmd.arg(self.keys.data_pattern());
        let value = self.raw(&keys_cmd).await?;
        let Value::Bulk(items) = value else {
            return Err(Error::NoReply);
        };
        let mut lists = Vec::with_capacity(items.len());
        for item in items {
            let key = decode::into_string(item)?;
            if let Some(list_id) = self.keys.list_id_from_data_key(&key) {
                lists.push(list_id.to_string());
            }
        }
        lists.sort_unstable();
        Ok(lists)
    }

    // --- Maintenance ---

    /// Deletes the collection and every key it owns. Returns the number of
    /// keys deleted. O(keys on the instance).
    pub async fn drop_collection(&mut self) -> Result<u64> {
        let reply = self.call(ScriptName::DropCollection, Vec::new()).await?;
        decode::as_u64(decode::field(&reply, 0)?)
    }

    /// Purges all items and lists, keeping the status record and its
    /// settings. Returns the number of keys deleted. O(keys on the
    /// instance).
    pub async fn clear_collection(&mut self) -> Result<u64> {
        let reply = self.call(ScriptName::ClearCollection, Vec::new()).await?;
        decode::as_u64(decode::field(&reply, 0)?)
    }

    /// Deletes one list and its items. Returns whether the list existed.
    pub async fn drop_list(&mut self, list_id: &str) -> Result<bool> {
        self.check_list_id(list_id)?;
        let reply = self
            .call(ScriptName::DropList, vec![list_id.into()])
            .await?;
        Ok(decode::as_u64(decode::field(&reply, 0)?)? == 1)
    }

    /// Adjusts stored status fields. Returns the number of fields changed.
    pub async fn resize(&mut self, request: ResizeRequest) -> Result<usize> {
        if let Some(reserve) = request.memory_reserve {
            let probe_params = CollectionParams {
                memory_reserve: reserve,
                ..self.params.clone()
            };
            if let Err(e) = probe_params.validate() {
                return self.invalid(Error::MismatchArg(e.to_string()));
            }
        }
        if !self.collection_exists().await? {
            return self.invalid(Error::CollectionDeleted);
        }

        let status_key = self.keys.status_key();
        let mut changed = 0usize;
        if let Some(value) = request.advance_cleanup_bytes {
            self.write_status_field(&status_key, field::ADVANCE_CLEANUP_BYTES, value.to_string())
                .await?;
            self.params.advance_cleanup_bytes = value;
            changed += 1;
        }
        if let Some(value) = request.advance_cleanup_num {
            self.write_status_field(&status_key, field::ADVANCE_CLEANUP_NUM, value.to_string())
                .await?;
            self.params.advance_cleanup_num = value;
            changed += 1;
        }
        if let Some(value) = request.memory_reserve {
            self.write_status_field(&status_key, field::MEMORY_RESERVE, value.to_string())
                .await?;
            self.params.memory_reserve = value;
            changed += 1;
        }
        if let Some(value) = request.older_allowed {
            self.write_status_field(&status_key, field::OLDER_ALLOWED, u8::from(value).to_string())
                .await?;
            self.params.older_allowed = value;
            changed += 1;
        }
        debug!(changed, "collection resized");
        Ok(changed)
    }

    // --- Server state ---

    /// Whether the server's `maxmemory-policy` is the one the engine
    /// requires.
    pub async fn redis_config_ok(&mut self) -> Result<bool> {
        Ok(self.maxmemory_policy().await? == probe::REQUIRED_MAXMEMORY_POLICY)
    }

    /// Round-trips the connection.
    pub async fn ping(&mut self) -> Result<bool> {
        let value = self.raw(&cmd("PING")).await?;
        Ok(matches!(value, Value::Status(ref s) if s == "PONG"))
    }

    /// Current `used_memory` of the server in bytes.
    pub async fn used_memory(&mut self) -> Result<u64> {
        let value = self.raw(&probe::info_memory_cmd()).await?;
        probe::parse_info_used_memory(value)
    }

    /// Configured `maxmemory` of the server in bytes (0 = no ceiling).
    pub async fn maxmemory(&mut self) -> Result<u64> {
        let value = self.raw(&probe::config_get_cmd("maxmemory")).await?;
        let text = probe::parse_config_value(value)?;
        text.parse()
            .map_err(|_| Error::Unknown(format!("unparsable maxmemory: {text}")))
    }

    async fn maxmemory_policy(&mut self) -> Result<String> {
        let value = self.raw(&probe::config_get_cmd("maxmemory-policy")).await?;
        probe::parse_config_value(value)
    }

    /// Closes the handle and drops the connection.
    pub fn quit(self) {
        debug!(collection = self.keys.collection(), "collection handle closed");
        drop(self);
    }

    // --- Accessors ---

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.keys.collection()
    }

    /// Namespace prefix.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.keys.prefix()
    }

    /// Settings this handle was opened with.
    #[must_use]
    pub fn params(&self) -> &CollectionParams {
        &self.params
    }

    /// Current per-item size bound in bytes.
    #[must_use]
    pub fn max_datasize(&self) -> u64 {
        self.max_datasize
    }

    /// Tightens or relaxes the per-item size bound.
    pub fn set_max_datasize(&mut self, value: u64) -> Result<()> {
        if value == 0 || value > probe::MAX_DATASIZE_CEILING {
            return self.invalid(Error::MismatchArg(format!(
                "max_datasize {value} outside 1..={}",
                probe::MAX_DATASIZE_CEILING
            )));
        }
        self.max_datasize = value;
        Ok(())
    }

    /// Kind of the most recent error surfaced by this handle,
    /// [`ErrorKind::NoError`] after a successful operation.
    #[must_use]
    pub fn last_errorcode(&self) -> ErrorKind {
        self.last_errorcode
    }

    // --- Plumbing ---

    async fn call(&mut self, script: ScriptName, extra_args: Vec<Vec<u8>>) -> Result<Vec<Value>> {
        let keys = [self.keys.queue_key(), self.keys.status_key()];
        let mut args: Vec<Vec<u8>> = Vec::with_capacity(extra_args.len() + 2);
        args.push(self.keys.prefix().into());
        args.push(self.keys.collection().into());
        args.extend(extra_args);
        let result = self.driver.script(script, &keys, &args).await;
        self.last_errorcode = match &result {
            Ok(_) => ErrorKind::NoError,
            Err(e) => e.kind(),
        };
        result
    }

    async fn raw(&mut self, command: &redis::Cmd) -> Result<Value> {
        let result = self.driver.command(command).await;
        self.last_errorcode = match &result {
            Ok(_) => ErrorKind::NoError,
            Err(e) => e.kind(),
        };
        result
    }

    async fn write_status_field(
        &mut self,
        status_key: &str,
        name: &str,
        value: String,
    ) -> Result<()> {
        let mut hset = cmd("HSET");
        hset.arg(status_key).arg(name).arg(value);
        self.raw(&hset).await?;
        Ok(())
    }

    /// Records the error kind on the handle before surfacing it.
    fn invalid<T>(&mut self, err: Error) -> Result<T> {
        self.last_errorcode = err.kind();
        Err(err)
    }

    fn check_list_id(&mut self, list_id: &str) -> Result<()> {
        if let Err(e) = validate_id("list id", list_id) {
            return self.invalid(Error::MismatchArg(e.to_string()));
        }
        Ok(())
    }

    fn check_data_size(&mut self, data: &[u8]) -> Result<()> {
        let size = u64::try_from(data.len()).unwrap_or(u64::MAX);
        if size > self.max_datasize {
            let max = self.max_datasize;
            return self.invalid(Error::DataTooLarge { size, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_round_to_four_decimal_places() {
        assert!((round_time(1.000_04) - 1.0).abs() < 1e-12);
        assert!((round_time(1.000_06) - 1.0001).abs() < 1e-12);
        assert_eq!(format_time(1.0), "1.0000");
        assert_eq!(format_time(1_700_000_000.123_44), "1700000000.1234");
    }

    #[test]
    fn wall_clock_is_positive_and_rounded() {
        let now = wall_clock();
        assert!(now > 0.0);
        assert!((round_time(now) - now).abs() < 1e-12);
    }

    #[test]
    fn time_validation_rejects_non_positive_and_non_finite() {
        assert!(validate_time("data_time", None).is_ok());
        assert!(validate_time("data_time", Some(1.5)).is_ok());
        assert!(validate_time("data_time", Some(0.0)).is_err());
        assert!(validate_time("data_time", Some(-3.0)).is_err());
        assert!(validate_time("data_time", Some(f64::NAN)).is_err());
        assert!(validate_time("data_time", Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn resize_request_defaults_to_no_changes() {
        let request = ResizeRequest::default();
        assert!(request.advance_cleanup_bytes.is_none());
        assert!(request.advance_cleanup_num.is_none());
        assert!(request.memory_reserve.is_none());
        assert!(request.older_allowed.is_none());
    }
}
