//! Memory probe: server memory usage, ceiling, and eviction policy.
//!
//! The scripts probe memory themselves inside the atomic context; this
//! client-side probe exists for the open-time policy check, the
//! `max_datasize` default, and the `redis_config_ok` surface.

use redis::{cmd, Cmd, Value};

use crate::decode;
use crate::error::{Error, Result};

/// Hard ceiling for a single data item: 512 MiB, the backing store's own
/// per-string limit.
pub const MAX_DATASIZE_CEILING: u64 = 512 * 1024 * 1024;

/// The only `maxmemory-policy` the engine can operate under. Any other
/// policy deletes arbitrary keys behind the engine's back and violates the
/// collection invariants.
pub const REQUIRED_MAXMEMORY_POLICY: &str = "noeviction";

/// Extracts `used_memory` from an `INFO memory` report.
#[must_use]
pub fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
}

/// Default per-item bound: `min(512 MiB, maxmemory)`, or the hard ceiling
/// when no memory limit is configured.
#[must_use]
pub fn default_max_datasize(maxmemory: u64) -> u64 {
    if maxmemory == 0 {
        MAX_DATASIZE_CEILING
    } else {
        maxmemory.min(MAX_DATASIZE_CEILING)
    }
}

pub(crate) fn info_memory_cmd() -> Cmd {
    let mut c = cmd("INFO");
    c.arg("memory");
    c
}

pub(crate) fn config_get_cmd(parameter: &str) -> Cmd {
    let mut c = cmd("CONFIG");
    c.arg("GET").arg(parameter);
    c
}

/// Decodes a `CONFIG GET` reply (`[name, value]`) to the value string.
pub(crate) fn parse_config_value(value: Value) -> Result<String> {
    let Value::Bulk(items) = value else {
        return Err(Error::NoReply);
    };
    let raw = items.into_iter().nth(1).ok_or(Error::NoReply)?;
    decode::into_string(raw)
}

/// Decodes an `INFO memory` reply to the `used_memory` byte count.
pub(crate) fn parse_info_used_memory(value: Value) -> Result<u64> {
    let text = decode::into_string(value)?;
    parse_used_memory(&text)
        .ok_or_else(|| Error::Unknown("INFO memory report lacks used_memory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_used_memory_from_info_report() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_used_memory(info), Some(1_048_576));
    }

    #[test]
    fn ignores_lookalike_fields() {
        // used_memory_rss must not satisfy the used_memory lookup.
        let info = "used_memory_rss:999\r\nused_memory:42\r\n";
        assert_eq!(parse_used_memory(info), Some(42));
        assert_eq!(parse_used_memory("# Memory\r\nmaxmemory:0\r\n"), None);
    }

    #[test]
    fn default_max_datasize_caps_at_512_mib() {
        assert_eq!(default_max_datasize(0), MAX_DATASIZE_CEILING);
        assert_eq!(default_max_datasize(1024), 1024);
        assert_eq!(default_max_datasize(u64::MAX), MAX_DATASIZE_CEILING);
    }

    #[test]
    fn config_reply_decodes_to_value_string() {
        let reply = Value::Bulk(vec![
            Value::Data(b"maxmemory-policy".to_vec()),
            Value::Data(b"noeviction".to_vec()),
        ]);
        assert_eq!(parse_config_value(reply).unwrap(), "noeviction");
        assert!(parse_config_value(Value::Nil).is_err());
    }

    #[test]
    fn info_reply_decodes_to_used_memory() {
        let reply = Value::Data(b"# Memory\r\nused_memory:2048\r\n".to_vec());
        assert_eq!(parse_info_used_memory(reply).unwrap(), 2048);
    }
}
