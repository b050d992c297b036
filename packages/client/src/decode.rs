//! Decoding of status-coded script replies.
//!
//! Every script reply is an array whose first element is a wire status code;
//! code 0 yields the payload elements, anything else maps to a typed error.
//! The remaining helpers convert individual reply elements, treating absent
//! or nil elements as [`Error::NoReply`] where a value is required.

use redis::Value;

use crate::error::{self, Error, Result};

/// Splits a script reply into its payload, mapping non-zero status codes to
/// typed errors.
pub(crate) fn status_reply(value: Value) -> Result<Vec<Value>> {
    let Value::Bulk(mut items) = value else {
        return Err(Error::NoReply);
    };
    if items.is_empty() {
        return Err(Error::NoReply);
    }
    let code = as_i64(&items[0])?;
    if code == 0 {
        items.remove(0);
        return Ok(items);
    }
    let msg = items.get(1).and_then(|v| match v {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Status(text) => Some(text.clone()),
        _ => None,
    });
    Err(error::from_wire(code, msg))
}

/// Borrows the `index`-th payload element, failing with [`Error::NoReply`]
/// when the reply is shorter than the scripts promise.
pub(crate) fn field(reply: &[Value], index: usize) -> Result<&Value> {
    reply.get(index).ok_or(Error::NoReply)
}

pub(crate) fn as_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Data(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| Error::Unknown(format!("expected integer, got {value:?}"))),
        Value::Status(text) => text
            .trim()
            .parse()
            .map_err(|_| Error::Unknown(format!("expected integer, got {value:?}"))),
        Value::Nil => Err(Error::NoReply),
        other => Err(Error::Unknown(format!("expected integer, got {other:?}"))),
    }
}

pub(crate) fn as_u64(value: &Value) -> Result<u64> {
    let v = as_i64(value)?;
    u64::try_from(v).map_err(|_| Error::Unknown(format!("expected unsigned integer, got {v}")))
}

pub(crate) fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Int(v) => {
            // Sorted-set scores fit f64 exactly for the times this engine
            // stores (four decimal places of sub-second resolution).
            #[allow(clippy::cast_precision_loss)]
            Ok(*v as f64)
        }
        Value::Data(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| Error::Unknown(format!("expected float, got {value:?}"))),
        Value::Status(text) => text
            .trim()
            .parse()
            .map_err(|_| Error::Unknown(format!("expected float, got {value:?}"))),
        Value::Nil => Err(Error::NoReply),
        other => Err(Error::Unknown(format!("expected float, got {other:?}"))),
    }
}

pub(crate) fn into_bytes(value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Data(bytes) => Ok(bytes),
        Value::Status(text) => Ok(text.into_bytes()),
        Value::Nil => Err(Error::NoReply),
        other => Err(Error::Unknown(format!("expected bytes, got {other:?}"))),
    }
}

pub(crate) fn into_string(value: Value) -> Result<String> {
    let bytes = into_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| Error::Unknown(format!("non-utf8 reply: {e}")))
}

/// Decodes a flat `field, value, field, value, ...` array as id/bytes pairs.
pub(crate) fn into_pairs(value: Value) -> Result<Vec<(String, Vec<u8>)>> {
    let Value::Bulk(items) = value else {
        return Err(Error::Unknown(format!("expected an array, got {value:?}")));
    };
    if items.len() % 2 != 0 {
        return Err(Error::Unknown(format!(
            "expected an even-length array, got {} elements",
            items.len()
        )));
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(id), Some(data)) = (it.next(), it.next()) {
        pairs.push((into_string(id)?, into_bytes(data)?));
    }
    Ok(pairs)
}

/// Decodes an array of byte strings.
pub(crate) fn into_bytes_vec(value: Value) -> Result<Vec<Vec<u8>>> {
    let Value::Bulk(items) = value else {
        return Err(Error::Unknown(format!("expected an array, got {value:?}")));
    };
    items.into_iter().map(into_bytes).collect()
}

/// Reads an optional trailing float element (absent or nil means `None`).
pub(crate) fn opt_f64(reply: &[Value], index: usize) -> Result<Option<f64>> {
    match reply.get(index) {
        None | Some(Value::Nil) => Ok(None),
        Some(value) => as_f64(value).map(Some),
    }
}
