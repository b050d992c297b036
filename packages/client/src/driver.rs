//! Script dispatch and connection ownership.
//!
//! The driver owns the multiplexed connection and a per-connection digest
//! cache. A script is sent as source (`SCRIPT LOAD`) the first time, then by
//! digest (`EVALSHA`). The cache is invalidated per script on a
//! no-such-script reply and wholesale on any out-of-memory reply, so a
//! restarted or flushed server is always healed by the next dispatch.

use std::collections::HashMap;

use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{cmd, Value};
use tracing::{debug, warn};

use capcoll_core::ScriptName;

use crate::decode;
use crate::error::{classify_redis_error, Error, Result};

/// Script name to server-side digest, scoped to one connection.
#[derive(Debug, Default)]
pub(crate) struct DigestCache {
    digests: HashMap<ScriptName, String>,
}

impl DigestCache {
    fn get(&self, script: ScriptName) -> Option<&str> {
        self.digests.get(&script).map(String::as_str)
    }

    fn put(&mut self, script: ScriptName, digest: String) {
        self.digests.insert(script, digest);
    }

    fn invalidate(&mut self, script: ScriptName) {
        self.digests.remove(&script);
    }

    fn clear(&mut self) {
        self.digests.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.digests.len()
    }
}

async fn load_script<C>(conn: &mut C, script: ScriptName) -> Result<String>
where
    C: ConnectionLike + Send,
{
    debug!(script = script.name(), "sending script source");
    let mut load = cmd("SCRIPT");
    load.arg("LOAD").arg(script.source());
    let value = conn
        .req_packed_command(&load)
        .await
        .map_err(classify_redis_error)?;
    decode::into_string(value)
}

/// Dispatches one script invocation: digest-or-source, one resend on
/// no-such-script, classification of transport errors, and decoding of the
/// status-coded reply.
pub(crate) async fn run_script<C>(
    conn: &mut C,
    cache: &mut DigestCache,
    script: ScriptName,
    keys: &[String],
    args: &[Vec<u8>],
) -> Result<Vec<Value>>
where
    C: ConnectionLike + Send,
{
    let (mut digest, mut loaded_now) = match cache.get(script) {
        Some(sha) => (sha.to_string(), false),
        None => {
            let sha = load_script(conn, script).await?;
            cache.put(script, sha.clone());
            (sha, true)
        }
    };

    loop {
        let mut eval = cmd("EVALSHA");
        eval.arg(&digest).arg(keys.len());
        for key in keys {
            eval.arg(key);
        }
        for arg in args {
            eval.arg(arg.as_slice());
        }

        match conn.req_packed_command(&eval).await {
            Ok(value) => {
                let decoded = decode::status_reply(value);
                if matches!(
                    decoded,
                    Err(Error::MaxMemoryLimit(_) | Error::MaxMemoryPolicy(_))
                ) {
                    // OOM or a compromised collection: start from a clean
                    // slate on the next dispatch.
                    cache.clear();
                }
                return decoded;
            }
            Err(err) if err.kind() == redis::ErrorKind::NoScriptError && !loaded_now => {
                debug!(
                    script = script.name(),
                    "digest unknown to the server, resending source"
                );
                cache.invalidate(script);
                digest = load_script(conn, script).await?;
                cache.put(script, digest.clone());
                loaded_now = true;
            }
            Err(err) => {
                let classified = annotate_script_error(classify_redis_error(err), script);
                if matches!(classified, Error::MaxMemoryLimit(_)) {
                    cache.clear();
                }
                return Err(classified);
            }
        }
    }
}

/// Attaches the offending script's source to compile and runtime script
/// failures, which otherwise only name a line number in a digest.
fn annotate_script_error(err: Error, script: ScriptName) -> Error {
    match err {
        Error::BackingStore(msg)
            if msg.contains("compiling script") || msg.contains("running script") =>
        {
            Error::BackingStore(format!(
                "{msg}\n--- script {} ---\n{}",
                script.name(),
                script.source()
            ))
        }
        other => other,
    }
}

/// Owns the connection to the backing store and the digest cache.
#[derive(Debug)]
pub(crate) struct ClientDriver {
    client: redis::Client,
    conn: MultiplexedConnection,
    cache: DigestCache,
    reconnect_on_error: bool,
}

impl ClientDriver {
    /// Opens a multiplexed connection to `url`.
    pub(crate) async fn connect(url: &str, reconnect_on_error: bool) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::MismatchArg(format!("invalid backing store url: {e}")))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(classify_redis_error)?;
        debug!(url, "connected to the backing store");
        Ok(Self {
            client,
            conn,
            cache: DigestCache::default(),
            reconnect_on_error,
        })
    }

    /// Runs a script, reconnecting once on a network failure when the
    /// handle is configured for it. Argument and policy errors never
    /// trigger a reconnect.
    pub(crate) async fn script(
        &mut self,
        script: ScriptName,
        keys: &[String],
        args: &[Vec<u8>],
    ) -> Result<Vec<Value>> {
        match run_script(&mut self.conn, &mut self.cache, script, keys, args).await {
            Err(Error::Network(source)) if self.reconnect_on_error => {
                warn!(script = script.name(), error = %source, "network failure, reconnecting once");
                self.reconnect().await?;
                run_script(&mut self.conn, &mut self.cache, script, keys, args).await
            }
            other => other,
        }
    }

    /// Runs a plain command with the same classification and reconnect
    /// policy as script dispatch.
    pub(crate) async fn command(&mut self, command: &redis::Cmd) -> Result<Value> {
        match self.conn.req_packed_command(command).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let classified = classify_redis_error(err);
                match classified {
                    Error::Network(source) if self.reconnect_on_error => {
                        warn!(error = %source, "network failure, reconnecting once");
                        self.reconnect().await?;
                        self.conn
                            .req_packed_command(command)
                            .await
                            .map_err(classify_redis_error)
                    }
                    other => Err(other),
                }
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(classify_redis_error)?;
        // A new connection may talk to a restarted server with an empty
        // script store.
        self.cache.clear();
        Ok(())
    }
}
