//! Transactional script sources executed atomically on the backing store.
//!
//! Each script is assembled from three kinds of chunks:
//!
//! - `common.lua` -- key derivation, wire status codes, the memory probe,
//!   the rollback log, the evictor (`cleaning`), and the OOM-guarded command
//!   wrapper (`guarded_call`)
//! - a per-operation body defining `main()` (insert and update additionally
//!   share `fn_insert.lua` / `fn_update.lua` so that upsert can dispatch to
//!   either branch inside one atomic invocation)
//! - `footer.lua` -- runs `main` under `pcall`, replays the rollback log on
//!   a fatal abort, and normalizes the reply to `{ status code, ... }`
//!
//! Call convention: `KEYS[1]` = queue key, `KEYS[2]` = status key,
//! `ARGV[1]` = namespace prefix, `ARGV[2]` = collection name, operation
//! arguments from `ARGV[3]`. Data and time keys of arbitrary lists are
//! derived inside the script because eviction touches lists other than the
//! operation target.

const COMMON: &str = include_str!("common.lua");
const FOOTER: &str = include_str!("footer.lua");
const FN_INSERT: &str = include_str!("fn_insert.lua");
const FN_UPDATE: &str = include_str!("fn_update.lua");
const MAIN_INSERT: &str = include_str!("insert.lua");
const MAIN_UPDATE: &str = include_str!("update.lua");
const MAIN_UPSERT: &str = include_str!("upsert.lua");
const MAIN_RECEIVE: &str = include_str!("receive.lua");
const MAIN_POP_OLDEST: &str = include_str!("pop_oldest.lua");
const MAIN_DROP_COLLECTION: &str = include_str!("drop_collection.lua");
const MAIN_CLEAR_COLLECTION: &str = include_str!("clear_collection.lua");
const MAIN_DROP_LIST: &str = include_str!("drop_list.lua");
const MAIN_COLLECTION_INFO: &str = include_str!("collection_info.lua");
const MAIN_LIST_INFO: &str = include_str!("list_info.lua");
const MAIN_OLDEST_TIME: &str = include_str!("oldest_time.lua");
const MAIN_VERIFY_COLLECTION: &str = include_str!("verify_collection.lua");

/// The transactional scripts of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptName {
    Insert,
    Update,
    Upsert,
    Receive,
    PopOldest,
    DropCollection,
    ClearCollection,
    DropList,
    CollectionInfo,
    ListInfo,
    OldestTime,
    VerifyCollection,
}

impl ScriptName {
    /// All scripts, for cache warm-up and tests.
    pub const ALL: [ScriptName; 12] = [
        ScriptName::Insert,
        ScriptName::Update,
        ScriptName::Upsert,
        ScriptName::Receive,
        ScriptName::PopOldest,
        ScriptName::DropCollection,
        ScriptName::ClearCollection,
        ScriptName::DropList,
        ScriptName::CollectionInfo,
        ScriptName::ListInfo,
        ScriptName::OldestTime,
        ScriptName::VerifyCollection,
    ];

    /// Stable name used for logging and the digest cache.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ScriptName::Insert => "insert",
            ScriptName::Update => "update",
            ScriptName::Upsert => "upsert",
            ScriptName::Receive => "receive",
            ScriptName::PopOldest => "pop_oldest",
            ScriptName::DropCollection => "drop_collection",
            ScriptName::ClearCollection => "clear_collection",
            ScriptName::DropList => "drop_list",
            ScriptName::CollectionInfo => "collection_info",
            ScriptName::ListInfo => "list_info",
            ScriptName::OldestTime => "oldest_time",
            ScriptName::VerifyCollection => "verify_collection",
        }
    }

    /// Assembles the full Lua source of this script.
    #[must_use]
    pub fn source(self) -> String {
        let chunks: &[&str] = match self {
            ScriptName::Insert => &[COMMON, FN_INSERT, MAIN_INSERT],
            ScriptName::Update => &[COMMON, FN_UPDATE, MAIN_UPDATE],
            ScriptName::Upsert => &[COMMON, FN_INSERT, FN_UPDATE, MAIN_UPSERT],
            ScriptName::Receive => &[COMMON, MAIN_RECEIVE],
            ScriptName::PopOldest => &[COMMON, MAIN_POP_OLDEST],
            ScriptName::DropCollection => &[COMMON, MAIN_DROP_COLLECTION],
            ScriptName::ClearCollection => &[COMMON, MAIN_CLEAR_COLLECTION],
            ScriptName::DropList => &[COMMON, MAIN_DROP_LIST],
            ScriptName::CollectionInfo => &[COMMON, MAIN_COLLECTION_INFO],
            ScriptName::ListInfo => &[COMMON, MAIN_LIST_INFO],
            ScriptName::OldestTime => &[COMMON, MAIN_OLDEST_TIME],
            ScriptName::VerifyCollection => &[COMMON, MAIN_VERIFY_COLLECTION],
        };
        let mut source = String::with_capacity(
            chunks.iter().map(|c| c.len() + 1).sum::<usize>() + FOOTER.len(),
        );
        for chunk in chunks {
            source.push_str(chunk);
            source.push('\n');
        }
        source.push_str(FOOTER);
        source
    }
}
