//! Change Log - strictly increasing index over every DHT-observable event
//!
//! Keys: `_idx` holds the highest assigned index, `idx:<n>` the hex-armored
//! canonical message that caused change `n`, `f:<fingerprint>` maps a message
//! fingerprint back to its index. The index discipline lets gossip compress
//! "what do I owe you" into one integer per peer; the fingerprint index makes
//! dedup of arriving puts a single lookup.

use crate::error::DhtError;
use mycel_model::{Hash, HashType, Message, Put};
use mycel_store::{KeyedStore, StoreError, UpdateTxn};
use std::sync::Arc;

const KEY_IDX: &str = "_idx";

fn idx_key(idx: u64) -> String {
    format!("idx:{}", idx)
}

fn fingerprint_key(f: &Hash) -> String {
    format!("f:{}", f)
}

fn parse_u64(key: &str, value: &str) -> Result<u64, DhtError> {
    value.parse().map_err(|_| {
        DhtError::Store(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("expected integer, got {:?}", value),
        })
    })
}

/// Append a message to the change log inside an already-open transaction.
///
/// DHT mutations use this so the state change and its log record commit
/// atomically.
pub(crate) fn append_in(
    tx: &mut UpdateTxn,
    hash_type: HashType,
    m: &Message,
) -> Result<u64, DhtError> {
    let fingerprint = m.fingerprint(hash_type)?;
    let fkey = fingerprint_key(&fingerprint);
    if tx.get(&fkey)?.is_some() {
        return Err(DhtError::DuplicateFingerprint(fingerprint));
    }

    let current = match tx.get(KEY_IDX)? {
        Some(v) => parse_u64(KEY_IDX, &v)?,
        None => 0,
    };
    let next = current + 1;

    tx.set(KEY_IDX, &next.to_string())?;
    tx.set(&idx_key(next), &hex::encode(m.canonical_bytes()?))?;
    tx.set(&fkey, &next.to_string())?;
    Ok(next)
}

/// Per-node log of applied changes, keyed by a monotone index
#[derive(Clone)]
pub struct ChangeLog {
    store: Arc<KeyedStore>,
    hash_type: HashType,
}

impl ChangeLog {
    pub fn new(store: Arc<KeyedStore>, hash_type: HashType) -> Self {
        Self { store, hash_type }
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    /// Record a message, assigning it the next index. Fails with
    /// `DuplicateFingerprint` (and leaves the log untouched) when the
    /// message was already applied.
    pub fn append_from_message(&self, m: &Message) -> Result<u64, DhtError> {
        let hash_type = self.hash_type;
        self.store.update(|tx| append_in(tx, hash_type, m))
    }

    /// Highest assigned index; 0 when nothing was ever logged
    pub fn current_idx(&self) -> Result<u64, DhtError> {
        self.store.view(|tx| match tx.get(KEY_IDX)? {
            Some(v) => parse_u64(KEY_IDX, &v),
            None => Ok(0),
        })
    }

    /// The message that caused the change at `idx`
    pub fn message_at(&self, idx: u64) -> Result<Message, DhtError> {
        let key = idx_key(idx);
        self.store.view(|tx| {
            let value = tx.get(&key)?.ok_or(DhtError::NoSuchIdx(idx))?;
            decode_message(&key, &value)
        })
    }

    /// Index at which a fingerprint was applied, or -1 when never seen
    pub fn index_of(&self, fingerprint: &Hash) -> Result<i64, DhtError> {
        let key = fingerprint_key(fingerprint);
        self.store.view(|tx| match tx.get(&key)? {
            Some(v) => Ok(parse_u64(&key, &v)? as i64),
            None => Ok(-1),
        })
    }

    pub fn have_fingerprint(&self, fingerprint: &Hash) -> Result<bool, DhtError> {
        Ok(self.index_of(fingerprint)? >= 0)
    }

    /// All puts with `idx >= since`, ascending. An empty stored blob yields a
    /// put with no message (the genesis DNA slot); any other decode failure
    /// aborts the scan.
    pub fn puts_since(&self, since: u64) -> Result<Vec<Put>, DhtError> {
        let start = idx_key(since);
        self.store.view(|tx| {
            let mut puts = Vec::new();
            tx.ascend_greater_or_equal("idx:", &start, |key, value| {
                let idx = parse_u64(key, &key["idx:".len()..])?;
                let msg = if value.is_empty() {
                    None
                } else {
                    Some(decode_message(key, value)?)
                };
                puts.push(Put { idx, msg });
                Ok::<bool, DhtError>(true)
            })?;
            Ok(puts)
        })
    }
}

fn decode_message(key: &str, value: &str) -> Result<Message, DhtError> {
    let bytes = hex::decode(value).map_err(|e| {
        DhtError::Store(StoreError::Corrupt { key: key.to_string(), reason: e.to_string() })
    })?;
    Ok(Message::from_canonical(&bytes)?)
}
