//! Keyed Store - ordered string→string persistence with transactional views
//!
//! A thin layer over redb: one table, string keys and values, `view` for
//! read snapshots and `update` for exclusive read-modify-write. Keys under
//! the `idx:` prefix order by their numeric suffix so that change-log scans
//! come back in application order ("2" before "10"); every other key is
//! byte-lexical.

use redb::{Database, ReadableTable, TableDefinition};
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;

const TABLE: TableDefinition<RawKey, &str> = TableDefinition::new("keyed");

const IDX_PREFIX: &[u8] = b"idx:";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key type with the custom `idx:` ordering.
///
/// Ordering must be total: within `idx:` the empty suffix sorts first (so the
/// bare prefix is a valid range start), then all-digit suffixes by numeric
/// value, then anything else by bytes. Cross-prefix comparisons stay
/// byte-lexical, which keeps each prefix group contiguous.
#[derive(Debug)]
pub struct RawKey;

impl redb::Value for RawKey {
    type SelfType<'a> = &'a str
    where
        Self: 'a;
    type AsBytes<'a> = &'a [u8]
    where
        Self: 'a;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> &'a str
    where
        Self: 'a,
    {
        std::str::from_utf8(data).unwrap_or("")
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> &'a [u8] {
        value.as_bytes()
    }

    fn type_name() -> redb::TypeName {
        redb::TypeName::new("mycel::RawKey")
    }
}

impl redb::Key for RawKey {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        key_cmp(a, b)
    }
}

fn key_cmp(a: &[u8], b: &[u8]) -> Ordering {
    if a.starts_with(IDX_PREFIX) && b.starts_with(IDX_PREFIX) {
        idx_suffix_cmp(&a[IDX_PREFIX.len()..], &b[IDX_PREFIX.len()..])
    } else {
        a.cmp(b)
    }
}

fn idx_suffix_cmp(a: &[u8], b: &[u8]) -> Ordering {
    fn class(s: &[u8]) -> u8 {
        if s.is_empty() {
            0
        } else if s.iter().all(u8::is_ascii_digit) {
            1
        } else {
            2
        }
    }
    match (class(a), class(b)) {
        (1, 1) => decimal_cmp(a, b).then_with(|| a.cmp(b)),
        (ca, cb) if ca != cb => ca.cmp(&cb),
        _ => a.cmp(b),
    }
}

/// Compare two all-digit byte strings by integer value
fn decimal_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Process-wide ordered key→value store
pub struct KeyedStore {
    db: Database,
}

impl KeyedStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Volatile store, for tests
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Read-only snapshot; no writes may be issued from within
    pub fn view<R, E>(&self, f: impl FnOnce(&ViewTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        let table = txn.open_table(TABLE).map_err(StoreError::from)?;
        f(&ViewTxn { table })
    }

    /// Exclusive writer; commits iff `f` returns Ok, otherwise the store is
    /// left unchanged
    pub fn update<R, E>(&self, f: impl FnOnce(&mut UpdateTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let result = {
            let table = txn.open_table(TABLE).map_err(StoreError::from)?;
            let mut up = UpdateTxn { table };
            f(&mut up)
        };
        match result {
            Ok(v) => {
                txn.commit().map_err(StoreError::from)?;
                Ok(v)
            }
            Err(e) => {
                let _ = txn.abort();
                Err(e)
            }
        }
    }
}

/// Read snapshot handle
pub struct ViewTxn {
    table: redb::ReadOnlyTable<RawKey, &'static str>,
}

impl ViewTxn {
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        get_in(&self.table, key)
    }

    /// Scan keys with `prefix` in store order; `cb` returns whether to
    /// continue. A callback error aborts the scan and propagates.
    pub fn ascend<E: From<StoreError>>(
        &self,
        prefix: &str,
        cb: impl FnMut(&str, &str) -> Result<bool, E>,
    ) -> Result<(), E> {
        ascend_in(&self.table, prefix, prefix, cb)
    }

    /// Scan keys with `prefix`, starting at `start` (inclusive)
    pub fn ascend_greater_or_equal<E: From<StoreError>>(
        &self,
        prefix: &str,
        start: &str,
        cb: impl FnMut(&str, &str) -> Result<bool, E>,
    ) -> Result<(), E> {
        ascend_in(&self.table, prefix, start, cb)
    }
}

/// Exclusive read-modify-write handle
pub struct UpdateTxn<'txn> {
    table: redb::Table<'txn, RawKey, &'static str>,
}

impl UpdateTxn<'_> {
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        get_in(&self.table, key)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.table.insert(key, value)?;
        Ok(())
    }

    pub fn ascend<E: From<StoreError>>(
        &self,
        prefix: &str,
        cb: impl FnMut(&str, &str) -> Result<bool, E>,
    ) -> Result<(), E> {
        ascend_in(&self.table, prefix, prefix, cb)
    }

    pub fn ascend_greater_or_equal<E: From<StoreError>>(
        &self,
        prefix: &str,
        start: &str,
        cb: impl FnMut(&str, &str) -> Result<bool, E>,
    ) -> Result<(), E> {
        ascend_in(&self.table, prefix, start, cb)
    }
}

fn get_in<T: ReadableTable<RawKey, &'static str>>(
    table: &T,
    key: &str,
) -> Result<Option<String>, StoreError> {
    Ok(table.get(key)?.map(|g| g.value().to_string()))
}

fn ascend_in<T, E>(
    table: &T,
    prefix: &str,
    start: &str,
    mut cb: impl FnMut(&str, &str) -> Result<bool, E>,
) -> Result<(), E>
where
    T: ReadableTable<RawKey, &'static str>,
    E: From<StoreError>,
{
    let range = table.range(start..).map_err(StoreError::from)?;
    for item in range {
        let (k, v) = item.map_err(StoreError::from)?;
        let key = k.value();
        if !key.starts_with(prefix) {
            break;
        }
        if !cb(key, v.value())? {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KeyedStore {
        KeyedStore::in_memory().unwrap()
    }

    fn set(s: &KeyedStore, k: &str, v: &str) {
        s.update::<_, StoreError>(|tx| tx.set(k, v)).unwrap();
    }

    fn collect_prefix(s: &KeyedStore, prefix: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        s.view::<_, StoreError>(|tx| {
            tx.ascend(prefix, |k, v| {
                out.push((k.to_string(), v.to_string()));
                Ok(true)
            })
        })
        .unwrap();
        out
    }

    #[test]
    fn test_get_set_roundtrip() {
        let s = store();
        set(&s, "_idx", "5");
        let v = s.view::<_, StoreError>(|tx| tx.get("_idx")).unwrap();
        assert_eq!(v.as_deref(), Some("5"));
        let missing = s.view::<_, StoreError>(|tx| tx.get("nope")).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_idx_keys_sort_numerically() {
        let s = store();
        for n in [2u64, 10, 1, 21, 3] {
            set(&s, &format!("idx:{}", n), "m");
        }
        let keys: Vec<String> = collect_prefix(&s, "idx:").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["idx:1", "idx:2", "idx:3", "idx:10", "idx:21"]);
    }

    #[test]
    fn test_other_prefixes_sort_lexically() {
        let s = store();
        set(&s, "peer:b", "1");
        set(&s, "peer:a", "2");
        set(&s, "peer:c", "3");
        let keys: Vec<String> = collect_prefix(&s, "peer:").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["peer:a", "peer:b", "peer:c"]);
    }

    #[test]
    fn test_prefixes_do_not_bleed() {
        let s = store();
        set(&s, "idx:1", "a");
        set(&s, "idx:10", "b");
        set(&s, "f:abc", "1");
        set(&s, "peer:xyz", "0");
        assert_eq!(collect_prefix(&s, "idx:").len(), 2);
        assert_eq!(collect_prefix(&s, "f:").len(), 1);
        assert_eq!(collect_prefix(&s, "peer:").len(), 1);
    }

    #[test]
    fn test_ascend_greater_or_equal_numeric() {
        let s = store();
        for n in 1u64..=12 {
            set(&s, &format!("idx:{}", n), &n.to_string());
        }
        let mut seen = Vec::new();
        s.view::<_, StoreError>(|tx| {
            tx.ascend_greater_or_equal("idx:", "idx:9", |k, _| {
                seen.push(k.to_string());
                Ok(true)
            })
        })
        .unwrap();
        assert_eq!(seen, vec!["idx:9", "idx:10", "idx:11", "idx:12"]);
    }

    #[test]
    fn test_scan_stops_when_cb_returns_false() {
        let s = store();
        for n in 1u64..=5 {
            set(&s, &format!("idx:{}", n), "x");
        }
        let mut count = 0;
        s.view::<_, StoreError>(|tx| {
            tx.ascend("idx:", |_, _| {
                count += 1;
                Ok(count < 3)
            })
        })
        .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_cb_error_aborts_scan() {
        let s = store();
        set(&s, "idx:1", "x");
        set(&s, "idx:2", "x");
        let r: Result<(), StoreError> = s.view(|tx| {
            tx.ascend("idx:", |k, _| {
                if k == "idx:2" {
                    Err(StoreError::Corrupt { key: k.to_string(), reason: "boom".into() })
                } else {
                    Ok(true)
                }
            })
        });
        assert!(matches!(r, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_failed_update_leaves_store_unchanged() {
        let s = store();
        set(&s, "a", "1");
        let r: Result<(), StoreError> = s.update(|tx| {
            tx.set("a", "2")?;
            tx.set("b", "3")?;
            Err(StoreError::NotFound("forced".into()))
        });
        assert!(r.is_err());
        let a = s.view::<_, StoreError>(|tx| tx.get("a")).unwrap();
        let b = s.view::<_, StoreError>(|tx| tx.get("b")).unwrap();
        assert_eq!(a.as_deref(), Some("1"));
        assert_eq!(b, None);
    }

    #[test]
    fn test_comparator_total_order_spot_checks() {
        use std::cmp::Ordering::*;
        assert_eq!(key_cmp(b"idx:2", b"idx:10"), Less);
        assert_eq!(key_cmp(b"idx:10", b"idx:2"), Greater);
        assert_eq!(key_cmp(b"idx:7", b"idx:7"), Equal);
        // bare prefix sorts before every numeric key
        assert_eq!(key_cmp(b"idx:", b"idx:1"), Less);
        // digit suffixes sort before non-digit suffixes
        assert_eq!(key_cmp(b"idx:99", b"idx:a"), Less);
        // cross-prefix stays lexical
        assert_eq!(key_cmp(b"f:abc", b"idx:1"), Less);
        assert_eq!(key_cmp(b"peer:x", b"idx:1"), Greater);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyed.redb");
        {
            let s = KeyedStore::open(&path).unwrap();
            set(&s, "idx:1", "hello");
        }
        let s = KeyedStore::open(&path).unwrap();
        let v = s.view::<_, StoreError>(|tx| tx.get("idx:1")).unwrap();
        assert_eq!(v.as_deref(), Some("hello"));
    }
}
