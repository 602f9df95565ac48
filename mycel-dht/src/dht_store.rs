//! Content-addressed DHT storage: entries, statuses, sources, links
//!
//! Every mutation takes the originating message and commits the state change
//! together with its change-log record in one transaction, so the log can
//! never disagree with the data it describes.
//!
//! Keys: `entry:<b58>` content, `type:<b58>` entry type, `status:<b58>`
//! status bits, `src:<b58>` JSON source list, `mod:<b58>` replaced-by hash,
//! `link:<b58>` JSON link list.

use crate::change_log::append_in;
use crate::error::DhtError;
use mycel_model::{EntryStatus, Hash, HashType, Link, LinkAction, Message};
use mycel_store::{KeyedStore, StoreError, UpdateTxn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An entry as held by this node
#[derive(Debug, Clone, PartialEq)]
pub struct DhtEntry {
    pub entry_type: String,
    pub content: String,
    pub status: u32,
    pub sources: Vec<String>,
}

/// One held link record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLink {
    #[serde(rename = "H")]
    pub target: String,
    #[serde(rename = "T")]
    pub tag: String,
    #[serde(rename = "Status")]
    pub status: u32,
}

#[derive(Clone)]
pub struct DhtStore {
    store: Arc<KeyedStore>,
    hash_type: HashType,
}

fn entry_key(h: &Hash) -> String {
    format!("entry:{}", h)
}
fn type_key(h: &Hash) -> String {
    format!("type:{}", h)
}
fn status_key(h: &Hash) -> String {
    format!("status:{}", h)
}
fn src_key(h: &Hash) -> String {
    format!("src:{}", h)
}
fn mod_key(h: &Hash) -> String {
    format!("mod:{}", h)
}
fn link_key(base: &Hash) -> String {
    format!("link:{}", base)
}

fn decode_json<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T, DhtError> {
    serde_json::from_str(value).map_err(|e| {
        DhtError::Store(StoreError::Corrupt { key: key.to_string(), reason: e.to_string() })
    })
}

impl DhtStore {
    pub fn new(store: Arc<KeyedStore>, hash_type: HashType) -> Self {
        Self { store, hash_type }
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    /// Store an entry as Live and record the originating message
    pub fn apply_put(
        &self,
        m: &Message,
        hash: &Hash,
        entry_type: &str,
        content: &str,
    ) -> Result<u64, DhtError> {
        let hash_type = self.hash_type;
        self.store.update(|tx| {
            let idx = append_in(tx, hash_type, m)?;
            tx.set(&entry_key(hash), content)?;
            tx.set(&type_key(hash), entry_type)?;
            tx.set(&status_key(hash), &EntryStatus::LIVE.to_string())?;
            add_source(tx, hash, &m.from.to_string())?;
            Ok(idx)
        })
    }

    /// Mark `old` as replaced by `new`
    pub fn apply_mod(&self, m: &Message, old: &Hash, new: &Hash) -> Result<u64, DhtError> {
        let hash_type = self.hash_type;
        self.store.update(|tx| {
            require_entry(tx, old)?;
            let idx = append_in(tx, hash_type, m)?;
            tx.set(&status_key(old), &EntryStatus::MODIFIED.to_string())?;
            tx.set(&mod_key(old), &new.to_string())?;
            Ok(idx)
        })
    }

    /// Mark an entry deleted
    pub fn apply_del(&self, m: &Message, hash: &Hash) -> Result<u64, DhtError> {
        let hash_type = self.hash_type;
        self.store.update(|tx| {
            require_entry(tx, hash)?;
            let idx = append_in(tx, hash_type, m)?;
            tx.set(&status_key(hash), &EntryStatus::DELETED.to_string())?;
            Ok(idx)
        })
    }

    /// Apply a batch of link add/del records against their base
    pub fn apply_links(&self, m: &Message, base: &Hash, links: &[Link]) -> Result<u64, DhtError> {
        let hash_type = self.hash_type;
        self.store.update(|tx| {
            require_entry(tx, base)?;
            let idx = append_in(tx, hash_type, m)?;
            let key = link_key(base);
            let mut held: Vec<StoredLink> = match tx.get(&key)? {
                Some(v) => decode_json(&key, &v)?,
                None => Vec::new(),
            };
            for link in links {
                let target = link.target.to_string();
                match link.action {
                    LinkAction::Add => {
                        let dup = held
                            .iter()
                            .any(|l| l.target == target && l.tag == link.tag && l.status == EntryStatus::LIVE);
                        if !dup {
                            held.push(StoredLink {
                                target,
                                tag: link.tag.clone(),
                                status: EntryStatus::LIVE,
                            });
                        }
                    }
                    LinkAction::Del => {
                        for l in held.iter_mut() {
                            if l.target == target && l.tag == link.tag {
                                l.status = EntryStatus::DELETED;
                            }
                        }
                    }
                }
            }
            let encoded = serde_json::to_string(&held).map_err(|e| {
                DhtError::Store(StoreError::Corrupt { key: key.clone(), reason: e.to_string() })
            })?;
            tx.set(&key, &encoded)?;
            Ok(idx)
        })
    }

    /// Fetch an entry if held and its status intersects `status_mask`
    pub fn get_entry(&self, hash: &Hash, status_mask: u32) -> Result<Option<DhtEntry>, DhtError> {
        self.store.view(|tx| {
            let Some(content) = tx.get(&entry_key(hash))? else {
                return Ok(None);
            };
            let entry_type = tx.get(&type_key(hash))?.unwrap_or_default();
            let status = match tx.get(&status_key(hash))? {
                Some(v) => v.parse().unwrap_or(EntryStatus::LIVE),
                None => EntryStatus::LIVE,
            };
            if status & status_mask == 0 {
                return Ok(None);
            }
            let sources = match tx.get(&src_key(hash))? {
                Some(v) => decode_json(&src_key(hash), &v)?,
                None => Vec::new(),
            };
            Ok(Some(DhtEntry { entry_type, content, status, sources }))
        })
    }

    /// Hash an entry was replaced by, if any
    pub fn replaced_by(&self, hash: &Hash) -> Result<Option<Hash>, DhtError> {
        self.store.view(|tx| match tx.get(&mod_key(hash))? {
            Some(v) => Ok(Some(Hash::parse(&v)?)),
            None => Ok(None),
        })
    }

    /// Links on `base` with `tag`, filtered by status mask
    pub fn links(&self, base: &Hash, tag: &str, status_mask: u32) -> Result<Vec<StoredLink>, DhtError> {
        let key = link_key(base);
        self.store.view(|tx| {
            let held: Vec<StoredLink> = match tx.get(&key)? {
                Some(v) => decode_json(&key, &v)?,
                None => Vec::new(),
            };
            Ok(held
                .into_iter()
                .filter(|l| l.tag == tag && l.status & status_mask != 0)
                .collect())
        })
    }
}

fn require_entry(tx: &UpdateTxn, hash: &Hash) -> Result<(), DhtError> {
    if tx.get(&entry_key(hash))?.is_none() {
        return Err(DhtError::EntryMissing(hash.clone()));
    }
    Ok(())
}

fn add_source(tx: &mut UpdateTxn, hash: &Hash, source: &str) -> Result<(), DhtError> {
    let key = src_key(hash);
    let mut sources: Vec<String> = match tx.get(&key)? {
        Some(v) => decode_json(&key, &v)?,
        None => Vec::new(),
    };
    if !sources.iter().any(|s| s == source) {
        sources.push(source.to_string());
    }
    let encoded = serde_json::to_string(&sources).map_err(|e| {
        DhtError::Store(StoreError::Corrupt { key: key.clone(), reason: e.to_string() })
    })?;
    tx.set(&key, &encoded)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycel_model::{Body, PeerId};

    fn dht() -> DhtStore {
        DhtStore::new(Arc::new(KeyedStore::in_memory().unwrap()), HashType::Sha2_256)
    }

    fn put_msg(from: PeerId, hash: &Hash) -> Message {
        Message::new(from, Body::Put { entry_hash: hash.clone() })
    }

    #[test]
    fn test_put_then_get() {
        let d = dht();
        let from = PeerId::random();
        let hash = Hash::with(HashType::Sha2_256, b"hello");
        d.apply_put(&put_msg(from, &hash), &hash, "post", "hello").unwrap();

        let e = d.get_entry(&hash, EntryStatus::LIVE).unwrap().unwrap();
        assert_eq!(e.content, "hello");
        assert_eq!(e.entry_type, "post");
        assert_eq!(e.status, EntryStatus::LIVE);
        assert_eq!(e.sources, vec![from.to_string()]);
    }

    #[test]
    fn test_status_mask_filters() {
        let d = dht();
        let from = PeerId::random();
        let hash = Hash::with(HashType::Sha2_256, b"gone");
        d.apply_put(&put_msg(from, &hash), &hash, "post", "gone").unwrap();
        d.apply_del(&Message::new(from, Body::Del { hash: hash.clone(), message: "bye".into() }), &hash)
            .unwrap();

        assert!(d.get_entry(&hash, EntryStatus::LIVE).unwrap().is_none());
        let e = d.get_entry(&hash, EntryStatus::ANY).unwrap().unwrap();
        assert_eq!(e.status, EntryStatus::DELETED);
    }

    #[test]
    fn test_mod_records_replacement() {
        let d = dht();
        let from = PeerId::random();
        let old = Hash::with(HashType::Sha2_256, b"v1");
        let new = Hash::with(HashType::Sha2_256, b"v2");
        d.apply_put(&put_msg(from, &old), &old, "post", "v1").unwrap();
        d.apply_mod(
            &Message::new(from, Body::Mod { hash: old.clone(), new_hash: new.clone() }),
            &old,
            &new,
        )
        .unwrap();

        assert_eq!(d.replaced_by(&old).unwrap(), Some(new));
        assert!(d.get_entry(&old, EntryStatus::LIVE).unwrap().is_none());
        assert!(d.get_entry(&old, EntryStatus::MODIFIED).unwrap().is_some());
    }

    #[test]
    fn test_mutation_on_missing_entry_fails() {
        let d = dht();
        let from = PeerId::random();
        let hash = Hash::with(HashType::Sha2_256, b"ghost");
        let err = d
            .apply_del(&Message::new(from, Body::Del { hash: hash.clone(), message: String::new() }), &hash)
            .unwrap_err();
        assert!(matches!(err, DhtError::EntryMissing(_)));
    }

    #[test]
    fn test_links_add_filter_and_del() {
        let d = dht();
        let from = PeerId::random();
        let base = Hash::with(HashType::Sha2_256, b"base");
        let t1 = Hash::with(HashType::Sha2_256, b"t1");
        let t2 = Hash::with(HashType::Sha2_256, b"t2");
        d.apply_put(&put_msg(from, &base), &base, "post", "base").unwrap();

        let links = vec![
            Link { base: base.clone(), target: t1.clone(), tag: "follows".into(), action: LinkAction::Add },
            Link { base: base.clone(), target: t2.clone(), tag: "likes".into(), action: LinkAction::Add },
        ];
        d.apply_links(&Message::new(from, Body::Link { base: base.clone(), links: links.clone() }), &base, &links)
            .unwrap();

        let follows = d.links(&base, "follows", EntryStatus::LIVE).unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].target, t1.to_string());

        let del = vec![Link { base: base.clone(), target: t1.clone(), tag: "follows".into(), action: LinkAction::Del }];
        d.apply_links(&Message::new(from, Body::Link { base: base.clone(), links: del.clone() }), &base, &del)
            .unwrap();
        assert!(d.links(&base, "follows", EntryStatus::LIVE).unwrap().is_empty());
        assert_eq!(d.links(&base, "follows", EntryStatus::ANY).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_message_aborts_whole_mutation() {
        let d = dht();
        let from = PeerId::random();
        let a = Hash::with(HashType::Sha2_256, b"a");
        let b = Hash::with(HashType::Sha2_256, b"b");
        let m = put_msg(from, &a);
        d.apply_put(&m, &a, "post", "a").unwrap();
        // same originating message again: log dedup rejects, entry b is not stored
        let err = d.apply_put(&m, &b, "post", "b").unwrap_err();
        assert!(matches!(err, DhtError::DuplicateFingerprint(_)));
        assert!(d.get_entry(&b, EntryStatus::ANY).unwrap().is_none());
    }
}
