//! Source chain - the local append-only hash-linked log of authored entries
//!
//! Headers chain through `prev`; `_top` points at the newest header. Entries
//! and headers share the keyed store with the DHT under their own prefixes:
//! `ent:<entry-hash>`, `hdr:<header-hash>`, `eh:<entry-hash>` → header hash.

use crate::error::NodeError;
use chrono::{DateTime, Utc};
use mycel_model::{Hash, HashType, Header};
use mycel_store::{KeyedStore, StoreError};
use mycel_ribosome::ChainOpt;
use serde_json::json;
use std::sync::Arc;

const KEY_TOP: &str = "_top";

fn entry_key(h: &Hash) -> String {
    format!("ent:{}", h)
}
fn header_key(h: &Hash) -> String {
    format!("hdr:{}", h)
}
fn entry_header_key(h: &Hash) -> String {
    format!("eh:{}", h)
}

#[derive(Clone)]
pub struct SourceChain {
    store: Arc<KeyedStore>,
    hash_type: HashType,
}

impl SourceChain {
    pub fn new(store: Arc<KeyedStore>, hash_type: HashType) -> Self {
        Self { store, hash_type }
    }

    /// Hash of the newest header; null on an empty chain
    pub fn top(&self) -> Result<Hash, NodeError> {
        self.store.view(|tx| match tx.get(KEY_TOP)? {
            Some(v) => Ok(Hash::parse(&v)?),
            None => Ok(Hash::NULL),
        })
    }

    pub fn is_empty(&self) -> Result<bool, NodeError> {
        Ok(self.top()?.is_null())
    }

    /// Commit an entry: store content, create the header, advance `_top`
    pub fn append(
        &self,
        entry_type: &str,
        content: &str,
        time: DateTime<Utc>,
    ) -> Result<(Hash, Header), NodeError> {
        let entry_hash = Hash::with(self.hash_type, content.as_bytes());
        let header = self.store.update(|tx| {
            let prev = match tx.get(KEY_TOP)? {
                Some(v) => Hash::parse(&v)?,
                None => Hash::NULL,
            };
            let header = Header {
                entry_link: entry_hash.clone(),
                entry_type: entry_type.to_string(),
                time,
                prev,
            };
            let encoded = serde_json::to_string(&header)?;
            let header_hash = Hash::with(self.hash_type, encoded.as_bytes());

            tx.set(&entry_key(&entry_hash), content)?;
            tx.set(&header_key(&header_hash), &encoded)?;
            tx.set(&entry_header_key(&entry_hash), &header_hash.to_string())?;
            tx.set(KEY_TOP, &header_hash.to_string())?;
            Ok::<Header, NodeError>(header)
        })?;
        Ok((entry_hash, header))
    }

    /// Content of an authored entry
    pub fn entry(&self, entry_hash: &Hash) -> Result<Option<String>, NodeError> {
        self.store.view(|tx| Ok(tx.get(&entry_key(entry_hash))?))
    }

    /// Header of the commit that created `entry_hash`
    pub fn header_for_entry(&self, entry_hash: &Hash) -> Result<Option<Header>, NodeError> {
        self.store.view(|tx| {
            let Some(header_hash) = tx.get(&entry_header_key(entry_hash))? else {
                return Ok(None);
            };
            let key = header_key(&Hash::parse(&header_hash)?);
            let Some(encoded) = tx.get(&key)? else {
                return Err(NodeError::Store(StoreError::Corrupt {
                    key,
                    reason: "dangling entry→header mapping".into(),
                }));
            };
            Ok(Some(serde_json::from_str(&encoded)?))
        })
    }

    /// Chain excerpt for a validation package, newest first
    pub fn excerpt(&self, opt: ChainOpt) -> Result<serde_json::Value, NodeError> {
        let mut headers = Vec::new();
        let mut entries = Vec::new();
        let (want_headers, want_entries) = match opt {
            ChainOpt::None => return Ok(json!({})),
            ChainOpt::Headers => (true, false),
            ChainOpt::Entries => (false, true),
            ChainOpt::Full => (true, true),
        };

        self.store.view(|tx| {
            let mut cursor = match tx.get(KEY_TOP)? {
                Some(v) => Hash::parse(&v)?,
                None => Hash::NULL,
            };
            while !cursor.is_null() {
                let key = header_key(&cursor);
                let Some(encoded) = tx.get(&key)? else {
                    return Err(NodeError::Store(StoreError::Corrupt {
                        key,
                        reason: "broken header chain".into(),
                    }));
                };
                let header: Header = serde_json::from_str(&encoded)?;
                if want_entries {
                    if let Some(content) = tx.get(&entry_key(&header.entry_link))? {
                        entries.push(content);
                    }
                }
                cursor = header.prev.clone();
                if want_headers {
                    headers.push(header);
                }
            }
            Ok(())
        })?;

        let mut package = serde_json::Map::new();
        if want_headers {
            package.insert("Headers".into(), json!(headers));
        }
        if want_entries {
            package.insert("Entries".into(), json!(entries));
        }
        Ok(serde_json::Value::Object(package))
    }
}
