//! Application entries, chain headers, and link records

use crate::hash::{Hash, HashType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a zome's entry content is handed to validation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    /// Content is a script literal, embedded verbatim
    #[serde(rename = "raw-script")]
    RawScript,
    /// Content is a plain string, embedded quoted + escaped
    #[serde(rename = "string")]
    String,
    /// Content is JSON, embedded via JSON.parse
    #[serde(rename = "json")]
    Json,
    /// Content is a JSON link list, embedded via JSON.parse
    #[serde(rename = "links")]
    Links,
}

/// An application-defined data unit; content-addressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_type: String,
    pub content: String,
}

impl Entry {
    pub fn new(entry_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self { entry_type: entry_type.into(), content: content.into() }
    }

    /// Content address of this entry
    pub fn hash(&self, ht: HashType) -> Hash {
        Hash::with(ht, self.content.as_bytes())
    }
}

/// Chain metadata record created when an entry is committed.
///
/// The header chain itself (prev links) is maintained by the source chain;
/// DHT code only reads header values passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub entry_link: Hash,
    pub entry_type: String,
    pub time: DateTime<Utc>,
    pub prev: Hash,
}

/// Status bits of a DHT-held entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStatus;

impl EntryStatus {
    pub const LIVE: u32 = 1;
    pub const REJECTED: u32 = 2;
    pub const DELETED: u32 = 4;
    pub const MODIFIED: u32 = 8;
    pub const ANY: u32 = 255;
}

/// Whether a link record adds or removes a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LinkAction {
    /// Serialized as "" for compatibility with link-list entries
    #[default]
    #[serde(rename = "")]
    Add,
    #[serde(rename = "d")]
    Del,
}

/// One link: base → target, tagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "Base")]
    pub base: Hash,
    #[serde(rename = "Link")]
    pub target: Hash,
    #[serde(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "LinkAction", default)]
    pub action: LinkAction,
}
