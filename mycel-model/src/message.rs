//! DHT protocol messages, canonical encoding, and fingerprints
//!
//! The canonical encoding is what gets stored in the change log and hashed
//! into fingerprints; it must be deterministic, and encode→decode must be
//! byte-exact.

use crate::entry::Link;
use crate::hash::{Hash, HashType, PeerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("canonical encode failed: {0}")]
    Encode(postcard::Error),

    #[error("canonical decode failed: {0}")]
    Decode(postcard::Error),
}

/// Discriminant of a message body; the wire-level message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Put,
    Get,
    Mod,
    Del,
    Link,
    GetLink,
    PutMeta,
    GetMeta,
    GossipRequest,
    App,
    Entry,
    Puts,
    Links,
    Ok,
    Err,
}

/// Typed payload of a message; one variant per MessageKind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// Announce an entry; the receiver fetches content from the sender
    Put { entry_hash: Hash },
    Get { hash: Hash, status_mask: u32, get_mask: u32 },
    Mod { hash: Hash, new_hash: Hash },
    Del { hash: Hash, message: String },
    Link { base: Hash, links: Vec<Link> },
    GetLink { base: Hash, tag: String, status_mask: u32 },
    PutMeta { base: Hash, meta: Hash, tag: String },
    GetMeta { base: Hash, tag: String },
    GossipRequest { my_idx: u64, your_idx: u64 },
    /// Node-to-node application message, handled by the zome's receive hook
    App { zome: String, body: String },
    /// Get response
    Entry { entry_type: String, content: String, sources: Vec<PeerId>, status: u32 },
    /// GossipRequest response
    Puts { puts: Vec<Put> },
    /// GetLink / GetMeta response
    Links { links: Vec<Link> },
    Ok,
    Err { reason: String },
}

impl Body {
    pub fn kind(&self) -> MessageKind {
        match self {
            Body::Put { .. } => MessageKind::Put,
            Body::Get { .. } => MessageKind::Get,
            Body::Mod { .. } => MessageKind::Mod,
            Body::Del { .. } => MessageKind::Del,
            Body::Link { .. } => MessageKind::Link,
            Body::GetLink { .. } => MessageKind::GetLink,
            Body::PutMeta { .. } => MessageKind::PutMeta,
            Body::GetMeta { .. } => MessageKind::GetMeta,
            Body::GossipRequest { .. } => MessageKind::GossipRequest,
            Body::App { .. } => MessageKind::App,
            Body::Entry { .. } => MessageKind::Entry,
            Body::Puts { .. } => MessageKind::Puts,
            Body::Links { .. } => MessageKind::Links,
            Body::Ok => MessageKind::Ok,
            Body::Err { .. } => MessageKind::Err,
        }
    }
}

/// Envelope for everything that crosses the transport or lands in the
/// change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: PeerId,
    pub time: DateTime<Utc>,
    pub body: Body,
}

impl Message {
    pub fn new(from: PeerId, body: Body) -> Self {
        Self { from, time: Utc::now(), body }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Deterministic binary encoding; the fingerprint preimage
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(self).map_err(CodecError::Encode)
    }

    pub fn from_canonical(bytes: &[u8]) -> Result<Self, CodecError> {
        postcard::from_bytes(bytes).map_err(CodecError::Decode)
    }

    /// Deduplication key: hash of the canonical encoding
    pub fn fingerprint(&self, ht: HashType) -> Result<Hash, CodecError> {
        Ok(Hash::with(ht, &self.canonical_bytes()?))
    }
}

/// One applied change; the unit of gossip replication.
///
/// `msg` is `None` only for the genesis DNA slot, whose stored blob is
/// allowed to be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Put {
    pub idx: u64,
    pub msg: Option<Message>,
}
