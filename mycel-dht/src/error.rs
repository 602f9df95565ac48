use crate::transport::TransportError;
use mycel_model::{CodecError, Hash, HashError, MessageKind};
use mycel_store::StoreError;
use thiserror::Error;

/// Errors from the replication engine
#[derive(Error, Debug)]
pub enum DhtError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no such change index: {0}")]
    NoSuchIdx(u64),

    #[error("fingerprint already recorded: {0}")]
    DuplicateFingerprint(Hash),

    #[error("no gossipers available")]
    NoGossipers,

    #[error("expected gossip request")]
    ExpectedGossipReq,

    #[error("message kind {0:?} not in gossip protocol")]
    UnknownMessageKind(MessageKind),

    #[error("unexpected response kind {0:?}")]
    BadResponse(MessageKind),

    #[error("entry not held: {0}")]
    EntryMissing(Hash),

    #[error("apply rejected: {0}")]
    Apply(String),
}
