use mycel_dht::{DhtError, TransportError};
use mycel_model::{CodecError, DnaError, HashError};
use mycel_ribosome::{HostError, RibosomeError};
use mycel_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("DHT error: {0}")]
    Dht(#[from] DhtError),

    #[error("Ribosome error: {0}")]
    Ribosome(#[from] RibosomeError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("DNA error: {0}")]
    Dna(#[from] DnaError),

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("genesis failed for zome {zome}: {reason}")]
    Genesis { zome: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("component not running: {0}")]
    NotRunning(&'static str),
}
