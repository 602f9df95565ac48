//! The seam between the script host and the node
//!
//! Host functions bottom out in `HostApi`; the node implements it with the
//! real chain, DHT, and transport. Chain-touching calls receive the live
//! `ScriptEval` so validation hooks run inside the isolate that issued the
//! action.

use crate::actions::{GetLinkOptions, GetOptions};
use crate::error::RibosomeError;
use mycel_model::{DnaError, Hash, HashError, PeerId};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    /// Commit-path rendering of a validation veto
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error(transparent)]
    Ribosome(#[from] RibosomeError),

    #[error(transparent)]
    Dna(#[from] DnaError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Synchronous evaluation of generated code in the calling isolate
pub trait ScriptEval {
    fn eval(&mut self, code: &str) -> Result<Value, RibosomeError>;
}

/// What a node answers for a `get`, before mask shaping
#[derive(Debug, Clone, PartialEq)]
pub struct GetResponse {
    pub entry: Value,
    pub entry_type: String,
    pub sources: Vec<String>,
}

/// Identity block exposed to scripts as `App`
#[derive(Debug, Clone, Default)]
pub struct AppIdentity {
    pub name: String,
    pub dna_hash: String,
    pub agent_hash: String,
    pub agent_str: String,
    pub key_hash: String,
}

/// Everything a zome can ask its node to do
pub trait HostApi: Send + Sync {
    fn property(&self, name: &str) -> Result<String, HostError>;

    fn debug(&self, zome: &str, msg: &str);

    fn make_hash(&self, entry: &str) -> Result<Hash, HostError>;

    fn commit(
        &self,
        zome: &str,
        entry_type: &str,
        entry: &str,
        entry_was_object: bool,
        eval: &mut dyn ScriptEval,
    ) -> Result<Hash, HostError>;

    fn get(&self, hash: &Hash, options: &GetOptions) -> Result<GetResponse, HostError>;

    fn modify(
        &self,
        zome: &str,
        entry_type: &str,
        entry: &str,
        entry_was_object: bool,
        replaces: &Hash,
        eval: &mut dyn ScriptEval,
    ) -> Result<Hash, HostError>;

    fn remove(
        &self,
        zome: &str,
        hash: &Hash,
        message: &str,
        eval: &mut dyn ScriptEval,
    ) -> Result<Hash, HostError>;

    fn get_link(&self, base: &Hash, tag: &str, options: &GetLinkOptions) -> Result<Value, HostError>;

    fn send(&self, zome: &str, to: &PeerId, body: String) -> Result<Value, HostError>;

    fn call(
        &self,
        current_zome: &str,
        target_zome: &str,
        function: &str,
        args: String,
        args_was_object: bool,
        eval: &mut dyn ScriptEval,
    ) -> Result<Value, HostError>;
}
