use mycel_model::{DataFormat, HashError};
use thiserror::Error;

/// Errors surfaced by the script host and its argument pipeline
#[derive(Error, Debug)]
pub enum RibosomeError {
    #[error("argument {position} ({name}) should be {expected}, got {got}")]
    ArgError { position: usize, name: String, expected: String, got: String },

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    ArgCount { expected: String, got: usize },

    #[error("{function} should return boolean, got: {got}")]
    InvalidResult { function: String, got: String },

    #[error("validation failed")]
    ValidationFailed,

    #[error("genesis failed")]
    GenesisFailed,

    #[error("JS exec error: {0}")]
    Js(String),

    #[error("ribosome init failed: {0}")]
    Init(String),

    #[error("ribosome stopped")]
    Stopped,

    #[error("unknown host function: {0}")]
    UnknownFunction(String),

    #[error("data format not implemented: {0:?}")]
    DataFormat(DataFormat),

    #[error(transparent)]
    Hash(#[from] HashError),
}
