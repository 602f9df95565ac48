//! Mycel Ribosome
//!
//! The sandboxed application-code host. One isolate per zome, typed action
//! dispatch with argument coercion at the script boundary, and the
//! validation gateway that asks zome code whether to accept each
//! chain-touching action.

pub mod actions;
pub mod args;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod runtime;
pub mod sanitize;
pub mod validate;

pub use actions::{GetLinkOptions, GetOptions, ZomeAction};
pub use args::{ArgSpec, ArgType, CoreValue};
pub use error::RibosomeError;
pub use host::{AppIdentity, GetResponse, HostApi, HostError, ScriptEval};
pub use runtime::{
    call_code, parse_call_result, run_validation, spawn_ribosome, RibosomeHandle, ScopeEval,
};
pub use sanitize::js_sanitize;
pub use validate::{
    packaging_code, parse_packaging_result, validation_code, ChainOpt, PackagingRequest,
    ValidateArgs, ValidatingAction, ValidationPackage,
};
