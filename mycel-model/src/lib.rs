//! Mycel Model
//!
//! Pure data types for the mycel platform, decoupled from storage engines,
//! script hosts, and the network stack.

pub mod dna;
pub mod entry;
pub mod hash;
pub mod message;

pub use dna::{CallingType, Dna, DnaError, EntryDef, FunctionDef, Sharing, ZomeDef};
pub use entry::{DataFormat, Entry, EntryStatus, Header, Link, LinkAction};
pub use hash::{Hash, HashError, HashType, PeerId};
pub use message::{Body, CodecError, Message, MessageKind, Put};

/// Library version reported to zome code as `HC.Version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
