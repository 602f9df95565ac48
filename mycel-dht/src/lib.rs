//! Mycel DHT
//!
//! The replication engine: a per-node change log with fingerprint dedup, a
//! peer cursor table, content-addressed entry/link storage, and the
//! anti-entropy gossip protocol that reconciles change logs pairwise.

pub mod change_log;
pub mod cursors;
pub mod dht_store;
pub mod error;
pub mod gossip;
pub mod transport;

pub use change_log::ChangeLog;
pub use cursors::PeerCursors;
pub use dht_store::{DhtEntry, DhtStore, StoredLink};
pub use error::DhtError;
pub use gossip::{GossipConfig, GossipEngine, GossipWithReq, LogOnlyApplier, PutApplier};
pub use transport::{Delivery, MemoryNetwork, MemoryTransport, Transport, TransportError};
