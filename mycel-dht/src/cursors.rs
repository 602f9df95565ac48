//! Peer Cursor Table - per-remote-peer high-water marks
//!
//! `peer:<base58>` → the highest index on that peer we are confident we have
//! assimilated. Updates are monotone: a lower value is silently ignored.

use crate::error::DhtError;
use mycel_model::PeerId;
use mycel_store::{KeyedStore, StoreError};
use std::sync::Arc;

fn peer_key(peer: &PeerId) -> String {
    format!("peer:{}", peer)
}

#[derive(Clone)]
pub struct PeerCursors {
    store: Arc<KeyedStore>,
}

impl PeerCursors {
    pub fn new(store: Arc<KeyedStore>) -> Self {
        Self { store }
    }

    /// Cursor for `peer`; 0 when the peer is unknown
    pub fn cursor(&self, peer: &PeerId) -> Result<u64, DhtError> {
        let key = peer_key(peer);
        self.store.view(|tx| match tx.get(&key)? {
            Some(v) => v.parse().map_err(|_| {
                DhtError::Store(StoreError::Corrupt {
                    key: key.clone(),
                    reason: format!("expected integer, got {:?}", v),
                })
            }),
            None => Ok(0),
        })
    }

    /// Make `peer` known (cursor 0) if it was not already
    pub fn register(&self, peer: &PeerId) -> Result<(), DhtError> {
        let key = peer_key(peer);
        self.store.update(|tx| {
            if tx.get(&key)?.is_none() {
                tx.set(&key, "0")?;
            }
            Ok(())
        })
    }

    /// Monotone advance; a `new_idx` below the current cursor is a no-op
    pub fn set_cursor(&self, peer: &PeerId, new_idx: u64) -> Result<(), DhtError> {
        let key = peer_key(peer);
        self.store.update(|tx| {
            let current: u64 = match tx.get(&key)? {
                Some(v) => v.parse().map_err(|_| {
                    DhtError::Store(StoreError::Corrupt {
                        key: key.clone(),
                        reason: format!("expected integer, got {:?}", v),
                    })
                })?,
                None => 0,
            };
            if new_idx < current {
                return Ok(());
            }
            tx.set(&key, &new_idx.to_string())?;
            Ok(())
        })
    }

    /// Every known peer, decoded from the `peer:` prefix; a bad key aborts
    pub fn peers(&self) -> Result<Vec<PeerId>, DhtError> {
        self.store.view(|tx| {
            let mut peers = Vec::new();
            tx.ascend("peer:", |key, _| {
                let id = PeerId::parse(&key["peer:".len()..])?;
                peers.push(id);
                Ok::<bool, DhtError>(true)
            })?;
            Ok(peers)
        })
    }
}
