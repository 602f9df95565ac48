//! Transport seam: request/response message delivery
//!
//! The real network stack lives outside the core; the engine only needs a
//! `send(peer, message) → response` capability plus the local peer identity.
//! `MemoryNetwork` is the in-process implementation used by tests and
//! simulations: a broker routing messages over per-peer channels.

use async_trait::async_trait;
use mycel_model::{Message, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("send timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("remote error: {0}")]
    Remote(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn local_peer(&self) -> PeerId;

    /// Deliver `msg` to `to` and wait for its response
    async fn send(&self, to: &PeerId, msg: Message) -> Result<Message, TransportError>;
}

/// One inbound delivery: the message plus a slot for the response
pub type Delivery = (Message, oneshot::Sender<Result<Message, String>>);

type Inbound = mpsc::Sender<Delivery>;

/// In-process broker routing request/response messages between registered
/// peers
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<Mutex<HashMap<PeerId, Inbound>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer; the returned receiver is the node's inbound queue
    pub async fn register(&self, peer: PeerId) -> (MemoryTransport, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(64);
        self.peers.lock().await.insert(peer, tx);
        let transport = MemoryTransport { local: peer, network: self.clone() };
        (transport, rx)
    }
}

/// In-memory Transport implementation
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    async fn send(&self, to: &PeerId, msg: Message) -> Result<Message, TransportError> {
        let inbound = {
            let peers = self.network.peers.lock().await;
            peers
                .get(to)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(to.to_string()))?
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        inbound
            .send((msg, reply_tx))
            .await
            .map_err(|_| TransportError::Closed)?;
        match reply_rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(TransportError::Remote(reason)),
            Err(_) => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycel_model::Body;

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let net = MemoryNetwork::new();
        let a = PeerId::random();
        let b = PeerId::random();
        let (ta, _rx_a) = net.register(a).await;
        let (_tb, mut rx_b) = net.register(b).await;

        // b echoes Ok to whatever arrives
        tokio::spawn(async move {
            while let Some((msg, reply)) = rx_b.recv().await {
                let _ = reply.send(Ok(Message::new(msg.from, Body::Ok)));
            }
        });

        let resp = ta
            .send(&b, Message::new(a, Body::GossipRequest { my_idx: 0, your_idx: 1 }))
            .await
            .unwrap();
        assert_eq!(resp.body, Body::Ok);
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let net = MemoryNetwork::new();
        let a = PeerId::random();
        let (ta, _rx) = net.register(a).await;
        let err = ta
            .send(&PeerId::random(), Message::new(a, Body::Ok))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_closed() {
        let net = MemoryNetwork::new();
        let a = PeerId::random();
        let b = PeerId::random();
        let (ta, _rx_a) = net.register(a).await;
        let (_tb, mut rx_b) = net.register(b).await;

        tokio::spawn(async move {
            // drop the reply slot without answering
            let _ = rx_b.recv().await;
        });

        let err = ta.send(&b, Message::new(a, Body::Ok)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
