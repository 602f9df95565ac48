//! Gossip Engine - pairwise anti-entropy over the change log
//!
//! Three long-lived tasks: a tick loop that picks a random peer every
//! interval, a single-consumer handler loop that runs one outbound gossip at
//! a time, and the transport receiver owned by the node. Incoming requests
//! may enqueue a back-gossip on the same channel; a per-peer in-flight marker
//! suppresses the loops that would otherwise follow.

use crate::change_log::ChangeLog;
use crate::cursors::PeerCursors;
use crate::error::DhtError;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use mycel_model::{Body, Message, PeerId};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Work item for the handler loop
#[derive(Debug, Clone, Copy)]
pub struct GossipWithReq {
    pub peer: PeerId,
}

/// Applies a gossiped message to local state.
///
/// The node implements this with validation dispatch; the engine itself only
/// guarantees fingerprint dedup and ordering.
#[async_trait]
pub trait PutApplier: Send + Sync {
    async fn apply(&self, msg: &Message) -> Result<(), DhtError>;
}

/// Applier that records messages in the change log without interpreting
/// them; protocol tests use it in place of a full node.
pub struct LogOnlyApplier {
    log: ChangeLog,
}

impl LogOnlyApplier {
    pub fn new(log: ChangeLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PutApplier for LogOnlyApplier {
    async fn apply(&self, msg: &Message) -> Result<(), DhtError> {
        self.log.append_from_message(msg)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GossipConfig {
    pub interval: Duration,
    pub send_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(2), send_timeout: Duration::from_secs(10) }
    }
}

pub struct GossipEngine {
    log: ChangeLog,
    cursors: PeerCursors,
    transport: Arc<dyn Transport>,
    applier: Arc<dyn PutApplier>,
    config: GossipConfig,
    tx: mpsc::Sender<GossipWithReq>,
    rx: Mutex<Option<mpsc::Receiver<GossipWithReq>>>,
    in_flight: Mutex<HashSet<PeerId>>,
    cancel: CancellationToken,
}

impl GossipEngine {
    pub fn new(
        log: ChangeLog,
        cursors: PeerCursors,
        transport: Arc<dyn Transport>,
        applier: Arc<dyn PutApplier>,
        config: GossipConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(32);
        Arc::new(Self {
            log,
            cursors,
            transport,
            applier,
            config,
            tx,
            rx: Mutex::new(Some(rx)),
            in_flight: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Spawn the tick loop and the handler loop
    pub fn start(self: &Arc<Self>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match engine.pick_peer() {
                    Ok(peer) => {
                        let _ = engine.tx.send(GossipWithReq { peer }).await;
                    }
                    Err(DhtError::NoGossipers) => {
                        tracing::debug!("no gossipers available");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "peer selection failed");
                    }
                }
            }
            tracing::debug!("gossip tick loop stopped");
        });

        let engine = self.clone();
        let Some(mut rx) = engine.rx.lock().ok().and_then(|mut slot| slot.take()) else {
            tracing::warn!("gossip engine already started");
            return;
        };
        tokio::spawn(async move {
            loop {
                let req = tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    req = rx.recv() => match req {
                        Some(r) => r,
                        None => break,
                    },
                };
                if let Err(e) = engine.gossip_with(req.peer).await {
                    tracing::warn!(peer = %req.peer, error = %e, "gossip cycle failed");
                }
            }
            tracing::debug!("gossip handler loop stopped");
        });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Queue a gossip exchange with `peer`
    pub async fn enqueue(&self, peer: PeerId) {
        let _ = self.tx.send(GossipWithReq { peer }).await;
    }

    fn pick_peer(&self) -> Result<PeerId, DhtError> {
        let peers = self.cursors.peers()?;
        peers
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or(DhtError::NoGossipers)
    }

    /// Pull everything `peer` has past our cursor and apply it.
    ///
    /// Re-entry for a peer whose exchange is still in flight is a silent
    /// no-op: a request can trigger a back-gossip which, if the first
    /// exchange has not completed, would trigger the same gossip again.
    pub async fn gossip_with(&self, peer: PeerId) -> Result<(), DhtError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, peer) else {
            tracing::debug!(peer = %peer, "gossip already in flight, skipping");
            return Ok(());
        };

        let my_idx = self.log.current_idx()?;
        let their_cursor = self.cursors.cursor(&peer)?;
        tracing::debug!(peer = %peer, my_idx, their_cursor, "gossiping");

        let request = Message::new(
            self.transport.local_peer(),
            Body::GossipRequest { my_idx, your_idx: their_cursor + 1 },
        );
        let response = tokio::time::timeout(
            self.config.send_timeout,
            self.transport.send(&peer, request),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        let mut puts = match response.body {
            Body::Puts { puts } => puts,
            other => return Err(DhtError::BadResponse(other.kind())),
        };
        if puts.is_empty() {
            return Ok(());
        }
        puts.sort_by_key(|p| p.idx);

        let hash_type = self.log.hash_type();
        let mut last_inspected = their_cursor;
        for put in &puts {
            last_inspected = put.idx;
            let Some(msg) = &put.msg else { continue };
            let fingerprint = msg.fingerprint(hash_type)?;
            if self.log.have_fingerprint(&fingerprint)? {
                tracing::debug!(idx = put.idx, %fingerprint, "already have fingerprint");
                continue;
            }
            if let Err(e) = self.applier.apply(msg).await {
                tracing::warn!(peer = %peer, idx = put.idx, error = %e, "put apply failed");
            }
        }
        self.cursors.set_cursor(&peer, last_inspected)?;
        Ok(())
    }

    /// Serve an incoming gossip-protocol message
    pub async fn receive(&self, msg: &Message) -> Result<Message, DhtError> {
        match &msg.body {
            Body::GossipRequest { my_idx, your_idx } => {
                self.handle_request(msg.from, *my_idx, *your_idx).await
            }
            Body::Puts { .. } => Err(DhtError::ExpectedGossipReq),
            other => Err(DhtError::UnknownMessageKind(other.kind())),
        }
    }

    /// Answer a gossip request and, when the requester is ahead of our
    /// record of them, queue a symmetric pull
    pub async fn handle_request(
        &self,
        remote: PeerId,
        remote_idx: u64,
        wanted_from: u64,
    ) -> Result<Message, DhtError> {
        tracing::debug!(peer = %remote, remote_idx, wanted_from, "gossip request");
        let puts = self.log.puts_since(wanted_from)?;

        let our_cursor = self.cursors.cursor(&remote)?;
        if our_cursor < remote_idx {
            tracing::debug!(
                peer = %remote,
                our_cursor,
                remote_idx,
                "remote is ahead, queueing back-gossip"
            );
            self.cursors.register(&remote)?;
            let _ = self.tx.send(GossipWithReq { peer: remote }).await;
        }

        Ok(Message::new(self.transport.local_peer(), Body::Puts { puts }))
    }
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PeerId>>,
    peer: PeerId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<PeerId>>, peer: PeerId) -> Option<Self> {
        let Ok(mut guard) = set.lock() else { return None };
        if !guard.insert(peer) {
            return None;
        }
        Some(Self { set, peer })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.set.lock() {
            guard.remove(&self.peer);
        }
    }
}
