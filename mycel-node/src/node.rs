//! The node: wires the chain, DHT, gossip engine, and zome ribosomes
//! together and implements the host surface that zome code calls into.
//!
//! All state-visible mutation funnels through the `HostApi` implementation
//! (local actions) or `apply_dht_message` (remote actions via gossip or
//! direct delivery); both consult the validation gateway before touching the
//! store, and both record every change in the change log.

use crate::chain::SourceChain;
use crate::config::NodeConfig;
use crate::error::NodeError;
use async_trait::async_trait;
use chrono::Utc;
use mycel_dht::{
    ChangeLog, Delivery, DhtError, DhtStore, GossipConfig, GossipEngine, PeerCursors, PutApplier,
    Transport, TransportError,
};
use mycel_model::{
    Body, CallingType, DataFormat, Dna, DnaError, EntryDef, EntryStatus, Hash, Link, LinkAction,
    Message, PeerId, Sharing,
};
use mycel_ribosome::{
    actions::GET_MASK_ALL, call_code, packaging_code, parse_call_result, parse_packaging_result,
    run_validation, spawn_ribosome, validate::validate_fn_name, validation_code, AppIdentity,
    ChainOpt, GetLinkOptions, GetOptions, GetResponse, HostApi, HostError, RibosomeError,
    RibosomeHandle, ScriptEval, ValidateArgs, ValidatingAction, ValidationPackage,
};
use mycel_store::KeyedStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tokio::sync::mpsc;

/// Entry types the node itself commits at genesis
pub const DNA_ENTRY_TYPE: &str = "%dna";
pub const AGENT_ENTRY_TYPE: &str = "%agent";

pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").finish_non_exhaustive()
    }
}

struct NodeInner {
    id: PeerId,
    dna: Dna,
    dna_hash: Hash,
    agent_name: String,
    config: NodeConfig,
    chain: SourceChain,
    dht: DhtStore,
    log: ChangeLog,
    cursors: PeerCursors,
    transport: Arc<dyn Transport>,
    engine: OnceLock<Arc<GossipEngine>>,
    ribosomes: RwLock<HashMap<String, RibosomeHandle>>,
    runtime: tokio::runtime::Handle,
}

impl Node {
    /// Bring a node up: open storage, write genesis chain records, spawn one
    /// ribosome per zome, run the genesis hooks, then start gossip and the
    /// transport receiver.
    pub async fn new(
        id: PeerId,
        dna: Dna,
        agent_name: &str,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        mut inbound: mpsc::Receiver<Delivery>,
    ) -> Result<Self, NodeError> {
        let store = match &config.data_dir {
            Some(dir) => Arc::new(KeyedStore::open(dir.join("mycel.redb"))?),
            None => Arc::new(KeyedStore::in_memory()?),
        };
        let hash_type = dna.hash_type;
        let dna_json = serde_json::to_string(&dna)?;
        let dna_hash = Hash::with(hash_type, dna_json.as_bytes());

        let inner = Arc::new(NodeInner {
            id,
            dna_hash,
            agent_name: agent_name.to_string(),
            chain: SourceChain::new(store.clone(), hash_type),
            dht: DhtStore::new(store.clone(), hash_type),
            log: ChangeLog::new(store.clone(), hash_type),
            cursors: PeerCursors::new(store),
            transport,
            engine: OnceLock::new(),
            ribosomes: RwLock::new(HashMap::new()),
            runtime: tokio::runtime::Handle::current(),
            config,
            dna,
        });

        if inner.chain.is_empty()? {
            inner.chain.append(DNA_ENTRY_TYPE, &dna_json, Utc::now())?;
            inner.chain.append(AGENT_ENTRY_TYPE, agent_name, Utc::now())?;
            tracing::info!(node = %id, dna = %inner.dna_hash, "chain genesis written");
        }

        let app = AppIdentity {
            name: inner.dna.name.clone(),
            dna_hash: inner.dna_hash.to_string(),
            agent_hash: Hash::with(hash_type, agent_name.as_bytes()).to_string(),
            agent_str: agent_name.to_string(),
            key_hash: id.to_string(),
        };
        for zome in inner.dna.zomes.clone() {
            let name = zome.name.clone();
            let host: Arc<dyn HostApi> = inner.clone();
            let (handle, _join) = spawn_ribosome(zome, app.clone(), host).await?;
            if let Ok(mut map) = inner.ribosomes.write() {
                map.insert(name, handle);
            }
        }

        // genesis hooks run once the chain genesis records exist
        let handles: Vec<RibosomeHandle> = match inner.ribosomes.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.genesis().await.map_err(|e| NodeError::Genesis {
                zome: handle.zome().to_string(),
                reason: e.to_string(),
            })?;
        }

        let engine = GossipEngine::new(
            inner.log.clone(),
            inner.cursors.clone(),
            inner.transport.clone(),
            inner.clone(),
            GossipConfig {
                interval: inner.config.gossip_interval,
                send_timeout: inner.config.send_timeout,
            },
        );
        engine.start();
        let _ = inner.engine.set(engine);

        let receiver = inner.clone();
        tokio::spawn(async move {
            while let Some((msg, reply)) = inbound.recv().await {
                let node = receiver.clone();
                tokio::spawn(async move {
                    let response = node.handle_message(msg).await.map_err(|e| e.to_string());
                    let _ = reply.send(response);
                });
            }
            tracing::debug!("transport receiver stopped");
        });

        Ok(Node { inner })
    }

    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    pub fn dna_hash(&self) -> &Hash {
        &self.inner.dna_hash
    }

    pub fn log(&self) -> &ChangeLog {
        &self.inner.log
    }

    pub fn cursors(&self) -> &PeerCursors {
        &self.inner.cursors
    }

    pub fn dht(&self) -> &DhtStore {
        &self.inner.dht
    }

    pub fn chain(&self) -> &SourceChain {
        &self.inner.chain
    }

    pub fn engine(&self) -> Result<Arc<GossipEngine>, NodeError> {
        Ok(self.inner.engine()?.clone())
    }

    /// Make a peer known to the gossip layer
    pub fn add_peer(&self, peer: PeerId) -> Result<(), NodeError> {
        self.inner.cursors.register(&peer)?;
        Ok(())
    }

    /// Call an exposed zome function on behalf of an external client (the
    /// HTTP/WS bridge collaborator)
    pub async fn call(&self, zome: &str, function: &str, args: &str) -> Result<String, NodeError> {
        let fndef = self.inner.dna.zome(zome)?.function_def(function)?.clone();
        let handle = self.inner.ribosome(zome)?;
        Ok(handle.call(fndef.name, fndef.calling_type, args.to_string()).await?)
    }

    /// Stop gossip and tear the ribosomes down
    pub async fn shutdown(&self) {
        if let Some(engine) = self.inner.engine.get() {
            engine.shutdown();
        }
        let handles: Vec<RibosomeHandle> = match self.inner.ribosomes.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

impl NodeInner {
    fn engine(&self) -> Result<&Arc<GossipEngine>, NodeError> {
        self.engine.get().ok_or(NodeError::NotRunning("gossip engine"))
    }

    fn ribosome(&self, zome: &str) -> Result<RibosomeHandle, HostError> {
        let map = self
            .ribosomes
            .read()
            .map_err(|_| HostError::Store("ribosome table lock poisoned".into()))?;
        map.get(zome)
            .cloned()
            .ok_or_else(|| DnaError::UnknownZome(zome.to_string()).into())
    }

    fn find_entry_def(&self, entry_type: &str) -> Result<(&str, &EntryDef), HostError> {
        for zome in &self.dna.zomes {
            if let Ok(def) = zome.entry_def(entry_type) {
                return Ok((&zome.name, def));
            }
        }
        Err(DnaError::UnknownEntryType(entry_type.to_string()).into())
    }

    /// Entries declared json/links hand scripts parsed values, everything
    /// else stays a string
    fn render_entry(&self, entry_type: &str, content: String) -> Value {
        let format = self
            .find_entry_def(entry_type)
            .map(|(_, def)| def.data_format)
            .unwrap_or(DataFormat::String);
        match format {
            DataFormat::Json | DataFormat::Links => match serde_json::from_str(&content) {
                Ok(v) => v,
                Err(_) => Value::String(content),
            },
            _ => Value::String(content),
        }
    }

    fn assemble_package(
        &self,
        eval: &mut dyn ScriptEval,
        action_name: &str,
        def_name: &str,
    ) -> Result<Option<ValidationPackage>, HostError> {
        let code = packaging_code(action_name, def_name);
        let v = match eval.eval(&code) {
            Ok(v) => v,
            // a zome without the hook gets no package
            Err(RibosomeError::Js(m)) if m.contains("is not defined") => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(request) = parse_packaging_result(&code, &v)? else {
            return Ok(None);
        };
        if request.chain == ChainOpt::None {
            return Ok(None);
        }
        let chain = self
            .chain
            .excerpt(request.chain)
            .map_err(|e| HostError::Store(e.to_string()))?;
        Ok(Some(ValidationPackage { chain: Some(chain) }))
    }

    /// Run a validation hook in the isolate that issued the action
    fn validate_local(
        &self,
        eval: &mut dyn ScriptEval,
        action_name: &'static str,
        def: &EntryDef,
        args: ValidateArgs<'_>,
        entry_for_error: &str,
    ) -> Result<(), HostError> {
        let package = self.assemble_package(eval, action_name, &def.name)?;
        let action = ValidatingAction { name: action_name, def_name: &def.name, args };
        let sources = vec![self.id.to_string()];
        let code = validation_code(&action, package.as_ref(), &sources)?;
        let v = eval.eval(&code)?;
        match mycel_ribosome::validate::check_validation_result(&validate_fn_name(action_name), &v)
        {
            Ok(()) => Ok(()),
            Err(RibosomeError::ValidationFailed) => {
                Err(HostError::InvalidEntry(entry_for_error.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run a validation hook for a remotely-originated action on the zome
    /// that owns the entry type
    async fn validate_remote(
        &self,
        action_name: &'static str,
        def_name: &str,
        args: ValidateArgs<'_>,
        from: &PeerId,
    ) -> Result<(), NodeError> {
        let (zome, _) = self.find_entry_def(def_name)?;
        let handle = self.ribosome(zome)?;
        let action = ValidatingAction { name: action_name, def_name, args };
        let sources = vec![from.to_string()];
        let code = validation_code(&action, None, &sources)?;
        run_validation(&handle, code, &validate_fn_name(action_name)).await?;
        Ok(())
    }

    fn object_entry_mismatch(def: &EntryDef, entry_was_object: bool) -> Result<(), HostError> {
        if entry_was_object
            && matches!(def.data_format, DataFormat::String | DataFormat::RawScript)
        {
            return Err(RibosomeError::ArgError {
                position: 2,
                name: "entry".into(),
                expected: "string".into(),
                got: "object".into(),
            }
            .into());
        }
        Ok(())
    }

    fn publish_entry(
        &self,
        def: &EntryDef,
        entry_hash: &Hash,
        entry_type: &str,
        content: &str,
    ) -> Result<(), HostError> {
        let msg = Message::new(self.id, Body::Put { entry_hash: entry_hash.clone() });
        self.dht
            .apply_put(&msg, entry_hash, entry_type, content)
            .map_err(|e| HostError::Store(e.to_string()))?;
        if def.data_format == DataFormat::Links {
            self.register_links(content)?;
        }
        Ok(())
    }

    /// A committed links-format entry also registers its links against
    /// their bases
    fn register_links(&self, content: &str) -> Result<(), HostError> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| HostError::Store(e.to_string()))?;
        let links: Vec<Link> =
            serde_json::from_value(value.get("Links").cloned().unwrap_or(json!([])))
                .map_err(|e| HostError::Store(e.to_string()))?;

        let mut by_base: Vec<(Hash, Vec<Link>)> = Vec::new();
        for link in links {
            match by_base.iter_mut().find(|(base, _)| *base == link.base) {
                Some((_, group)) => group.push(link),
                None => by_base.push((link.base.clone(), vec![link])),
            }
        }
        for (base, links) in by_base {
            let msg = Message::new(self.id, Body::Link { base: base.clone(), links: links.clone() });
            self.dht
                .apply_links(&msg, &base, &links)
                .map_err(|e| HostError::Store(e.to_string()))?;
        }
        Ok(())
    }

    async fn send_with_timeout(&self, to: &PeerId, msg: Message) -> Result<Message, NodeError> {
        let reply = tokio::time::timeout(self.config.send_timeout, self.transport.send(to, msg))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(reply)
    }

    /// Serve one inbound transport message
    async fn handle_message(&self, msg: Message) -> Result<Message, NodeError> {
        tracing::debug!(from = %msg.from, kind = ?msg.kind(), "inbound message");
        match &msg.body {
            Body::GossipRequest { .. } => Ok(self.engine()?.receive(&msg).await?),
            Body::Get { hash, status_mask, .. } => {
                let entry = self
                    .dht
                    .get_entry(hash, *status_mask)?
                    .ok_or_else(|| NodeError::NotFound(hash.to_string()))?;
                let sources =
                    entry.sources.iter().filter_map(|s| PeerId::parse(s).ok()).collect();
                Ok(Message::new(
                    self.id,
                    Body::Entry {
                        entry_type: entry.entry_type,
                        content: entry.content,
                        sources,
                        status: entry.status,
                    },
                ))
            }
            Body::GetLink { base, tag, status_mask } => {
                Ok(Message::new(self.id, self.links_body(base, tag, *status_mask)?))
            }
            Body::GetMeta { base, tag } => {
                Ok(Message::new(self.id, self.links_body(base, tag, EntryStatus::LIVE)?))
            }
            Body::App { zome, body } => {
                let handle = self.ribosome(zome)?;
                let response = handle.receive(msg.from.to_string(), body.clone()).await?;
                Ok(Message::new(self.id, Body::App { zome: zome.clone(), body: response }))
            }
            Body::Put { .. }
            | Body::Mod { .. }
            | Body::Del { .. }
            | Body::Link { .. }
            | Body::PutMeta { .. } => {
                let fingerprint = msg.fingerprint(self.dna.hash_type)?;
                if !self.log.have_fingerprint(&fingerprint)? {
                    self.apply_dht_message(&msg).await?;
                }
                Ok(Message::new(self.id, Body::Ok))
            }
            other => Err(NodeError::Dht(DhtError::UnknownMessageKind(other.kind()))),
        }
    }

    fn links_body(&self, base: &Hash, tag: &str, status_mask: u32) -> Result<Body, NodeError> {
        let links = self
            .dht
            .links(base, tag, status_mask)?
            .into_iter()
            .filter_map(|l| {
                Some(Link {
                    base: base.clone(),
                    target: Hash::parse(&l.target).ok()?,
                    tag: l.tag,
                    action: LinkAction::Add,
                })
            })
            .collect();
        Ok(Body::Links { links })
    }

    /// Validate and apply one remotely-originated change (the
    /// `ActionReceiver` of the gossip engine)
    async fn apply_dht_message(&self, msg: &Message) -> Result<(), NodeError> {
        match &msg.body {
            Body::Put { entry_hash } => {
                if self.dht.get_entry(entry_hash, EntryStatus::ANY)?.is_some() {
                    // content already held; just record the message
                    self.log.append_from_message(msg)?;
                    return Ok(());
                }
                let request = Message::new(
                    self.id,
                    Body::Get {
                        hash: entry_hash.clone(),
                        status_mask: EntryStatus::ANY,
                        get_mask: GET_MASK_ALL,
                    },
                );
                let reply = self.send_with_timeout(&msg.from, request).await?;
                let kind = reply.kind();
                let Body::Entry { entry_type, content, .. } = reply.body else {
                    return Err(NodeError::Dht(DhtError::BadResponse(kind)));
                };
                let (_, def) = self.find_entry_def(&entry_type)?;
                let format = def.data_format;
                self.validate_remote(
                    "Put",
                    &entry_type,
                    ValidateArgs::Entry { format, content: &content, header: None },
                    &msg.from,
                )
                .await?;
                self.dht.apply_put(msg, entry_hash, &entry_type, &content)?;
                Ok(())
            }
            Body::Mod { hash, new_hash } => {
                let new_entry = self
                    .dht
                    .get_entry(new_hash, EntryStatus::ANY)?
                    .ok_or_else(|| NodeError::Dht(DhtError::EntryMissing(new_hash.clone())))?;
                let (_, def) = self.find_entry_def(&new_entry.entry_type)?;
                let format = def.data_format;
                let entry_type = new_entry.entry_type.clone();
                self.validate_remote(
                    "Mod",
                    &entry_type,
                    ValidateArgs::Mod {
                        format,
                        content: &new_entry.content,
                        header: None,
                        replaces: hash,
                    },
                    &msg.from,
                )
                .await?;
                self.dht.apply_mod(msg, hash, new_hash)?;
                Ok(())
            }
            Body::Del { hash, .. } => {
                let held = self
                    .dht
                    .get_entry(hash, EntryStatus::ANY)?
                    .ok_or_else(|| NodeError::Dht(DhtError::EntryMissing(hash.clone())))?;
                self.validate_remote(
                    "Del",
                    &held.entry_type,
                    ValidateArgs::Del { hash },
                    &msg.from,
                )
                .await?;
                self.dht.apply_del(msg, hash)?;
                Ok(())
            }
            Body::Link { base, links } => {
                let held = self
                    .dht
                    .get_entry(base, EntryStatus::ANY)?
                    .ok_or_else(|| NodeError::Dht(DhtError::EntryMissing(base.clone())))?;
                let links_json = serde_json::to_string(links)?;
                self.validate_remote(
                    "Link",
                    &held.entry_type,
                    ValidateArgs::Link { base, links_json: &links_json },
                    &msg.from,
                )
                .await?;
                self.dht.apply_links(msg, base, links)?;
                Ok(())
            }
            Body::PutMeta { base, meta, tag } => {
                // a meta put is an equivalent link record; validate it
                // through the same hook
                let held = self
                    .dht
                    .get_entry(base, EntryStatus::ANY)?
                    .ok_or_else(|| NodeError::Dht(DhtError::EntryMissing(base.clone())))?;
                let links = [Link {
                    base: base.clone(),
                    target: meta.clone(),
                    tag: tag.clone(),
                    action: LinkAction::Add,
                }];
                let links_json = serde_json::to_string(&links)?;
                self.validate_remote(
                    "Link",
                    &held.entry_type,
                    ValidateArgs::Link { base, links_json: &links_json },
                    &msg.from,
                )
                .await?;
                self.dht.apply_links(msg, base, &links)?;
                Ok(())
            }
            other => Err(NodeError::Dht(DhtError::UnknownMessageKind(other.kind()))),
        }
    }
}

#[async_trait]
impl PutApplier for NodeInner {
    async fn apply(&self, msg: &Message) -> Result<(), DhtError> {
        self.apply_dht_message(msg)
            .await
            .map_err(|e| DhtError::Apply(e.to_string()))
    }
}

impl HostApi for NodeInner {
    fn property(&self, name: &str) -> Result<String, HostError> {
        match name {
            "_id" => Ok(self.dna_hash.to_string()),
            "_agent_id" => Ok(self.id.to_string()),
            "_agent_name" => Ok(self.agent_name.clone()),
            _ => self
                .dna
                .property(name)
                .map(str::to_string)
                .ok_or_else(|| HostError::NotFound(name.to_string())),
        }
    }

    fn debug(&self, zome: &str, msg: &str) {
        tracing::debug!(zome = %zome, "{}", msg);
    }

    fn make_hash(&self, entry: &str) -> Result<Hash, HostError> {
        Ok(Hash::with(self.dna.hash_type, entry.as_bytes()))
    }

    fn commit(
        &self,
        zome: &str,
        entry_type: &str,
        entry: &str,
        entry_was_object: bool,
        eval: &mut dyn ScriptEval,
    ) -> Result<Hash, HostError> {
        let def = self.dna.zome(zome)?.entry_def(entry_type)?.clone();
        Self::object_entry_mismatch(&def, entry_was_object)?;
        self.validate_local(
            eval,
            "Commit",
            &def,
            ValidateArgs::Entry { format: def.data_format, content: entry, header: None },
            entry,
        )?;
        let (entry_hash, _header) = self
            .chain
            .append(entry_type, entry, Utc::now())
            .map_err(|e| HostError::Store(e.to_string()))?;
        if def.sharing == Sharing::Public {
            self.publish_entry(&def, &entry_hash, entry_type, entry)?;
        }
        tracing::debug!(zome = %zome, entry_type = %entry_type, hash = %entry_hash, "committed");
        Ok(entry_hash)
    }

    fn get(&self, hash: &Hash, options: &GetOptions) -> Result<GetResponse, HostError> {
        if options.local {
            let content = self
                .chain
                .entry(hash)
                .map_err(|e| HostError::Store(e.to_string()))?
                .ok_or_else(|| HostError::NotFound(hash.to_string()))?;
            let entry_type = self
                .chain
                .header_for_entry(hash)
                .map_err(|e| HostError::Store(e.to_string()))?
                .map(|h| h.entry_type)
                .unwrap_or_default();
            let entry = self.render_entry(&entry_type, content);
            return Ok(GetResponse { entry, entry_type, sources: vec![self.id.to_string()] });
        }
        let held = self
            .dht
            .get_entry(hash, options.status_mask)
            .map_err(|e| HostError::Store(e.to_string()))?
            .ok_or_else(|| HostError::NotFound(hash.to_string()))?;
        let entry = self.render_entry(&held.entry_type, held.content);
        Ok(GetResponse { entry, entry_type: held.entry_type, sources: held.sources })
    }

    fn modify(
        &self,
        zome: &str,
        entry_type: &str,
        entry: &str,
        entry_was_object: bool,
        replaces: &Hash,
        eval: &mut dyn ScriptEval,
    ) -> Result<Hash, HostError> {
        let def = self.dna.zome(zome)?.entry_def(entry_type)?.clone();
        Self::object_entry_mismatch(&def, entry_was_object)?;
        self.validate_local(
            eval,
            "Mod",
            &def,
            ValidateArgs::Mod {
                format: def.data_format,
                content: entry,
                header: None,
                replaces,
            },
            entry,
        )?;
        let (new_hash, _header) = self
            .chain
            .append(entry_type, entry, Utc::now())
            .map_err(|e| HostError::Store(e.to_string()))?;
        if def.sharing == Sharing::Public {
            self.publish_entry(&def, &new_hash, entry_type, entry)?;
            let msg = Message::new(
                self.id,
                Body::Mod { hash: replaces.clone(), new_hash: new_hash.clone() },
            );
            self.dht
                .apply_mod(&msg, replaces, &new_hash)
                .map_err(|e| HostError::Store(e.to_string()))?;
        }
        Ok(new_hash)
    }

    fn remove(
        &self,
        _zome: &str,
        hash: &Hash,
        message: &str,
        eval: &mut dyn ScriptEval,
    ) -> Result<Hash, HostError> {
        let header = self
            .chain
            .header_for_entry(hash)
            .map_err(|e| HostError::Store(e.to_string()))?
            .ok_or_else(|| HostError::NotFound(hash.to_string()))?;
        let (_, def) = self.find_entry_def(&header.entry_type)?;
        let def = def.clone();
        self.validate_local(eval, "Del", &def, ValidateArgs::Del { hash }, message)?;
        let msg = Message::new(
            self.id,
            Body::Del { hash: hash.clone(), message: message.to_string() },
        );
        self.dht
            .apply_del(&msg, hash)
            .map_err(|e| HostError::Store(e.to_string()))?;
        Ok(hash.clone())
    }

    fn get_link(
        &self,
        base: &Hash,
        tag: &str,
        options: &GetLinkOptions,
    ) -> Result<Value, HostError> {
        let links = self
            .dht
            .links(base, tag, options.status_mask)
            .map_err(|e| HostError::Store(e.to_string()))?;
        let mut out = Vec::with_capacity(links.len());
        for link in links {
            let mut obj = serde_json::Map::new();
            obj.insert("H".into(), Value::String(link.target.clone()));
            if options.load {
                if let Ok(target) = Hash::parse(&link.target) {
                    if let Some(held) = self
                        .dht
                        .get_entry(&target, EntryStatus::ANY)
                        .map_err(|e| HostError::Store(e.to_string()))?
                    {
                        obj.insert("E".into(), self.render_entry(&held.entry_type, held.content));
                    }
                }
            }
            out.push(Value::Object(obj));
        }
        Ok(json!({ "Links": out }))
    }

    fn send(&self, zome: &str, to: &PeerId, body: String) -> Result<Value, HostError> {
        let msg = Message::new(self.id, Body::App { zome: zome.to_string(), body });
        let transport = self.transport.clone();
        let timeout = self.config.send_timeout;
        let to = *to;
        let reply = self
            .runtime
            .block_on(async move {
                tokio::time::timeout(timeout, transport.send(&to, msg))
                    .await
                    .map_err(|_| TransportError::Timeout)?
            })
            .map_err(|e| HostError::Transport(e.to_string()))?;
        match reply.body {
            Body::App { body, .. } => Ok(Value::String(body)),
            other => Err(HostError::Transport(format!(
                "unexpected reply kind {:?}",
                other.kind()
            ))),
        }
    }

    fn call(
        &self,
        current_zome: &str,
        target_zome: &str,
        function: &str,
        args: String,
        args_was_object: bool,
        eval: &mut dyn ScriptEval,
    ) -> Result<Value, HostError> {
        let fndef = self.dna.zome(target_zome)?.function_def(function)?.clone();
        if fndef.calling_type == CallingType::Json && !args_was_object {
            return Err(RibosomeError::ArgError {
                position: 3,
                name: "args".into(),
                expected: "object".into(),
                got: "string".into(),
            }
            .into());
        }
        if target_zome == current_zome {
            // same isolate: evaluate directly instead of round-tripping
            // through our own busy actor
            let code = call_code(&fndef.name, fndef.calling_type, &args);
            let v = eval.eval(&code)?;
            let result = parse_call_result(fndef.calling_type, v)?;
            Ok(Value::String(result))
        } else {
            let handle = self.ribosome(target_zome)?;
            let result = handle.call_blocking(fndef.name.clone(), fndef.calling_type, args)?;
            Ok(Value::String(result))
        }
    }
}
