//! End-to-end tests: zome code running in the sandbox, committing through
//! validation, and replicating between nodes over the in-memory transport.

use mycel_dht::MemoryNetwork;
use mycel_model::{
    CallingType, DataFormat, Dna, EntryDef, EntryStatus, FunctionDef, Hash, PeerId, Sharing,
    ZomeDef,
};
use mycel_node::{Node, NodeConfig, NodeError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const BASE_ZOME: &str = r#"
function genesis() { return true; }
function validateCommit(entryType, entry, header, pkg, sources) { return entry !== "bad"; }
function validatePut(entryType, entry, header, pkg, sources) { return entry !== "bad"; }
function validateMod(entryType, entry, header, replaces, pkg, sources) { return true; }
function validateDel(entryType, hash, pkg, sources) { return true; }
function validateLink(entryType, base, links, pkg, sources) { return true; }

function doCommit(content) { return commit("post", content); }
function doCommitObj() { return commit("post", {sneaky: true}); }
function addPost(arg) { return commit("post", arg.content); }
function readPost(hash) { return get(hash); }
function hashOf(content) { return makeHash(content); }
function langProperty() { return property("lang"); }
function ping(to) { return send(to, {ping: "hi"}); }
function receive(from, msg) { return {echo: msg.ping, from: from}; }
"#;

fn dna(code: &str) -> Dna {
    Dna {
        name: "testapp".into(),
        hash_type: Default::default(),
        required_version: String::new(),
        properties: BTreeMap::from([("lang".to_string(), "en".to_string())]),
        zomes: vec![ZomeDef {
            name: "main".into(),
            code: code.to_string(),
            entries: vec![
                EntryDef {
                    name: "post".into(),
                    data_format: DataFormat::String,
                    sharing: Sharing::Public,
                },
                EntryDef {
                    name: "profile".into(),
                    data_format: DataFormat::Json,
                    sharing: Sharing::Public,
                },
            ],
            functions: vec![
                FunctionDef {
                    name: "doCommit".into(),
                    calling_type: CallingType::String,
                    exposure: "public".into(),
                },
                FunctionDef {
                    name: "doCommitObj".into(),
                    calling_type: CallingType::String,
                    exposure: "public".into(),
                },
                FunctionDef {
                    name: "addPost".into(),
                    calling_type: CallingType::Json,
                    exposure: "public".into(),
                },
                FunctionDef {
                    name: "readPost".into(),
                    calling_type: CallingType::String,
                    exposure: "public".into(),
                },
                FunctionDef {
                    name: "hashOf".into(),
                    calling_type: CallingType::String,
                    exposure: "public".into(),
                },
                FunctionDef {
                    name: "langProperty".into(),
                    calling_type: CallingType::String,
                    exposure: "public".into(),
                },
                FunctionDef {
                    name: "ping".into(),
                    calling_type: CallingType::String,
                    exposure: "public".into(),
                },
            ],
        }],
    }
}

async fn build_node(net: &MemoryNetwork, code: &str, agent: &str) -> Result<Node, NodeError> {
    let id = PeerId::random();
    let (transport, rx) = net.register(id).await;
    // long interval: these tests drive gossip explicitly
    let config = NodeConfig {
        gossip_interval: Duration::from_secs(60),
        send_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    Node::new(id, dna(code), agent, config, Arc::new(transport), rx).await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commit_runs_validation_and_logs_change() {
    let _ = tracing_subscriber::fmt::try_init();
    let net = MemoryNetwork::new();
    let node = build_node(&net, BASE_ZOME, "alice").await.unwrap();

    let hash_str = node.call("main", "doCommit", "hello world").await.unwrap();
    let hash = Hash::parse(&hash_str).unwrap();

    // chained: chain holds the entry, DHT holds it live, change log advanced
    assert_eq!(node.chain().entry(&hash).unwrap().as_deref(), Some("hello world"));
    let held = node.dht().get_entry(&hash, EntryStatus::LIVE).unwrap().unwrap();
    assert_eq!(held.content, "hello world");
    assert_eq!(held.entry_type, "post");
    assert_eq!(node.log().current_idx().unwrap(), 1);

    // reading back through the host surface
    let read = node.call("main", "readPost", &hash_str).await.unwrap();
    assert_eq!(read, "hello world");

    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_validation_veto_surfaces_invalid_entry() {
    let net = MemoryNetwork::new();
    let veto = BASE_ZOME.replace(
        "function validateCommit(entryType, entry, header, pkg, sources) { return entry !== \"bad\"; }",
        "function validateCommit(entryType, entry, header, pkg, sources) { return false; }",
    );
    let node = build_node(&net, &veto, "alice").await.unwrap();

    let err = node.call("main", "doCommit", "hello").await.unwrap_err();
    let text = err.to_string();
    assert!(text.contains("Invalid entry: hello"), "unexpected error: {}", text);

    // the veto left no trace
    assert_eq!(node.log().current_idx().unwrap(), 0);
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commit_object_for_string_entry_is_arg_error() {
    let net = MemoryNetwork::new();
    let node = build_node(&net, BASE_ZOME, "alice").await.unwrap();

    let err = node.call("main", "doCommitObj", "").await.unwrap_err();
    let text = err.to_string();
    assert!(
        text.contains("argument 2 (entry) should be string"),
        "unexpected error: {}",
        text
    );
    assert_eq!(node.log().current_idx().unwrap(), 0);
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_genesis_false_is_fatal() {
    let net = MemoryNetwork::new();
    let bad = BASE_ZOME.replace(
        "function genesis() { return true; }",
        "function genesis() { return false; }",
    );
    let err = build_node(&net, &bad, "alice").await.unwrap_err();
    assert!(matches!(err, NodeError::Genesis { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_genesis_can_commit() {
    let net = MemoryNetwork::new();
    let committing = BASE_ZOME.replace(
        "function genesis() { return true; }",
        r#"function genesis() { commit("post", "first"); return true; }"#,
    );
    let node = build_node(&net, &committing, "alice").await.unwrap();
    assert_eq!(node.log().current_idx().unwrap(), 1);
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_calling_parses_and_stringifies() {
    let net = MemoryNetwork::new();
    let node = build_node(&net, BASE_ZOME, "alice").await.unwrap();

    let result = node.call("main", "addPost", r#"{"content":"json post"}"#).await.unwrap();
    // addPost returns the hash, stringified by the JSON calling convention
    let hash_str: String = serde_json::from_str(&result).unwrap();
    let hash = Hash::parse(&hash_str).unwrap();
    assert_eq!(node.chain().entry(&hash).unwrap().as_deref(), Some("json post"));
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_property_and_make_hash() {
    let net = MemoryNetwork::new();
    let node = build_node(&net, BASE_ZOME, "alice").await.unwrap();

    assert_eq!(node.call("main", "langProperty", "").await.unwrap(), "en");

    let h = node.call("main", "hashOf", "some content").await.unwrap();
    let expected = Hash::with(Default::default(), b"some content");
    assert_eq!(h, expected.to_string());
    // pure hashing, nothing logged
    assert_eq!(node.log().current_idx().unwrap(), 0);
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_reaches_remote_receive_hook() {
    let _ = tracing_subscriber::fmt::try_init();
    let net = MemoryNetwork::new();
    let a = build_node(&net, BASE_ZOME, "alice").await.unwrap();
    let b = build_node(&net, BASE_ZOME, "bob").await.unwrap();

    let reply = a.call("main", "ping", &b.id().to_string()).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["echo"], "hi");
    assert_eq!(parsed["from"], a.id().to_string());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_nodes_replicate_validated_entries() {
    let _ = tracing_subscriber::fmt::try_init();
    let net = MemoryNetwork::new();
    let a = build_node(&net, BASE_ZOME, "alice").await.unwrap();
    let b = build_node(&net, BASE_ZOME, "bob").await.unwrap();

    let mut hashes = Vec::new();
    for content in ["one", "two", "three"] {
        let h = a.call("main", "doCommit", content).await.unwrap();
        hashes.push(Hash::parse(&h).unwrap());
    }
    assert_eq!(a.log().current_idx().unwrap(), 3);

    b.add_peer(a.id()).unwrap();
    b.engine().unwrap().gossip_with(a.id()).await.unwrap();

    assert_eq!(b.log().current_idx().unwrap(), 3);
    assert_eq!(b.cursors().cursor(&a.id()).unwrap(), 3);
    for (hash, content) in hashes.iter().zip(["one", "two", "three"]) {
        let held = b.dht().get_entry(hash, EntryStatus::LIVE).unwrap().unwrap();
        assert_eq!(held.content, content);
    }

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_put_rejected_by_validation_is_not_stored() {
    let _ = tracing_subscriber::fmt::try_init();
    let net = MemoryNetwork::new();
    // "bad" passes commit validation on a but fails put validation on b
    let loose = BASE_ZOME.replace(
        "function validateCommit(entryType, entry, header, pkg, sources) { return entry !== \"bad\"; }",
        "function validateCommit(entryType, entry, header, pkg, sources) { return true; }",
    );
    let a = build_node(&net, &loose, "alice").await.unwrap();
    let b = build_node(&net, BASE_ZOME, "bob").await.unwrap();

    let good = a.call("main", "doCommit", "fine").await.unwrap();
    let bad = a.call("main", "doCommit", "bad").await.unwrap();
    let good = Hash::parse(&good).unwrap();
    let bad = Hash::parse(&bad).unwrap();

    b.add_peer(a.id()).unwrap();
    b.engine().unwrap().gossip_with(a.id()).await.unwrap();

    // the rejected put was skipped, the good one landed, and the cursor
    // still advanced past both
    assert!(b.dht().get_entry(&good, EntryStatus::LIVE).unwrap().is_some());
    assert!(b.dht().get_entry(&bad, EntryStatus::ANY).unwrap().is_none());
    assert_eq!(b.cursors().cursor(&a.id()).unwrap(), 2);

    a.shutdown().await;
    b.shutdown().await;
}
