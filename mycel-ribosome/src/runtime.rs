//! The sandboxed execution environment for one zome
//!
//! Each zome gets its own v8 isolate (deno_core `JsRuntime`). The isolate is
//! not Send, so it lives on a dedicated actor thread that serves commands
//! over a channel; `RibosomeHandle` is the cloneable, thread-safe face of it.
//!
//! Host functions reach Rust through a single reentrant op: the op parses
//! and coerces arguments, then dispatches with a scope-backed `ScriptEval`
//! so validation hooks can run inside the same isolate mid-action. Errors
//! come back to scripts as `{name: "HolochainError", message}` values.

use crate::dispatch::dispatch;
use crate::error::RibosomeError;
use crate::host::{AppIdentity, HostApi, ScriptEval};
use crate::sanitize::js_sanitize;
use crate::{actions, validate};
use deno_core::error::AnyError;
use deno_core::{op2, v8, JsRuntime, OpState, RuntimeOptions};
use mycel_model::{CallingType, ZomeDef};
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};

/// Per-isolate state reachable from ops
#[derive(Clone)]
pub struct HostBinding {
    pub host: Arc<dyn HostApi>,
    pub zome: String,
}

deno_core::extension!(
    mycel_host,
    ops = [op_zome_invoke],
    options = { binding: HostBinding },
    state = move |state, options| {
        state.put::<HostBinding>(options.binding);
    },
);

#[op2(reentrant)]
#[serde]
fn op_zome_invoke(
    scope: &mut v8::HandleScope,
    state: &mut OpState,
    #[string] name: String,
    #[serde] args: Vec<serde_json::Value>,
) -> Result<serde_json::Value, AnyError> {
    let binding = state.borrow::<HostBinding>().clone();
    tracing::trace!(zome = %binding.zome, function = %name, "host call");
    let action = actions::parse(&name, &args).map_err(AnyError::from)?;
    let mut eval = ScopeEval { scope };
    dispatch(binding.host.as_ref(), &binding.zome, action, &mut eval).map_err(AnyError::from)
}

/// `ScriptEval` over the scope of an executing op
pub struct ScopeEval<'a, 's> {
    pub scope: &'a mut v8::HandleScope<'s>,
}

impl ScriptEval for ScopeEval<'_, '_> {
    fn eval(&mut self, code: &str) -> Result<Value, RibosomeError> {
        let scope = &mut v8::TryCatch::new(&mut *self.scope);
        let Some(source) = v8::String::new(scope, code) else {
            return Err(RibosomeError::Js("source string allocation failed".into()));
        };
        let compiled = v8::Script::compile(scope, source, None);
        let result = compiled.and_then(|script| script.run(scope));
        match result {
            Some(value) => {
                if value.is_undefined() {
                    return Ok(Value::Null);
                }
                deno_core::serde_v8::from_v8(scope, value)
                    .map_err(|e| RibosomeError::Js(e.to_string()))
            }
            None => {
                let message = scope
                    .exception()
                    .map(|e| e.to_rust_string_lossy(scope))
                    .unwrap_or_else(|| "unknown JS exception".to_string());
                Err(RibosomeError::Js(message))
            }
        }
    }
}

enum Cmd {
    Eval {
        code: String,
        reply: oneshot::Sender<Result<Value, RibosomeError>>,
    },
    Genesis {
        reply: oneshot::Sender<Result<(), RibosomeError>>,
    },
    Receive {
        from: String,
        body: String,
        reply: oneshot::Sender<Result<String, RibosomeError>>,
    },
    Call {
        function: String,
        calling: CallingType,
        args: String,
        reply: oneshot::Sender<Result<String, RibosomeError>>,
    },
    Shutdown,
}

/// Cloneable handle to a zome's isolate thread
#[derive(Clone)]
pub struct RibosomeHandle {
    tx: mpsc::Sender<Cmd>,
    zome: String,
}

impl RibosomeHandle {
    pub fn zome(&self) -> &str {
        &self.zome
    }

    /// Evaluate generated code (validation calls, mostly) on the isolate
    pub async fn eval(&self, code: String) -> Result<Value, RibosomeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Cmd::Eval { code, reply })
            .await
            .map_err(|_| RibosomeError::Stopped)?;
        rx.await.map_err(|_| RibosomeError::Stopped)?
    }

    /// Blocking variant, for callers already on another isolate's thread
    pub fn eval_blocking(&self, code: String) -> Result<Value, RibosomeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(Cmd::Eval { code, reply })
            .map_err(|_| RibosomeError::Stopped)?;
        rx.blocking_recv().map_err(|_| RibosomeError::Stopped)?
    }

    /// Run the `genesis()` hook; false or a non-boolean is fatal
    pub async fn genesis(&self) -> Result<(), RibosomeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Cmd::Genesis { reply })
            .await
            .map_err(|_| RibosomeError::Stopped)?;
        rx.await.map_err(|_| RibosomeError::Stopped)?
    }

    /// Run the `receive(from, body)` hook for a node-to-node message
    pub async fn receive(&self, from: String, body: String) -> Result<String, RibosomeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Cmd::Receive { from, body, reply })
            .await
            .map_err(|_| RibosomeError::Stopped)?;
        rx.await.map_err(|_| RibosomeError::Stopped)?
    }

    /// Call an exposed zome function per its calling type
    pub async fn call(
        &self,
        function: String,
        calling: CallingType,
        args: String,
    ) -> Result<String, RibosomeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Cmd::Call { function, calling, args, reply })
            .await
            .map_err(|_| RibosomeError::Stopped)?;
        rx.await.map_err(|_| RibosomeError::Stopped)?
    }

    /// Blocking variant used by cross-zome `call` dispatch
    pub fn call_blocking(
        &self,
        function: String,
        calling: CallingType,
        args: String,
    ) -> Result<String, RibosomeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(Cmd::Call { function, calling, args, reply })
            .map_err(|_| RibosomeError::Stopped)?;
        rx.blocking_recv().map_err(|_| RibosomeError::Stopped)?
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Cmd::Shutdown).await;
    }
}

/// Spawn the isolate thread for a zome and run its code.
///
/// Resolves once the prelude and zome code have executed; initialization
/// failures (syntax errors, a throwing top level) surface here.
pub async fn spawn_ribosome(
    zome: ZomeDef,
    app: AppIdentity,
    host: Arc<dyn HostApi>,
) -> Result<(RibosomeHandle, thread::JoinHandle<()>), RibosomeError> {
    let (tx, rx) = mpsc::channel(16);
    let (init_tx, init_rx) = oneshot::channel();
    let name = zome.name.clone();
    let join = thread::Builder::new()
        .name(format!("ribosome-{}", name))
        .spawn(move || actor_main(zome, app, host, rx, init_tx))
        .map_err(|e| RibosomeError::Init(e.to_string()))?;
    init_rx.await.map_err(|_| RibosomeError::Stopped)??;
    Ok((RibosomeHandle { tx, zome: name }, join))
}

fn actor_main(
    zome: ZomeDef,
    app: AppIdentity,
    host: Arc<dyn HostApi>,
    mut rx: mpsc::Receiver<Cmd>,
    init_tx: oneshot::Sender<Result<(), RibosomeError>>,
) {
    let mut runtime = match build_runtime(&zome, &app, host) {
        Ok(rt) => rt,
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };
    if init_tx.send(Ok(())).is_err() {
        return;
    }
    tracing::debug!(zome = %zome.name, "ribosome ready");

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            Cmd::Eval { code, reply } => {
                let _ = reply.send(eval_in_runtime(&mut runtime, &code));
            }
            Cmd::Genesis { reply } => {
                let _ = reply.send(run_genesis(&mut runtime));
            }
            Cmd::Receive { from, body, reply } => {
                let _ = reply.send(run_receive(&mut runtime, &from, &body));
            }
            Cmd::Call { function, calling, args, reply } => {
                let _ = reply.send(run_call(&mut runtime, &function, calling, &args));
            }
            Cmd::Shutdown => break,
        }
    }
    tracing::debug!(zome = %zome.name, "ribosome stopped");
}

fn build_runtime(
    zome: &ZomeDef,
    app: &AppIdentity,
    host: Arc<dyn HostApi>,
) -> Result<JsRuntime, RibosomeError> {
    let binding = HostBinding { host, zome: zome.name.clone() };
    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![mycel_host::init_ops(binding)],
        ..Default::default()
    });

    let prelude = build_prelude(app);
    eval_in_runtime(&mut runtime, &prelude).map_err(|e| RibosomeError::Init(e.to_string()))?;
    eval_in_runtime(&mut runtime, &zome.code).map_err(|e| RibosomeError::Init(e.to_string()))?;
    Ok(runtime)
}

fn eval_in_runtime(runtime: &mut JsRuntime, code: &str) -> Result<Value, RibosomeError> {
    let source: deno_core::FastString = code.to_string().into();
    let global = runtime
        .execute_script("mycel", source)
        .map_err(|e| RibosomeError::Js(e.to_string()))?;
    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, global);
    if local.is_undefined() {
        return Ok(Value::Null);
    }
    deno_core::serde_v8::from_v8(scope, local).map_err(|e| RibosomeError::Js(e.to_string()))
}

fn run_genesis(runtime: &mut JsRuntime) -> Result<(), RibosomeError> {
    let v = eval_in_runtime(runtime, "genesis()")?;
    match v {
        Value::Bool(true) => Ok(()),
        Value::Bool(false) => Err(RibosomeError::GenesisFailed),
        other => Err(RibosomeError::InvalidResult {
            function: "genesis".into(),
            got: other.to_string(),
        }),
    }
}

fn run_receive(runtime: &mut JsRuntime, from: &str, body: &str) -> Result<String, RibosomeError> {
    let code = format!(
        r#"JSON.stringify(receive("{}",JSON.parse("{}")))"#,
        js_sanitize(from),
        js_sanitize(body),
    );
    let v = eval_in_runtime(runtime, &code)?;
    match v {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

fn run_call(
    runtime: &mut JsRuntime,
    function: &str,
    calling: CallingType,
    args: &str,
) -> Result<String, RibosomeError> {
    let code = call_code(function, calling, args);
    tracing::debug!(%function, "zome call: {}", code);
    let v = eval_in_runtime(runtime, &code)?;
    parse_call_result(calling, v)
}

/// Generate the invocation of an exposed zome function per its calling type
pub fn call_code(function: &str, calling: CallingType, args: &str) -> String {
    match calling {
        CallingType::String => format!(r#"{}("{}");"#, function, js_sanitize(args)),
        CallingType::Json => {
            if args.is_empty() {
                format!("JSON.stringify({}());", function)
            } else {
                format!(r#"JSON.stringify({}(JSON.parse("{}")));"#, function, js_sanitize(args))
            }
        }
    }
}

/// Interpret what a zome function call evaluated to, surfacing returned
/// `HolochainError` values as errors
pub fn parse_call_result(calling: CallingType, v: Value) -> Result<String, RibosomeError> {
    match calling {
        CallingType::Json => {
            let s = match v {
                Value::String(s) => s,
                Value::Null => return Ok(String::new()),
                other => other.to_string(),
            };
            if let Ok(parsed) = serde_json::from_str::<Value>(&s) {
                if let Some(message) = holochain_error(&parsed) {
                    return Err(RibosomeError::Js(message));
                }
            }
            Ok(s)
        }
        CallingType::String => {
            if let Some(message) = holochain_error(&v) {
                return Err(RibosomeError::Js(message));
            }
            match v {
                Value::String(s) => Ok(s),
                Value::Null => Ok(String::new()),
                other => Ok(other.to_string()),
            }
        }
    }
}

/// Recognize the tagged error value host functions hand back to scripts
pub fn holochain_error(v: &Value) -> Option<String> {
    let obj = v.as_object()?;
    if obj.get("name")?.as_str()? != "HolochainError" {
        return None;
    }
    Some(
        obj.get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    )
}

/// Validation helper for async callers (the gossip apply path): evaluate the
/// generated call on the zome's isolate and enforce the boolean contract.
pub async fn run_validation(
    handle: &RibosomeHandle,
    code: String,
    fn_name: &str,
) -> Result<(), RibosomeError> {
    let v = handle.eval(code).await?;
    validate::check_validation_result(fn_name, &v)
}

const HOST_FNS: &str = r#"
function __mycel_invoke(name, args) {
  try {
    return Deno.core.ops.op_zome_invoke(name, args);
  } catch (e) {
    return { name: "HolochainError", message: "" + ((e && e.message) ? e.message : e) };
  }
}
function property() { return __mycel_invoke("property", Array.prototype.slice.call(arguments)); }
function debug() { __mycel_invoke("debug", Array.prototype.slice.call(arguments)); }
function makeHash() { return __mycel_invoke("makeHash", Array.prototype.slice.call(arguments)); }
function commit() { return __mycel_invoke("commit", Array.prototype.slice.call(arguments)); }
function get() { return __mycel_invoke("get", Array.prototype.slice.call(arguments)); }
function update() { return __mycel_invoke("update", Array.prototype.slice.call(arguments)); }
function remove() { return __mycel_invoke("remove", Array.prototype.slice.call(arguments)); }
function getLink() { return __mycel_invoke("getLink", Array.prototype.slice.call(arguments)); }
function send() { return __mycel_invoke("send", Array.prototype.slice.call(arguments)); }
function call() { return __mycel_invoke("call", Array.prototype.slice.call(arguments)); }
"#;

fn build_prelude(app: &AppIdentity) -> String {
    use mycel_model::EntryStatus;
    let globals = format!(
        concat!(
            "var HC={{Version:\"{version}\",",
            "Status:{{Live:{live},Rejected:{rejected},Deleted:{deleted},Modified:{modified},Any:{any}}},",
            "GetMask:{{Default:{gm_default},Entry:{gm_entry},EntryType:{gm_type},Sources:{gm_sources},All:{gm_all}}},",
            "LinkAction:{{Add:\"\",Del:\"d\"}},",
            "PkgReq:{{Chain:\"chain\",ChainOpt:{{None:0,Headers:1,Entries:2,Full:3}}}}}};",
            "var App={{Name:\"{name}\",DNA:{{Hash:\"{dna}\"}},",
            "Agent:{{Hash:\"{agent}\",String:\"{agent_str}\"}},",
            "Key:{{Hash:\"{key}\"}}}};",
        ),
        version = js_sanitize(mycel_model::VERSION),
        live = EntryStatus::LIVE,
        rejected = EntryStatus::REJECTED,
        deleted = EntryStatus::DELETED,
        modified = EntryStatus::MODIFIED,
        any = EntryStatus::ANY,
        gm_default = actions::GET_MASK_DEFAULT,
        gm_entry = actions::GET_MASK_ENTRY,
        gm_type = actions::GET_MASK_ENTRY_TYPE,
        gm_sources = actions::GET_MASK_SOURCES,
        gm_all = actions::GET_MASK_ALL,
        name = js_sanitize(&app.name),
        dna = js_sanitize(&app.dna_hash),
        agent = js_sanitize(&app.agent_hash),
        agent_str = js_sanitize(&app.agent_str),
        key = js_sanitize(&app.key_hash),
    );
    format!("{}\n{}", globals, HOST_FNS)
}
