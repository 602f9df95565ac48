//! Typed actions behind the script-visible host functions
//!
//! Every host function maps to one `ZomeAction` variant; `parse` checks the
//! argument count against the function's spec table, coerces each value, and
//! builds the action. Chain- and DHT-touching variants are executed by the
//! node through `HostApi`.

use crate::args::{check_arg_count, coerce, opt_bool, opt_int, ArgSpec, ArgType, CoreValue};
use crate::error::RibosomeError;
use mycel_model::{EntryStatus, Hash, PeerId};
use serde_json::Value;

/// GetMask bits; `Default` resolves to `Entry`
pub const GET_MASK_DEFAULT: u32 = 0;
pub const GET_MASK_ENTRY: u32 = 1;
pub const GET_MASK_ENTRY_TYPE: u32 = 2;
pub const GET_MASK_SOURCES: u32 = 4;
pub const GET_MASK_ALL: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct GetOptions {
    pub status_mask: u32,
    pub get_mask: u32,
    pub local: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self { status_mask: EntryStatus::LIVE, get_mask: GET_MASK_DEFAULT, local: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetLinkOptions {
    pub load: bool,
    pub status_mask: u32,
}

impl Default for GetLinkOptions {
    fn default() -> Self {
        Self { load: false, status_mask: EntryStatus::LIVE }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZomeAction {
    Property { name: String },
    Debug { msg: String },
    MakeHash { entry: String },
    Commit { entry_type: String, entry: String, entry_was_object: bool },
    Get { hash: Hash, options: GetOptions },
    Mod { entry_type: String, entry: String, entry_was_object: bool, replaces: Hash },
    Del { hash: Hash, message: String },
    GetLink { base: Hash, tag: String, options: GetLinkOptions },
    Send { to: PeerId, body: String },
    Call { zome: String, function: String, args: String, args_was_object: bool },
}

const PROPERTY_ARGS: &[ArgSpec] = &[ArgSpec::required("name", ArgType::String)];
const DEBUG_ARGS: &[ArgSpec] = &[ArgSpec::required("value", ArgType::ToStr)];
const MAKE_HASH_ARGS: &[ArgSpec] = &[ArgSpec::required("entry", ArgType::Entry)];
const COMMIT_ARGS: &[ArgSpec] = &[
    ArgSpec::required("entryType", ArgType::String),
    ArgSpec::required("entry", ArgType::Entry),
];
const GET_ARGS: &[ArgSpec] = &[
    ArgSpec::required("hash", ArgType::Hash),
    ArgSpec::optional("options", ArgType::Map),
];
const MOD_ARGS: &[ArgSpec] = &[
    ArgSpec::required("entryType", ArgType::String),
    ArgSpec::required("entry", ArgType::Entry),
    ArgSpec::required("replaces", ArgType::Hash),
];
const DEL_ARGS: &[ArgSpec] = &[
    ArgSpec::required("hash", ArgType::Hash),
    ArgSpec::required("message", ArgType::String),
];
const GET_LINK_ARGS: &[ArgSpec] = &[
    ArgSpec::required("base", ArgType::Hash),
    ArgSpec::required("tag", ArgType::String),
    ArgSpec::optional("options", ArgType::Map),
];
const SEND_ARGS: &[ArgSpec] = &[
    ArgSpec::required("to", ArgType::String),
    ArgSpec::required("message", ArgType::Map),
];
const CALL_ARGS: &[ArgSpec] = &[
    ArgSpec::required("zome", ArgType::String),
    ArgSpec::required("function", ArgType::String),
    ArgSpec::required("args", ArgType::Args),
];

fn coerce_all(specs: &[ArgSpec], raw: &[Value]) -> Result<Vec<CoreValue>, RibosomeError> {
    check_arg_count(specs, raw.len())?;
    raw.iter()
        .enumerate()
        .map(|(i, v)| coerce(&specs[i], i + 1, v))
        .collect()
}

fn take_str(v: CoreValue) -> String {
    v.into_string()
}

fn take_hash(v: CoreValue) -> Hash {
    match v {
        CoreValue::Hash(h) => h,
        other => Hash::parse(&other.into_string()).unwrap_or(Hash::NULL),
    }
}

/// Parse a host-function invocation into a typed action
pub fn parse(name: &str, raw: &[Value]) -> Result<ZomeAction, RibosomeError> {
    match name {
        "property" => {
            let mut vals = coerce_all(PROPERTY_ARGS, raw)?;
            Ok(ZomeAction::Property { name: take_str(vals.remove(0)) })
        }
        "debug" => {
            let mut vals = coerce_all(DEBUG_ARGS, raw)?;
            Ok(ZomeAction::Debug { msg: take_str(vals.remove(0)) })
        }
        "makeHash" => {
            let mut vals = coerce_all(MAKE_HASH_ARGS, raw)?;
            Ok(ZomeAction::MakeHash { entry: take_str(vals.remove(0)) })
        }
        "commit" => {
            let mut vals = coerce_all(COMMIT_ARGS, raw)?;
            let entry_type = take_str(vals.remove(0));
            let entry = take_str(vals.remove(0));
            Ok(ZomeAction::Commit {
                entry_type,
                entry,
                entry_was_object: raw[1].is_object() || raw[1].is_array(),
            })
        }
        "get" => {
            let mut vals = coerce_all(GET_ARGS, raw)?;
            let hash = take_hash(vals.remove(0));
            let options = match vals.pop() {
                Some(CoreValue::Map(m)) => get_options(&m)?,
                _ => GetOptions::default(),
            };
            Ok(ZomeAction::Get { hash, options })
        }
        "update" => {
            let mut vals = coerce_all(MOD_ARGS, raw)?;
            let entry_type = take_str(vals.remove(0));
            let entry = take_str(vals.remove(0));
            let replaces = take_hash(vals.remove(0));
            Ok(ZomeAction::Mod {
                entry_type,
                entry,
                entry_was_object: raw[1].is_object() || raw[1].is_array(),
                replaces,
            })
        }
        "remove" => {
            let mut vals = coerce_all(DEL_ARGS, raw)?;
            let hash = take_hash(vals.remove(0));
            let message = take_str(vals.remove(0));
            Ok(ZomeAction::Del { hash, message })
        }
        "getLink" => {
            let mut vals = coerce_all(GET_LINK_ARGS, raw)?;
            let base = take_hash(vals.remove(0));
            let tag = take_str(vals.remove(0));
            let options = match vals.pop() {
                Some(CoreValue::Map(m)) => get_link_options(&m)?,
                _ => GetLinkOptions::default(),
            };
            Ok(ZomeAction::GetLink { base, tag, options })
        }
        "send" => {
            let mut vals = coerce_all(SEND_ARGS, raw)?;
            let to = PeerId::parse(&take_str(vals.remove(0)))?;
            let body = match vals.remove(0) {
                CoreValue::Map(m) => Value::Object(m).to_string(),
                other => other.into_string(),
            };
            Ok(ZomeAction::Send { to, body })
        }
        "call" => {
            let mut vals = coerce_all(CALL_ARGS, raw)?;
            let zome = take_str(vals.remove(0));
            let function = take_str(vals.remove(0));
            let args = take_str(vals.remove(0));
            Ok(ZomeAction::Call {
                zome,
                function,
                args,
                args_was_object: raw[2].is_object(),
            })
        }
        other => Err(RibosomeError::UnknownFunction(other.to_string())),
    }
}

fn get_options(m: &serde_json::Map<String, Value>) -> Result<GetOptions, RibosomeError> {
    let mut options = GetOptions::default();
    if let Some(mask) = opt_int(m, "StatusMask")? {
        options.status_mask = mask as u32;
    }
    if let Some(mask) = opt_int(m, "GetMask")? {
        options.get_mask = mask as u32;
    }
    if let Some(local) = opt_bool(m, "Local")? {
        options.local = local;
    }
    Ok(options)
}

fn get_link_options(m: &serde_json::Map<String, Value>) -> Result<GetLinkOptions, RibosomeError> {
    let mut options = GetLinkOptions::default();
    if let Some(load) = opt_bool(m, "Load")? {
        options.load = load;
    }
    if let Some(mask) = opt_int(m, "StatusMask")? {
        options.status_mask = mask as u32;
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycel_model::HashType;
    use serde_json::json;

    fn hash() -> Hash {
        Hash::with(HashType::Sha2_256, b"some entry")
    }

    #[test]
    fn test_parse_commit() {
        let a = parse("commit", &[json!("post"), json!("hello")]).unwrap();
        assert_eq!(
            a,
            ZomeAction::Commit {
                entry_type: "post".into(),
                entry: "hello".into(),
                entry_was_object: false
            }
        );
    }

    #[test]
    fn test_parse_commit_object_entry() {
        let a = parse("commit", &[json!("profile"), json!({"name": "ada"})]).unwrap();
        match a {
            ZomeAction::Commit { entry, entry_was_object, .. } => {
                assert_eq!(entry, r#"{"name":"ada"}"#);
                assert!(entry_was_object);
            }
            other => panic!("wrong action: {:?}", other),
        }
    }

    #[test]
    fn test_parse_commit_wrong_count() {
        assert!(matches!(
            parse("commit", &[json!("post")]),
            Err(RibosomeError::ArgCount { .. })
        ));
    }

    #[test]
    fn test_parse_get_with_options() {
        let h = hash();
        let a = parse(
            "get",
            &[json!(h.to_string()), json!({"GetMask": 7.0, "StatusMask": 255, "Local": true})],
        )
        .unwrap();
        assert_eq!(
            a,
            ZomeAction::Get {
                hash: h,
                options: GetOptions { status_mask: 255, get_mask: GET_MASK_ALL, local: true }
            }
        );
    }

    #[test]
    fn test_parse_get_defaults() {
        let h = hash();
        let a = parse("get", &[json!(h.to_string())]).unwrap();
        assert_eq!(a, ZomeAction::Get { hash: h, options: GetOptions::default() });
    }

    #[test]
    fn test_parse_get_bad_mask_type() {
        let h = hash();
        assert!(parse("get", &[json!(h.to_string()), json!({"GetMask": "entry"})]).is_err());
    }

    #[test]
    fn test_parse_get_link_options() {
        let h = hash();
        let a = parse("getLink", &[json!(h.to_string()), json!("follows"), json!({"Load": true})])
            .unwrap();
        assert_eq!(
            a,
            ZomeAction::GetLink {
                base: h,
                tag: "follows".into(),
                options: GetLinkOptions { load: true, status_mask: EntryStatus::LIVE }
            }
        );
    }

    #[test]
    fn test_parse_call_tracks_object_arg() {
        let a = parse("call", &[json!("posts"), json!("addPost"), json!({"t": 1})]).unwrap();
        match a {
            ZomeAction::Call { args, args_was_object, .. } => {
                assert_eq!(args, r#"{"t":1}"#);
                assert!(args_was_object);
            }
            other => panic!("wrong action: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_function() {
        assert!(matches!(
            parse("teleport", &[]),
            Err(RibosomeError::UnknownFunction(_))
        ));
    }
}
