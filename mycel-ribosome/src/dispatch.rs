//! Action execution: typed actions → host calls → script values
//!
//! Result shaping lives here too: `get` collapses to a single value when
//! exactly one mask bit was requested, otherwise returns an object carrying
//! only the requested fields.

use crate::actions::{
    ZomeAction, GET_MASK_DEFAULT, GET_MASK_ENTRY, GET_MASK_ENTRY_TYPE, GET_MASK_SOURCES,
};
use crate::host::{HostApi, HostError, ScriptEval};
use serde_json::{json, Value};

pub fn dispatch(
    host: &dyn HostApi,
    zome: &str,
    action: ZomeAction,
    eval: &mut dyn ScriptEval,
) -> Result<Value, HostError> {
    match action {
        ZomeAction::Property { name } => {
            // a missing property reads as undefined, not an error
            Ok(host.property(&name).map(Value::String).unwrap_or(Value::Null))
        }
        ZomeAction::Debug { msg } => {
            host.debug(zome, &msg);
            Ok(Value::Null)
        }
        ZomeAction::MakeHash { entry } => {
            Ok(Value::String(host.make_hash(&entry)?.to_string()))
        }
        ZomeAction::Commit { entry_type, entry, entry_was_object } => {
            let hash = host.commit(zome, &entry_type, &entry, entry_was_object, eval)?;
            Ok(Value::String(hash.to_string()))
        }
        ZomeAction::Get { hash, options } => {
            let response = host.get(&hash, &options)?;
            let mask = if options.get_mask == GET_MASK_DEFAULT {
                GET_MASK_ENTRY
            } else {
                options.get_mask
            };
            let value = match mask {
                GET_MASK_ENTRY => response.entry,
                GET_MASK_ENTRY_TYPE => Value::String(response.entry_type),
                GET_MASK_SOURCES => json!(response.sources),
                _ => {
                    let mut obj = serde_json::Map::new();
                    if mask & GET_MASK_ENTRY != 0 {
                        obj.insert("Entry".into(), response.entry);
                    }
                    if mask & GET_MASK_ENTRY_TYPE != 0 {
                        obj.insert("EntryType".into(), Value::String(response.entry_type));
                    }
                    if mask & GET_MASK_SOURCES != 0 {
                        obj.insert("Sources".into(), json!(response.sources));
                    }
                    Value::Object(obj)
                }
            };
            Ok(value)
        }
        ZomeAction::Mod { entry_type, entry, entry_was_object, replaces } => {
            let hash = host.modify(zome, &entry_type, &entry, entry_was_object, &replaces, eval)?;
            Ok(Value::String(hash.to_string()))
        }
        ZomeAction::Del { hash, message } => {
            let hash = host.remove(zome, &hash, &message, eval)?;
            Ok(Value::String(hash.to_string()))
        }
        ZomeAction::GetLink { base, tag, options } => host.get_link(&base, &tag, &options),
        ZomeAction::Send { to, body } => host.send(zome, &to, body),
        ZomeAction::Call { zome: target, function, args, args_was_object } => {
            host.call(zome, &target, &function, args, args_was_object, eval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{GetOptions, GET_MASK_ALL};
    use crate::host::GetResponse;
    use mycel_model::{Hash, HashType, PeerId};

    /// HostApi double answering fixed values
    struct FixedHost;

    impl HostApi for FixedHost {
        fn property(&self, name: &str) -> Result<String, HostError> {
            if name == "lang" {
                Ok("en".into())
            } else {
                Err(HostError::NotFound(name.into()))
            }
        }
        fn debug(&self, _zome: &str, _msg: &str) {}
        fn make_hash(&self, entry: &str) -> Result<Hash, HostError> {
            Ok(Hash::with(HashType::Sha2_256, entry.as_bytes()))
        }
        fn commit(
            &self,
            _zome: &str,
            _entry_type: &str,
            entry: &str,
            _was_object: bool,
            _eval: &mut dyn ScriptEval,
        ) -> Result<Hash, HostError> {
            Ok(Hash::with(HashType::Sha2_256, entry.as_bytes()))
        }
        fn get(&self, _hash: &Hash, _options: &GetOptions) -> Result<GetResponse, HostError> {
            Ok(GetResponse {
                entry: Value::String("hello".into()),
                entry_type: "post".into(),
                sources: vec!["QmSrc".into()],
            })
        }
        fn modify(
            &self,
            _zome: &str,
            _entry_type: &str,
            entry: &str,
            _was_object: bool,
            _replaces: &Hash,
            _eval: &mut dyn ScriptEval,
        ) -> Result<Hash, HostError> {
            Ok(Hash::with(HashType::Sha2_256, entry.as_bytes()))
        }
        fn remove(
            &self,
            _zome: &str,
            hash: &Hash,
            _message: &str,
            _eval: &mut dyn ScriptEval,
        ) -> Result<Hash, HostError> {
            Ok(hash.clone())
        }
        fn get_link(
            &self,
            _base: &Hash,
            _tag: &str,
            _options: &crate::actions::GetLinkOptions,
        ) -> Result<Value, HostError> {
            Ok(json!({"Links": []}))
        }
        fn send(&self, _zome: &str, _to: &PeerId, body: String) -> Result<Value, HostError> {
            Ok(Value::String(body))
        }
        fn call(
            &self,
            _current: &str,
            _target: &str,
            _function: &str,
            args: String,
            _was_object: bool,
            _eval: &mut dyn ScriptEval,
        ) -> Result<Value, HostError> {
            Ok(Value::String(args))
        }
    }

    struct NoEval;
    impl ScriptEval for NoEval {
        fn eval(&mut self, _code: &str) -> Result<Value, crate::error::RibosomeError> {
            Ok(Value::Bool(true))
        }
    }

    fn get_action(mask: u32) -> ZomeAction {
        ZomeAction::Get {
            hash: Hash::with(HashType::Sha2_256, b"x"),
            options: GetOptions { get_mask: mask, ..Default::default() },
        }
    }

    #[test]
    fn test_get_single_bit_returns_single_value() {
        let mut eval = NoEval;
        let v = dispatch(&FixedHost, "z", get_action(GET_MASK_ENTRY), &mut eval).unwrap();
        assert_eq!(v, Value::String("hello".into()));
        let v = dispatch(&FixedHost, "z", get_action(GET_MASK_ENTRY_TYPE), &mut eval).unwrap();
        assert_eq!(v, Value::String("post".into()));
        let v = dispatch(&FixedHost, "z", get_action(GET_MASK_SOURCES), &mut eval).unwrap();
        assert_eq!(v, json!(["QmSrc"]));
    }

    #[test]
    fn test_get_default_mask_means_entry() {
        let mut eval = NoEval;
        let v = dispatch(&FixedHost, "z", get_action(GET_MASK_DEFAULT), &mut eval).unwrap();
        assert_eq!(v, Value::String("hello".into()));
    }

    #[test]
    fn test_get_multi_bit_returns_object() {
        let mut eval = NoEval;
        let v = dispatch(&FixedHost, "z", get_action(GET_MASK_ALL), &mut eval).unwrap();
        assert_eq!(
            v,
            json!({"Entry": "hello", "EntryType": "post", "Sources": ["QmSrc"]})
        );
        let v = dispatch(
            &FixedHost,
            "z",
            get_action(GET_MASK_ENTRY | GET_MASK_SOURCES),
            &mut eval,
        )
        .unwrap();
        assert_eq!(v, json!({"Entry": "hello", "Sources": ["QmSrc"]}));
    }

    #[test]
    fn test_property_miss_is_null() {
        let mut eval = NoEval;
        let v = dispatch(
            &FixedHost,
            "z",
            ZomeAction::Property { name: "missing".into() },
            &mut eval,
        )
        .unwrap();
        assert_eq!(v, Value::Null);
    }
}
