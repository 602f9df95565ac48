//! Validation gateway - asks zome code whether to accept a state change
//!
//! For every chain-touching action the gateway generates a call to the
//! zome's `validate<Action>` function, embedding the entry per its declared
//! data format, the header, the validation package, and the sources. The
//! result contract is strict: a boolean or nothing, where `false` means the
//! change is rejected.
//!
//! A pre-step (`validate<Action>Pkg`) lets the zome declare how much chain
//! context it needs; the node assembles the requested package before the
//! main call.

use crate::error::RibosomeError;
use crate::sanitize::js_sanitize;
use chrono::SecondsFormat;
use mycel_model::{DataFormat, Hash, Header};
use serde_json::Value;

/// How much of the local chain a validator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainOpt {
    #[default]
    None,
    Headers,
    Entries,
    Full,
}

impl ChainOpt {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(ChainOpt::None),
            1 => Some(ChainOpt::Headers),
            2 => Some(ChainOpt::Entries),
            3 => Some(ChainOpt::Full),
            _ => None,
        }
    }
}

/// Parsed `validate<Action>Pkg` result
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PackagingRequest {
    pub chain: ChainOpt,
}

/// Assembled package handed to the validator
#[derive(Debug, Clone, Default)]
pub struct ValidationPackage {
    pub chain: Option<Value>,
}

/// The chain-touching action being validated
#[derive(Debug, Clone)]
pub enum ValidateArgs<'a> {
    /// Commit and Put share the entry+header shape
    Entry { format: DataFormat, content: &'a str, header: Option<&'a Header> },
    Mod { format: DataFormat, content: &'a str, header: Option<&'a Header>, replaces: &'a Hash },
    Del { hash: &'a Hash },
    Link { base: &'a Hash, links_json: &'a str },
}

#[derive(Debug, Clone)]
pub struct ValidatingAction<'a> {
    /// Title-case action name: Commit, Put, Mod, Del, Link
    pub name: &'static str,
    pub def_name: &'a str,
    pub args: ValidateArgs<'a>,
}

/// Render an entry the way the validator expects to receive it
fn entry_arg(format: DataFormat, content: &str) -> Result<String, RibosomeError> {
    match format {
        DataFormat::RawScript => Ok(content.to_string()),
        DataFormat::String => Ok(format!("\"{}\"", js_sanitize(content))),
        DataFormat::Json | DataFormat::Links => {
            Ok(format!("JSON.parse(\"{}\")", js_sanitize(content)))
        }
    }
}

fn header_arg(header: Option<&Header>) -> String {
    match header {
        Some(h) => format!(
            r#"{{"EntryLink":"{}","Type":"{}","Time":"{}"}}"#,
            h.entry_link,
            h.entry_type,
            h.time.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        None => r#"{"EntryLink":"","Type":"","Time":""}"#.to_string(),
    }
}

fn sources_arg(sources: &[String]) -> String {
    let quoted: Vec<String> = sources.iter().map(|s| format!("\"{}\"", js_sanitize(s))).collect();
    format!("[{}]", quoted.join(","))
}

fn package_arg(pkg: Option<&ValidationPackage>) -> String {
    match pkg.and_then(|p| p.chain.as_ref()) {
        Some(chain) => format!(r#"{{"Chain":{}}}"#, chain),
        None => "{}".to_string(),
    }
}

/// Name of the validation hook for an action
pub fn validate_fn_name(action_name: &str) -> String {
    format!("validate{}", action_name)
}

/// Generate the `validate<Action>Pkg(defName)` call
pub fn packaging_code(action_name: &str, def_name: &str) -> String {
    format!("validate{}Pkg(\"{}\")", action_name, js_sanitize(def_name))
}

/// Generate the full `validate<Action>(...)` call
pub fn validation_code(
    action: &ValidatingAction,
    pkg: Option<&ValidationPackage>,
    sources: &[String],
) -> Result<String, RibosomeError> {
    let args = match &action.args {
        ValidateArgs::Entry { format, content, header } => {
            format!("{},{}", entry_arg(*format, content)?, header_arg(*header))
        }
        ValidateArgs::Mod { format, content, header, replaces } => format!(
            "{},{},\"{}\"",
            entry_arg(*format, content)?,
            header_arg(*header),
            replaces
        ),
        ValidateArgs::Del { hash } => format!("\"{}\"", hash),
        ValidateArgs::Link { base, links_json } => {
            format!("\"{}\",JSON.parse(\"{}\")", base, js_sanitize(links_json))
        }
    };
    Ok(format!(
        "{}(\"{}\",{},{},{})",
        validate_fn_name(action.name),
        js_sanitize(action.def_name),
        args,
        package_arg(pkg),
        sources_arg(sources),
    ))
}

/// Enforce the boolean contract on a validator's return value
pub fn check_validation_result(fn_name: &str, v: &Value) -> Result<(), RibosomeError> {
    match v {
        Value::Bool(true) => Ok(()),
        Value::Bool(false) => Err(RibosomeError::ValidationFailed),
        other => Err(RibosomeError::InvalidResult {
            function: fn_name.to_string(),
            got: other.to_string(),
        }),
    }
}

/// Interpret a `validate<Action>Pkg` result: null means no package needed,
/// an object may carry a `Chain` request.
pub fn parse_packaging_result(fn_name: &str, v: &Value) -> Result<Option<PackagingRequest>, RibosomeError> {
    match v {
        Value::Null => Ok(None),
        Value::Object(m) => {
            let chain = match m.get("Chain") {
                None => ChainOpt::None,
                Some(Value::Number(n)) => n
                    .as_i64()
                    .and_then(ChainOpt::from_i64)
                    .ok_or_else(|| RibosomeError::InvalidResult {
                        function: fn_name.to_string(),
                        got: v.to_string(),
                    })?,
                Some(_) => {
                    return Err(RibosomeError::InvalidResult {
                        function: fn_name.to_string(),
                        got: v.to_string(),
                    })
                }
            };
            Ok(Some(PackagingRequest { chain }))
        }
        other => Err(RibosomeError::InvalidResult {
            function: fn_name.to_string(),
            got: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mycel_model::HashType;
    use serde_json::json;

    fn header() -> Header {
        Header {
            entry_link: Hash::with(HashType::Sha2_256, b"entry"),
            entry_type: "post".into(),
            time: chrono::Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap(),
            prev: Hash::NULL,
        }
    }

    #[test]
    fn test_string_format_commit_code() {
        let h = header();
        let action = ValidatingAction {
            name: "Commit",
            def_name: "post",
            args: ValidateArgs::Entry { format: DataFormat::String, content: "hello", header: Some(&h) },
        };
        let code = validation_code(&action, None, &["QmSrc".into()]).unwrap();
        assert_eq!(
            code,
            format!(
                r#"validateCommit("post","hello",{{"EntryLink":"{}","Type":"post","Time":"2017-03-01T12:00:00Z"}},{{}},["QmSrc"])"#,
                h.entry_link
            )
        );
    }

    #[test]
    fn test_json_format_uses_json_parse() {
        let action = ValidatingAction {
            name: "Put",
            def_name: "profile",
            args: ValidateArgs::Entry {
                format: DataFormat::Json,
                content: r#"{"name":"ada"}"#,
                header: None,
            },
        };
        let code = validation_code(&action, None, &[]).unwrap();
        assert!(code.starts_with(r#"validatePut("profile",JSON.parse("{\"name\":\"ada\"}"),"#));
        assert!(code.contains(r#"{"EntryLink":"","Type":"","Time":""}"#));
        assert!(code.ends_with(",{},[])"));
    }

    #[test]
    fn test_raw_format_embeds_verbatim() {
        let action = ValidatingAction {
            name: "Commit",
            def_name: "rule",
            args: ValidateArgs::Entry {
                format: DataFormat::RawScript,
                content: "({x:1})",
                header: None,
            },
        };
        let code = validation_code(&action, None, &[]).unwrap();
        assert!(code.contains(r#""rule",({x:1}),"#));
    }

    #[test]
    fn test_del_code_is_just_the_hash() {
        let h = Hash::with(HashType::Sha2_256, b"victim");
        let action = ValidatingAction {
            name: "Del",
            def_name: "post",
            args: ValidateArgs::Del { hash: &h },
        };
        let code = validation_code(&action, None, &["Qm1".into(), "Qm2".into()]).unwrap();
        assert_eq!(code, format!(r#"validateDel("post","{}",{{}},["Qm1","Qm2"])"#, h));
    }

    #[test]
    fn test_package_chain_is_embedded() {
        let action = ValidatingAction {
            name: "Commit",
            def_name: "post",
            args: ValidateArgs::Entry { format: DataFormat::String, content: "x", header: None },
        };
        let pkg = ValidationPackage { chain: Some(json!({"Headers": []})) };
        let code = validation_code(&action, Some(&pkg), &[]).unwrap();
        assert!(code.contains(r#"{"Chain":{"Headers":[]}}"#));
    }

    #[test]
    fn test_packaging_code() {
        assert_eq!(packaging_code("Commit", "post"), r#"validateCommitPkg("post")"#);
    }

    #[test]
    fn test_boolean_contract() {
        assert!(check_validation_result("validateCommit", &json!(true)).is_ok());
        assert!(matches!(
            check_validation_result("validateCommit", &json!(false)),
            Err(RibosomeError::ValidationFailed)
        ));
        assert!(matches!(
            check_validation_result("validateCommit", &json!("yes")),
            Err(RibosomeError::InvalidResult { .. })
        ));
    }

    #[test]
    fn test_parse_packaging_result() {
        assert_eq!(parse_packaging_result("f", &Value::Null).unwrap(), None);
        assert_eq!(
            parse_packaging_result("f", &json!({})).unwrap(),
            Some(PackagingRequest { chain: ChainOpt::None })
        );
        assert_eq!(
            parse_packaging_result("f", &json!({"Chain": 3})).unwrap(),
            Some(PackagingRequest { chain: ChainOpt::Full })
        );
        assert!(parse_packaging_result("f", &json!({"Chain": "full"})).is_err());
        assert!(parse_packaging_result("f", &json!(7)).is_err());
    }
}
