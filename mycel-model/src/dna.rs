//! The application manifest (DNA): zomes, entry defs, function defs.
//!
//! Consumed, never produced, by the core; loading from disk belongs to the
//! configuration collaborator.

use crate::hash::HashType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DnaError {
    #[error("unknown zome: {0}")]
    UnknownZome(String),

    #[error("unknown entry type: {0}")]
    UnknownEntryType(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),
}

/// Whether committed entries of a type are published to the DHT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sharing {
    #[default]
    Public,
    Private,
}

/// How an exposed zome function receives its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallingType {
    #[default]
    String,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDef {
    pub name: String,
    pub data_format: crate::entry::DataFormat,
    #[serde(default)]
    pub sharing: Sharing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub calling_type: CallingType,
    #[serde(default)]
    pub exposure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZomeDef {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub entries: Vec<EntryDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
}

impl ZomeDef {
    pub fn entry_def(&self, name: &str) -> Result<&EntryDef, DnaError> {
        self.entries
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DnaError::UnknownEntryType(name.to_string()))
    }

    pub fn function_def(&self, name: &str) -> Result<&FunctionDef, DnaError> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| DnaError::UnknownFunction(name.to_string()))
    }
}

/// Application manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dna {
    pub name: String,
    #[serde(default)]
    pub hash_type: HashType,
    #[serde(default)]
    pub required_version: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub zomes: Vec<ZomeDef>,
}

impl Dna {
    pub fn zome(&self, name: &str) -> Result<&ZomeDef, DnaError> {
        self.zomes
            .iter()
            .find(|z| z.name == name)
            .ok_or_else(|| DnaError::UnknownZome(name.to_string()))
    }

    /// Application property lookup; `_id` and `_agent_id` are reserved names
    /// resolved by the node, everything else comes from the manifest.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::DataFormat;

    fn dna() -> Dna {
        Dna {
            name: "journal".into(),
            hash_type: HashType::Sha2_256,
            required_version: String::new(),
            properties: BTreeMap::from([("lang".to_string(), "en".to_string())]),
            zomes: vec![ZomeDef {
                name: "posts".into(),
                code: String::new(),
                entries: vec![EntryDef {
                    name: "post".into(),
                    data_format: DataFormat::String,
                    sharing: Sharing::Public,
                }],
                functions: vec![FunctionDef {
                    name: "addPost".into(),
                    calling_type: CallingType::Json,
                    exposure: "public".into(),
                }],
            }],
        }
    }

    #[test]
    fn test_lookups() {
        let d = dna();
        assert!(d.zome("posts").is_ok());
        assert!(matches!(d.zome("nope"), Err(DnaError::UnknownZome(_))));
        let z = d.zome("posts").unwrap();
        assert!(z.entry_def("post").is_ok());
        assert!(matches!(z.entry_def("nope"), Err(DnaError::UnknownEntryType(_))));
        assert!(z.function_def("addPost").is_ok());
    }

    #[test]
    fn test_property() {
        let d = dna();
        assert_eq!(d.property("lang"), Some("en"));
        assert_eq!(d.property("missing"), None);
    }
}
