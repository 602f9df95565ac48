//! Content hashes and peer identifiers
//!
//! Hashes carry a multihash-style prefix (algorithm tag + digest length) so
//! that the wire form is self-identifying, and render as base-58 strings.
//! Serde: human-readable formats (JSON, for scripts) get the base-58 string,
//! binary formats (postcard, for the canonical encoding) get raw bytes.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors from parsing hashes or peer IDs out of their base-58 form
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HashError {
    #[error("invalid base-58 string: {0}")]
    Base58(String),

    #[error("unknown hash algorithm tag: {0:#x}")]
    UnknownAlgorithm(u8),

    #[error("digest length mismatch: prefix says {expected}, got {got}")]
    DigestLength { expected: usize, got: usize },

    #[error("hash too short: {0} bytes")]
    TooShort(usize),
}

/// Hash algorithm an application declares in its DNA (`HashType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HashType {
    #[default]
    #[serde(rename = "sha2-256")]
    Sha2_256,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashType {
    /// Multihash algorithm tag byte
    pub fn tag(&self) -> u8 {
        match self {
            HashType::Sha2_256 => 0x12,
            HashType::Blake3 => 0x1e,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, HashError> {
        match tag {
            0x12 => Ok(HashType::Sha2_256),
            0x1e => Ok(HashType::Blake3),
            other => Err(HashError::UnknownAlgorithm(other)),
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashType::Sha2_256 => {
                use sha2::{Digest, Sha256};
                Sha256::digest(data).to_vec()
            }
            HashType::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        }
    }
}

/// A content address: algorithm tag, digest length, digest bytes.
///
/// The empty (null) hash displays as the empty string; validation headers
/// use it for unheadered entries.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(Vec<u8>);

impl Hash {
    /// The null hash; renders as ""
    pub const NULL: Hash = Hash(Vec::new());

    /// Hash `data` with the given algorithm
    pub fn with(ht: HashType, data: &[u8]) -> Self {
        let digest = ht.digest(data);
        let mut bytes = Vec::with_capacity(2 + digest.len());
        bytes.push(ht.tag());
        bytes.push(digest.len() as u8);
        bytes.extend_from_slice(&digest);
        Hash(bytes)
    }

    /// Parse from a base-58 string
    pub fn parse(s: &str) -> Result<Self, HashError> {
        if s.is_empty() {
            return Ok(Hash::NULL);
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| HashError::Base58(e.to_string()))?;
        Self::from_raw(bytes)
    }

    /// Validate raw multihash bytes
    pub fn from_raw(bytes: Vec<u8>) -> Result<Self, HashError> {
        if bytes.is_empty() {
            return Ok(Hash::NULL);
        }
        if bytes.len() < 2 {
            return Err(HashError::TooShort(bytes.len()));
        }
        HashType::from_tag(bytes[0])?;
        let expected = bytes[1] as usize;
        let got = bytes.len() - 2;
        if expected != got {
            return Err(HashError::DigestLength { expected, got });
        }
        Ok(Hash(bytes))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash::parse(&s).map_err(D::Error::custom)
        } else {
            let bytes = serde_bytes_vec::deserialize(deserializer)?;
            Hash::from_raw(bytes).map_err(D::Error::custom)
        }
    }
}

// byte-buffer deserialization without pulling in serde_bytes
mod serde_bytes_vec {
    use serde::Deserializer;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;
        impl<'de> serde::de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("bytes")
            }
            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }
            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }
            fn visit_seq<A: serde::de::SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
                let mut out = Vec::new();
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(out)
            }
        }
        d.deserialize_byte_buf(BytesVisitor)
    }
}

/// Stable network identifier of a node, rendered base-58.
///
/// Issued by the (external) key-management collaborator; inside the core it
/// is an opaque 32-byte value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Random peer ID, for tests and throwaway identities
    pub fn random() -> Self {
        PeerId(rand::random())
    }

    /// Parse from a base-58 string
    pub fn parse(s: &str) -> Result<Self, HashError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| HashError::Base58(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| HashError::DigestLength { expected: 32, got: v.len() })?;
        Ok(PeerId(arr))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = bs58::encode(&self.0).into_string();
        write!(f, "PeerId({}…)", &full[..8.min(full.len())])
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            PeerId::parse(&s).map_err(D::Error::custom)
        } else {
            let bytes = serde_bytes_vec::deserialize(deserializer)?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|v: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", v.len())))?;
            Ok(PeerId(arr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip() {
        let h = Hash::with(HashType::Sha2_256, b"hello");
        let s = h.to_string();
        assert!(!s.is_empty());
        assert_eq!(Hash::parse(&s).unwrap(), h);
    }

    #[test]
    fn test_hash_algorithms_differ() {
        let a = Hash::with(HashType::Sha2_256, b"x");
        let b = Hash::with(HashType::Blake3, b"x");
        assert_ne!(a, b);
        assert_eq!(a.as_bytes()[0], 0x12);
        assert_eq!(b.as_bytes()[0], 0x1e);
    }

    #[test]
    fn test_null_hash_displays_empty() {
        assert_eq!(Hash::NULL.to_string(), "");
        assert_eq!(Hash::parse("").unwrap(), Hash::NULL);
    }

    #[test]
    fn test_hash_rejects_garbage() {
        assert!(matches!(Hash::parse("0OIl"), Err(HashError::Base58(_))));
        // valid base58 but not a multihash
        let junk = bs58::encode(&[0xff, 3, 1]).into_string();
        assert!(Hash::parse(&junk).is_err());
    }

    #[test]
    fn test_hash_json_is_base58_string() {
        let h = Hash::with(HashType::Sha2_256, b"hello");
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json, serde_json::Value::String(h.to_string()));
        let back: Hash = serde_json::from_value(json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_hash_postcard_roundtrip() {
        let h = Hash::with(HashType::Blake3, b"bits");
        let bytes = postcard::to_allocvec(&h).unwrap();
        let back: Hash = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_peer_id_roundtrip() {
        let p = PeerId::random();
        assert_eq!(PeerId::parse(&p.to_string()).unwrap(), p);
        let bytes = postcard::to_allocvec(&p).unwrap();
        let back: PeerId = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, p);
    }
}
