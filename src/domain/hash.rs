//! Content-addressed object hashes
//!
//! A hash is the 32-byte BLAKE3 digest of an object's canonical encoding,
//! tagged with its kind so kinds never alias. The all-zero hash is a
//! sentinel meaning "no object" (an empty timeline head).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::object::ObjectKind;

/// Digest width in bytes
pub const HASH_SIZE: usize = 32;

/// A BLAKE3 digest identifying one stored object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHash([u8; HASH_SIZE]);

impl ObjectHash {
	/// Sentinel for "no object"
	pub const ZERO: ObjectHash = ObjectHash([0u8; HASH_SIZE]);

	pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
		&self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; HASH_SIZE]
	}

	/// Hash an object body under its kind tag.
	pub fn compute(kind: ObjectKind, body: &[u8]) -> Self {
		let mut hasher = blake3::Hasher::new();
		hasher.update(&[kind as u8]);
		hasher.update(body);
		Self(*hasher.finalize().as_bytes())
	}

	/// Lowercase 64-char hex rendering.
	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
		if s.len() != HASH_SIZE * 2 {
			return Err(HashParseError::Length(s.len()));
		}
		let raw = hex::decode(s).map_err(|_| HashParseError::NotHex)?;
		let mut bytes = [0u8; HASH_SIZE];
		bytes.copy_from_slice(&raw);
		Ok(Self(bytes))
	}

	pub fn from_slice(bytes: &[u8]) -> Result<Self, HashParseError> {
		if bytes.len() != HASH_SIZE {
			return Err(HashParseError::Length(bytes.len()));
		}
		let mut raw = [0u8; HASH_SIZE];
		raw.copy_from_slice(bytes);
		Ok(Self(raw))
	}

	/// Abbreviated rendering for logs and summaries.
	pub fn short(&self) -> String {
		self.to_hex()[..8].to_string()
	}
}

#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
	#[error("digest has wrong length: {0} chars")]
	Length(usize),
	#[error("not a hex string")]
	NotHex,
}

impl fmt::Display for ObjectHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl fmt::Debug for ObjectHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ObjectHash({})", self.short())
	}
}

impl FromStr for ObjectHash {
	type Err = HashParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_hex(s)
	}
}

// JSON documents carry hashes as hex strings.
impl Serialize for ObjectHash {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for ObjectHash {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Self::from_hex(&s).map_err(serde::de::Error::custom)
	}
}
