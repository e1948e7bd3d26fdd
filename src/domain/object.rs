//! The four object kinds and their canonical encoding
//!
//! Hashes are computed over `kind_tag || body`, so two encoders must
//! produce byte-identical bodies for equal objects. The layout is a 1-byte
//! kind tag on the wire plus fields in fixed order; variable-length items
//! are uvarint length-prefixed, fixed-width integers are big-endian.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::hash::{ObjectHash, HASH_SIZE};
use super::identity::Identity;

/// Tag byte for each object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ObjectKind {
	Blob = 1,
	Tree = 2,
	Seal = 3,
	Chunk = 4,
}

impl ObjectKind {
	pub fn from_tag(tag: u8) -> Option<Self> {
		match tag {
			1 => Some(Self::Blob),
			2 => Some(Self::Tree),
			3 => Some(Self::Seal),
			4 => Some(Self::Chunk),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Blob => "blob",
			Self::Tree => "tree",
			Self::Seal => "seal",
			Self::Chunk => "chunk",
		}
	}
}

impl std::fmt::Display for ObjectKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Raw file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
	pub data: Vec<u8>,
}

impl Blob {
	pub fn new(data: Vec<u8>) -> Self {
		Self { data }
	}

	/// Blob bodies are the raw bytes themselves.
	pub fn encode(&self) -> Vec<u8> {
		self.data.clone()
	}

	pub fn decode(body: &[u8]) -> Self {
		Self {
			data: body.to_vec(),
		}
	}

	pub fn hash(&self) -> ObjectHash {
		ObjectHash::compute(ObjectKind::Blob, &self.data)
	}
}

/// One name inside a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
	pub name: String,
	pub mode: u32,
	pub kind: ObjectKind,
	pub hash: ObjectHash,
}

impl TreeEntry {
	pub fn file(name: impl Into<String>, mode: u32, hash: ObjectHash) -> Self {
		Self {
			name: name.into(),
			mode,
			kind: ObjectKind::Blob,
			hash,
		}
	}

	pub fn dir(name: impl Into<String>, hash: ObjectHash) -> Self {
		Self {
			name: name.into(),
			mode: 0o040000,
			kind: ObjectKind::Tree,
			hash,
		}
	}
}

/// An ordered directory listing. Entries are unique by name and kept
/// lex-sorted; children are blobs or trees only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
	entries: Vec<TreeEntry>,
}

impl Tree {
	pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self, DecodeError> {
		entries.sort_by(|a, b| a.name.cmp(&b.name));
		for pair in entries.windows(2) {
			if pair[0].name == pair[1].name {
				return Err(DecodeError::DuplicateTreeEntry(pair[0].name.clone()));
			}
		}
		for entry in &entries {
			if !matches!(entry.kind, ObjectKind::Blob | ObjectKind::Tree) {
				return Err(DecodeError::BadChildKind(entry.kind as u8));
			}
		}
		Ok(Self { entries })
	}

	pub fn entries(&self) -> &[TreeEntry] {
		&self.entries
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn find(&self, name: &str) -> Option<&TreeEntry> {
		self.entries
			.binary_search_by(|e| e.name.as_str().cmp(name))
			.ok()
			.map(|i| &self.entries[i])
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::new();
		put_uvarint(&mut out, self.entries.len() as u64);
		for entry in &self.entries {
			put_bytes(&mut out, entry.name.as_bytes());
			out.extend_from_slice(&entry.mode.to_be_bytes());
			out.push(entry.kind as u8);
			out.extend_from_slice(entry.hash.as_bytes());
		}
		out
	}

	pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
		let mut r = Reader::new(body);
		let count = r.uvarint()?;
		let mut entries = Vec::with_capacity(count as usize);
		let mut prev: Option<String> = None;
		for _ in 0..count {
			let name = r.string()?;
			let mode = u32::from_be_bytes(r.array::<4>()?);
			let tag = r.byte()?;
			let kind = ObjectKind::from_tag(tag).ok_or(DecodeError::BadKindTag(tag))?;
			if !matches!(kind, ObjectKind::Blob | ObjectKind::Tree) {
				return Err(DecodeError::BadChildKind(tag));
			}
			let hash = r.hash()?;
			if let Some(prev) = &prev {
				// Strict ordering doubles as the uniqueness check.
				if prev.as_str() >= name.as_str() {
					return Err(DecodeError::UnsortedTree);
				}
			}
			prev = Some(name.clone());
			entries.push(TreeEntry {
				name,
				mode,
				kind,
				hash,
			});
		}
		r.finish()?;
		Ok(Self { entries })
	}

	pub fn hash(&self) -> ObjectHash {
		ObjectHash::compute(ObjectKind::Tree, &self.encode())
	}
}

/// Audit annotation carried by a seal that replaced earlier history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealOverwrite {
	pub previous: ObjectHash,
	pub reason: String,
	pub author: String,
	pub timestamp: i64,
}

/// An immutable commit: a named, authored snapshot of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
	pub tree: ObjectHash,
	pub parents: Vec<ObjectHash>,
	pub author: Identity,
	pub committer: Identity,
	/// Unix seconds; sub-second precision is not part of the canonical form
	pub timestamp: i64,
	pub message: String,
	pub memorable_name: String,
	pub iteration: u64,
	pub overwrites: Vec<SealOverwrite>,
}

impl Seal {
	pub fn time(&self) -> DateTime<Utc> {
		Utc.timestamp_opt(self.timestamp, 0)
			.single()
			.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(self.tree.as_bytes());
		put_uvarint(&mut out, self.parents.len() as u64);
		for parent in &self.parents {
			out.extend_from_slice(parent.as_bytes());
		}
		put_bytes(&mut out, self.author.name.as_bytes());
		put_bytes(&mut out, self.author.email.as_bytes());
		put_bytes(&mut out, self.committer.name.as_bytes());
		put_bytes(&mut out, self.committer.email.as_bytes());
		out.extend_from_slice(&self.timestamp.to_be_bytes());
		put_bytes(&mut out, self.message.as_bytes());
		put_bytes(&mut out, self.memorable_name.as_bytes());
		put_uvarint(&mut out, self.iteration);
		put_uvarint(&mut out, self.overwrites.len() as u64);
		for ow in &self.overwrites {
			out.extend_from_slice(ow.previous.as_bytes());
			put_bytes(&mut out, ow.reason.as_bytes());
			put_bytes(&mut out, ow.author.as_bytes());
			out.extend_from_slice(&ow.timestamp.to_be_bytes());
		}
		out
	}

	pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
		let mut r = Reader::new(body);
		let tree = r.hash()?;
		let parent_count = r.uvarint()?;
		let mut parents = Vec::with_capacity(parent_count as usize);
		for _ in 0..parent_count {
			parents.push(r.hash()?);
		}
		let author = Identity::new(r.string()?, r.string()?);
		let committer = Identity::new(r.string()?, r.string()?);
		let timestamp = i64::from_be_bytes(r.array::<8>()?);
		let message = r.string()?;
		let memorable_name = r.string()?;
		let iteration = r.uvarint()?;
		let overwrite_count = r.uvarint()?;
		let mut overwrites = Vec::with_capacity(overwrite_count as usize);
		for _ in 0..overwrite_count {
			let previous = r.hash()?;
			let reason = r.string()?;
			let ow_author = r.string()?;
			let ow_timestamp = i64::from_be_bytes(r.array::<8>()?);
			overwrites.push(SealOverwrite {
				previous,
				reason,
				author: ow_author,
				timestamp: ow_timestamp,
			});
		}
		r.finish()?;
		Ok(Self {
			tree,
			parents,
			author,
			committer,
			timestamp,
			message,
			memorable_name,
			iteration,
			overwrites,
		})
	}

	pub fn hash(&self) -> ObjectHash {
		ObjectHash::compute(ObjectKind::Seal, &self.encode())
	}
}

/// A transfer segment of a large blob. Chunks never appear in trees; they
/// exist so oversized blobs can travel and land in bounded pieces, then be
/// reassembled and digest-verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
	/// Hash of the blob these segments assemble into
	pub blob: ObjectHash,
	pub index: u32,
	pub count: u32,
	pub data: Vec<u8>,
}

impl Chunk {
	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(self.blob.as_bytes());
		put_uvarint(&mut out, self.index as u64);
		put_uvarint(&mut out, self.count as u64);
		put_bytes(&mut out, &self.data);
		out
	}

	pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
		let mut r = Reader::new(body);
		let blob = r.hash()?;
		let index = r.uvarint()? as u32;
		let count = r.uvarint()? as u32;
		let data = r.bytes()?;
		r.finish()?;
		Ok(Self {
			blob,
			index,
			count,
			data,
		})
	}

	pub fn hash(&self) -> ObjectHash {
		ObjectHash::compute(ObjectKind::Chunk, &self.encode())
	}
}

/// A decoded object of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
	Blob(Blob),
	Tree(Tree),
	Seal(Seal),
	Chunk(Chunk),
}

impl Object {
	pub fn kind(&self) -> ObjectKind {
		match self {
			Self::Blob(_) => ObjectKind::Blob,
			Self::Tree(_) => ObjectKind::Tree,
			Self::Seal(_) => ObjectKind::Seal,
			Self::Chunk(_) => ObjectKind::Chunk,
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		match self {
			Self::Blob(b) => b.encode(),
			Self::Tree(t) => t.encode(),
			Self::Seal(s) => s.encode(),
			Self::Chunk(c) => c.encode(),
		}
	}

	pub fn decode(kind: ObjectKind, body: &[u8]) -> Result<Self, DecodeError> {
		Ok(match kind {
			ObjectKind::Blob => Self::Blob(Blob::decode(body)),
			ObjectKind::Tree => Self::Tree(Tree::decode(body)?),
			ObjectKind::Seal => Self::Seal(Seal::decode(body)?),
			ObjectKind::Chunk => Self::Chunk(Chunk::decode(body)?),
		})
	}

	pub fn hash(&self) -> ObjectHash {
		ObjectHash::compute(self.kind(), &self.encode())
	}
}

/// Canonical decoding failures
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("unexpected end of object body")]
	UnexpectedEof,
	#[error("trailing bytes after object body")]
	TrailingBytes,
	#[error("varint overflows 64 bits")]
	VarintOverflow,
	#[error("string field is not valid UTF-8")]
	InvalidUtf8,
	#[error("unknown kind tag {0}")]
	BadKindTag(u8),
	#[error("tree child has kind tag {0}, expected blob or tree")]
	BadChildKind(u8),
	#[error("tree entries are not strictly sorted by name")]
	UnsortedTree,
	#[error("duplicate tree entry: {0}")]
	DuplicateTreeEntry(String),
}

fn put_uvarint(out: &mut Vec<u8>, mut value: u64) {
	loop {
		let byte = (value & 0x7f) as u8;
		value >>= 7;
		if value == 0 {
			out.push(byte);
			break;
		}
		out.push(byte | 0x80);
	}
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
	put_uvarint(out, bytes.len() as u64);
	out.extend_from_slice(bytes);
}

struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self { buf, pos: 0 }
	}

	fn byte(&mut self) -> Result<u8, DecodeError> {
		let b = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
		self.pos += 1;
		Ok(b)
	}

	fn uvarint(&mut self) -> Result<u64, DecodeError> {
		let mut value = 0u64;
		let mut shift = 0u32;
		loop {
			let byte = self.byte()?;
			if shift >= 64 || (shift == 63 && byte > 1) {
				return Err(DecodeError::VarintOverflow);
			}
			value |= ((byte & 0x7f) as u64) << shift;
			if byte & 0x80 == 0 {
				return Ok(value);
			}
			shift += 7;
		}
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
		let end = self.pos.checked_add(len).ok_or(DecodeError::UnexpectedEof)?;
		let slice = self.buf.get(self.pos..end).ok_or(DecodeError::UnexpectedEof)?;
		self.pos = end;
		Ok(slice)
	}

	fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
		let slice = self.take(N)?;
		let mut out = [0u8; N];
		out.copy_from_slice(slice);
		Ok(out)
	}

	fn hash(&mut self) -> Result<ObjectHash, DecodeError> {
		let bytes = self.array::<HASH_SIZE>()?;
		Ok(ObjectHash::from_bytes(bytes))
	}

	fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
		let len = self.uvarint()? as usize;
		Ok(self.take(len)?.to_vec())
	}

	fn string(&mut self) -> Result<String, DecodeError> {
		String::from_utf8(self.bytes()?).map_err(|_| DecodeError::InvalidUtf8)
	}

	fn finish(&self) -> Result<(), DecodeError> {
		if self.pos == self.buf.len() {
			Ok(())
		} else {
			Err(DecodeError::TrailingBytes)
		}
	}
}
