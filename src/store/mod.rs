//! Content-addressed object store
//!
//! Durable, append-mostly persistence for the four object kinds. The store
//! is a capability trait so the workspace, reshape and fuse layers can run
//! against the filesystem store or an in-memory one in tests.

mod fs_store;
pub mod gc;
mod memory;

pub use fs_store::FsObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;

use crate::domain::{Blob, Chunk, ObjectHash, ObjectKind, Seal, Tree};
use crate::error::{CoreError, Result};

/// Storage capability for content-addressed objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
	/// Write an object if absent and return its hash. Idempotent: racing
	/// writers of the same content converge on one object.
	async fn put(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectHash>;

	/// Read an object's kind and body; `NotFound` if absent.
	async fn get(&self, hash: ObjectHash) -> Result<(ObjectKind, Vec<u8>)>;

	async fn exists(&self, hash: ObjectHash) -> bool;

	/// Remove an object. Only the garbage collector calls this.
	async fn remove(&self, hash: ObjectHash) -> Result<()>;

	/// Every hash currently stored; used for reachability sweeps.
	async fn list(&self) -> Result<Vec<ObjectHash>>;
}

/// Typed accessors layered over the raw byte interface.
///
/// A stored object of the wrong kind is reported as `Corrupt`: to a caller
/// asking for a seal, a blob under that hash is indistinguishable from
/// corruption.
pub struct TypedStore;

impl TypedStore {
	pub async fn load_blob(store: &dyn ObjectStore, hash: ObjectHash) -> Result<Blob> {
		let (kind, body) = store.get(hash).await?;
		match kind {
			ObjectKind::Blob => Ok(Blob::decode(&body)),
			other => Err(wrong_kind(hash, ObjectKind::Blob, other)),
		}
	}

	pub async fn load_tree(store: &dyn ObjectStore, hash: ObjectHash) -> Result<Tree> {
		let (kind, body) = store.get(hash).await?;
		match kind {
			ObjectKind::Tree => {
				Tree::decode(&body).map_err(|e| CoreError::corrupt(hash, e.to_string()))
			}
			other => Err(wrong_kind(hash, ObjectKind::Tree, other)),
		}
	}

	pub async fn load_seal(store: &dyn ObjectStore, hash: ObjectHash) -> Result<Seal> {
		let (kind, body) = store.get(hash).await?;
		match kind {
			ObjectKind::Seal => {
				Seal::decode(&body).map_err(|e| CoreError::corrupt(hash, e.to_string()))
			}
			other => Err(wrong_kind(hash, ObjectKind::Seal, other)),
		}
	}

	pub async fn load_chunk(store: &dyn ObjectStore, hash: ObjectHash) -> Result<Chunk> {
		let (kind, body) = store.get(hash).await?;
		match kind {
			ObjectKind::Chunk => {
				Chunk::decode(&body).map_err(|e| CoreError::corrupt(hash, e.to_string()))
			}
			other => Err(wrong_kind(hash, ObjectKind::Chunk, other)),
		}
	}
}

fn wrong_kind(hash: ObjectHash, wanted: ObjectKind, found: ObjectKind) -> CoreError {
	CoreError::corrupt(hash, format!("expected {wanted}, found {found}"))
}
