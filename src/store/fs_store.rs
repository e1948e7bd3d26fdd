//! Filesystem-backed object store
//!
//! Objects are sharded by the first hex byte of their hash into a
//! two-level directory tree: `objects/<hh>/<rest-of-hex>`. The stored
//! bytes are `kind_tag || body`. Writes go to a temp file in the shard
//! directory followed by an atomic rename; two writers racing on the same
//! hash produce identical bytes and either rename wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::domain::{ObjectHash, ObjectKind};
use crate::error::{CoreError, Result};
use crate::shared::fs::sync_dir;

use super::ObjectStore;

pub struct FsObjectStore {
	root: PathBuf,
}

impl FsObjectStore {
	/// Open (or create) a store rooted at `<vcsdir>/objects`.
	pub async fn open(objects_dir: impl Into<PathBuf>) -> Result<Self> {
		let root = objects_dir.into();
		tokio::fs::create_dir_all(&root)
			.await
			.map_err(|e| CoreError::io(&root, e))?;
		Ok(Self { root })
	}

	fn object_path(&self, hash: ObjectHash) -> PathBuf {
		let hex = hash.to_hex();
		self.root.join(&hex[..2]).join(&hex[2..])
	}

	async fn read_raw(&self, hash: ObjectHash) -> Result<Vec<u8>> {
		let path = self.object_path(hash);
		match tokio::fs::read(&path).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(CoreError::not_found("object", hash.to_hex()))
			}
			Err(e) => Err(CoreError::io(path, e)),
		}
	}
}

#[async_trait]
impl ObjectStore for FsObjectStore {
	async fn put(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectHash> {
		let hash = ObjectHash::compute(kind, body);
		let path = self.object_path(hash);

		if tokio::fs::try_exists(&path).await.unwrap_or(false) {
			trace!(hash = %hash.short(), "object already stored");
			return Ok(hash);
		}

		let hex = hash.to_hex();
		let shard = self.root.join(&hex[..2]);
		tokio::fs::create_dir_all(&shard)
			.await
			.map_err(|e| CoreError::io(&shard, e))?;

		let tmp = shard.join(format!(".{}.{}", hash.short(), std::process::id()));
		{
			let mut file = tokio::fs::File::create(&tmp)
				.await
				.map_err(|e| CoreError::io(&tmp, e))?;
			file.write_all(&[kind as u8])
				.await
				.map_err(|e| CoreError::io(&tmp, e))?;
			file.write_all(body)
				.await
				.map_err(|e| CoreError::io(&tmp, e))?;
			file.sync_all().await.map_err(|e| CoreError::io(&tmp, e))?;
		}
		tokio::fs::rename(&tmp, &path)
			.await
			.map_err(|e| CoreError::io(&path, e))?;
		sync_dir(&shard).await;

		debug!(hash = %hash.short(), kind = %kind, size = body.len(), "stored object");
		Ok(hash)
	}

	async fn get(&self, hash: ObjectHash) -> Result<(ObjectKind, Vec<u8>)> {
		let raw = self.read_raw(hash).await?;
		decode_raw(hash, raw)
	}

	async fn exists(&self, hash: ObjectHash) -> bool {
		tokio::fs::try_exists(self.object_path(hash))
			.await
			.unwrap_or(false)
	}

	async fn remove(&self, hash: ObjectHash) -> Result<()> {
		let path = self.object_path(hash);
		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(CoreError::io(path, e)),
		}
	}

	async fn list(&self) -> Result<Vec<ObjectHash>> {
		let mut hashes = Vec::new();
		let mut shards = match tokio::fs::read_dir(&self.root).await {
			Ok(dir) => dir,
			Err(e) => return Err(CoreError::io(&self.root, e)),
		};
		while let Some(shard) = shards
			.next_entry()
			.await
			.map_err(|e| CoreError::io(&self.root, e))?
		{
			let shard_name = shard.file_name().to_string_lossy().into_owned();
			if shard_name.len() != 2 {
				continue;
			}
			let mut entries = tokio::fs::read_dir(shard.path())
				.await
				.map_err(|e| CoreError::io(shard.path(), e))?;
			while let Some(entry) = entries
				.next_entry()
				.await
				.map_err(|e| CoreError::io(shard.path(), e))?
			{
				let rest = entry.file_name().to_string_lossy().into_owned();
				if rest.starts_with('.') {
					// Leftover temp file from an interrupted write.
					continue;
				}
				if let Ok(hash) = ObjectHash::from_hex(&format!("{shard_name}{rest}")) {
					hashes.push(hash);
				}
			}
		}
		Ok(hashes)
	}
}

/// Split stored bytes into kind tag and body, validating the tag.
fn decode_raw(hash: ObjectHash, raw: Vec<u8>) -> Result<(ObjectKind, Vec<u8>)> {
	let (&tag, body) = raw
		.split_first()
		.ok_or_else(|| CoreError::corrupt(hash, "empty object file"))?;
	let kind = ObjectKind::from_tag(tag)
		.ok_or_else(|| CoreError::corrupt(hash, format!("unknown kind tag {tag}")))?;
	Ok((kind, body.to_vec()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::TypedStore;

	async fn store() -> (tempfile::TempDir, FsObjectStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = FsObjectStore::open(dir.path().join("objects")).await.unwrap();
		(dir, store)
	}

	#[tokio::test]
	async fn test_put_get_round_trip() {
		let (_dir, store) = store().await;
		let hash = store.put(ObjectKind::Blob, b"hello\n").await.unwrap();

		let (kind, body) = store.get(hash).await.unwrap();
		assert_eq!(kind, ObjectKind::Blob);
		assert_eq!(body, b"hello\n");
	}

	#[tokio::test]
	async fn test_put_is_idempotent() {
		let (_dir, store) = store().await;
		let first = store.put(ObjectKind::Blob, b"same").await.unwrap();
		let second = store.put(ObjectKind::Blob, b"same").await.unwrap();
		assert_eq!(first, second);
		assert_eq!(store.list().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_sharded_layout() {
		let (dir, store) = store().await;
		let hash = store.put(ObjectKind::Blob, b"laid out").await.unwrap();
		let hex = hash.to_hex();
		assert!(dir
			.path()
			.join("objects")
			.join(&hex[..2])
			.join(&hex[2..])
			.exists());
	}

	#[tokio::test]
	async fn test_get_missing_is_not_found() {
		let (_dir, store) = store().await;
		let missing = ObjectHash::compute(ObjectKind::Blob, b"never stored");
		assert!(matches!(
			store.get(missing).await,
			Err(CoreError::NotFound { .. })
		));
		assert!(!store.exists(missing).await);
	}

	#[tokio::test]
	async fn test_wrong_kind_is_corrupt() {
		let (_dir, store) = store().await;
		let hash = store.put(ObjectKind::Blob, b"just bytes").await.unwrap();
		let result = TypedStore::load_seal(&store, hash).await;
		assert!(matches!(result, Err(CoreError::Corrupt { .. })));
	}

	#[tokio::test]
	async fn test_remove_and_list() {
		let (_dir, store) = store().await;
		let a = store.put(ObjectKind::Blob, b"a").await.unwrap();
		let b = store.put(ObjectKind::Blob, b"b").await.unwrap();
		assert_eq!(store.list().await.unwrap().len(), 2);

		store.remove(a).await.unwrap();
		let left = store.list().await.unwrap();
		assert_eq!(left, vec![b]);
	}
}
