//! Reachability-based garbage collection
//!
//! Live objects are everything reachable from the timeline heads, plus the
//! hashes snapshots and overwrite records pin. Chunks are transfer
//! artifacts: once their assembled blob is present they are collectable;
//! while the blob is still missing they stay.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::domain::{Object, ObjectHash, ObjectKind};
use crate::error::Result;

use super::ObjectStore;

/// Root hashes pinned by repository state
#[derive(Debug, Default, Clone)]
pub struct GcRoots {
	/// Timeline heads, overwrite originals/replacements, position targets
	pub seals: Vec<ObjectHash>,
	/// Blob hashes recorded in workspace snapshots and file states
	pub blobs: Vec<ObjectHash>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcReport {
	pub scanned: usize,
	pub live: usize,
	pub deleted: usize,
}

/// Sweep the store, removing everything unreachable from `roots`.
pub async fn collect_garbage(
	store: &dyn ObjectStore,
	roots: &GcRoots,
	dry_run: bool,
) -> Result<GcReport> {
	let mut live: HashSet<ObjectHash> = HashSet::new();
	let mut stack: Vec<ObjectHash> = Vec::new();

	for &hash in roots.seals.iter().chain(roots.blobs.iter()) {
		if !hash.is_zero() {
			stack.push(hash);
		}
	}

	// Mark phase: follow seal -> tree/parents and tree -> children edges.
	while let Some(hash) = stack.pop() {
		if !live.insert(hash) {
			continue;
		}
		let (kind, body) = match store.get(hash).await {
			Ok(found) => found,
			// A root may pin an object that was never fetched; skip it.
			Err(_) => continue,
		};
		match Object::decode(kind, &body) {
			Ok(Object::Seal(seal)) => {
				stack.push(seal.tree);
				stack.extend(seal.parents);
				stack.extend(seal.overwrites.iter().map(|ow| ow.previous));
			}
			Ok(Object::Tree(tree)) => {
				stack.extend(tree.entries().iter().map(|e| e.hash));
			}
			Ok(Object::Blob(_)) | Ok(Object::Chunk(_)) => {}
			Err(_) => {}
		}
	}

	// Sweep phase.
	let stored = store.list().await?;
	let mut report = GcReport {
		scanned: stored.len(),
		..Default::default()
	};
	for hash in stored {
		if live.contains(&hash) {
			report.live += 1;
			continue;
		}
		let keep_chunk = match store.get(hash).await {
			Ok((ObjectKind::Chunk, body)) => {
				match crate::domain::Chunk::decode(&body) {
					// In-flight segment: its blob has not landed yet.
					Ok(chunk) => !store.exists(chunk.blob).await,
					Err(_) => false,
				}
			}
			Ok(_) => false,
			Err(_) => false,
		};
		if keep_chunk {
			report.live += 1;
			continue;
		}
		if !dry_run {
			store.remove(hash).await?;
		}
		debug!(hash = %hash.short(), dry_run, "collected unreachable object");
		report.deleted += 1;
	}

	info!(
		scanned = report.scanned,
		live = report.live,
		deleted = report.deleted,
		dry_run,
		"garbage collection finished"
	);
	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::{Blob, Identity, Seal, Tree, TreeEntry};
	use crate::store::MemoryObjectStore;

	async fn seal_with_tree(store: &MemoryObjectStore, content: &[u8]) -> (ObjectHash, ObjectHash, ObjectHash) {
		let blob = Blob::new(content.to_vec());
		let blob_hash = store.put(ObjectKind::Blob, &blob.encode()).await.unwrap();
		let tree = Tree::new(vec![TreeEntry::file("a.txt", 0o100644, blob_hash)]).unwrap();
		let tree_hash = store.put(ObjectKind::Tree, &tree.encode()).await.unwrap();
		let seal = Seal {
			tree: tree_hash,
			parents: vec![],
			author: Identity::new("t", ""),
			committer: Identity::new("t", ""),
			timestamp: 0,
			message: "m".into(),
			memorable_name: "calm-lake-1".into(),
			iteration: 1,
			overwrites: vec![],
		};
		let seal_hash = store.put(ObjectKind::Seal, &seal.encode()).await.unwrap();
		(seal_hash, tree_hash, blob_hash)
	}

	#[tokio::test]
	async fn test_reachable_objects_survive() {
		let store = MemoryObjectStore::new();
		let (seal_hash, tree_hash, blob_hash) = seal_with_tree(&store, b"keep me").await;
		let orphan = store.put(ObjectKind::Blob, b"orphan").await.unwrap();

		let roots = GcRoots {
			seals: vec![seal_hash],
			blobs: vec![],
		};
		let report = collect_garbage(&store, &roots, false).await.unwrap();

		assert_eq!(report.deleted, 1);
		assert!(store.exists(seal_hash).await);
		assert!(store.exists(tree_hash).await);
		assert!(store.exists(blob_hash).await);
		assert!(!store.exists(orphan).await);
	}

	#[tokio::test]
	async fn test_dry_run_deletes_nothing() {
		let store = MemoryObjectStore::new();
		let orphan = store.put(ObjectKind::Blob, b"orphan").await.unwrap();
		let report = collect_garbage(&store, &GcRoots::default(), true).await.unwrap();
		assert_eq!(report.deleted, 1);
		assert!(store.exists(orphan).await);
	}

	#[tokio::test]
	async fn test_pending_chunks_survive() {
		let store = MemoryObjectStore::new();
		let blob = Blob::new(vec![9u8; 64]);
		let chunk = crate::domain::Chunk {
			blob: blob.hash(),
			index: 0,
			count: 1,
			data: blob.data.clone(),
		};
		let chunk_hash = store.put(ObjectKind::Chunk, &chunk.encode()).await.unwrap();

		// Blob absent: chunk is an in-flight transfer and must stay.
		let report = collect_garbage(&store, &GcRoots::default(), false).await.unwrap();
		assert_eq!(report.deleted, 0);
		assert!(store.exists(chunk_hash).await);

		// Once the blob lands the chunk becomes garbage.
		store.put(ObjectKind::Blob, &blob.encode()).await.unwrap();
		let report = collect_garbage(&store, &GcRoots { seals: vec![], blobs: vec![blob.hash()] }, false)
			.await
			.unwrap();
		assert_eq!(report.deleted, 1);
		assert!(!store.exists(chunk_hash).await);
	}
}
