//! Batched object import
//!
//! Landing a remote history is the one bulk write path in the core:
//! blobs, trees and chunks go through a bounded worker pool in batches,
//! seals land last in index-sized batches, and a shared cancellation
//! flag is polled between batches. Cancelling leaves partial objects for
//! the garbage collector; it never advances a head.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::{Blob, Chunk, ObjectHash, ObjectKind, Seal};
use crate::error::{CoreError, Result};
use crate::index::SealIndex;
use crate::store::ObjectStore;

/// Worker-pool and batch sizing
#[derive(Debug, Clone)]
pub struct ImportConfig {
	pub workers: usize,
	pub blob_batch: usize,
	pub seal_batch: usize,
	/// Blobs above this size travel as chunk segments
	pub chunk_threshold: usize,
}

impl Default for ImportConfig {
	fn default() -> Self {
		Self {
			workers: 8,
			blob_batch: 100,
			seal_batch: 10,
			chunk_threshold: 4 * 1024 * 1024,
		}
	}
}

/// Progress callback payload
#[derive(Debug, Clone, Copy)]
pub struct ImportProgress {
	pub stored: usize,
	pub total: usize,
}

pub type ProgressFn = Arc<dyn Fn(ImportProgress) + Send + Sync>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
	pub stored: usize,
	pub assembled_blobs: usize,
	pub indexed_seals: usize,
	pub cancelled: bool,
}

/// Store a batch of fetched objects. Non-seal objects land first (so
/// every seal's closure is present before the seal is indexed), then
/// seals are stored and indexed in one transaction per batch.
pub async fn import_objects(
	store: Arc<dyn ObjectStore>,
	index: Arc<dyn SealIndex>,
	objects: Vec<(ObjectKind, Vec<u8>)>,
	config: &ImportConfig,
	progress: Option<ProgressFn>,
	cancel: Arc<AtomicBool>,
) -> Result<ImportReport> {
	let total = objects.len();
	let mut report = ImportReport::default();

	let mut payload: Vec<(ObjectKind, Vec<u8>)> = Vec::new();
	let mut seals: Vec<(ObjectKind, Vec<u8>)> = Vec::new();
	for object in objects {
		match object.0 {
			ObjectKind::Seal => seals.push(object),
			_ => payload.push(object),
		}
	}

	// Content objects through the worker pool, batch by batch.
	let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
	let mut chunk_hashes: Vec<ObjectHash> = Vec::new();
	for batch in payload.chunks(config.blob_batch.max(1)) {
		if cancel.load(Ordering::Relaxed) {
			warn!(stored = report.stored, "import cancelled between blob batches");
			report.cancelled = true;
			return Ok(report);
		}

		let mut tasks: JoinSet<Result<(ObjectKind, ObjectHash, usize)>> = JoinSet::new();
		for (kind, body) in batch.iter().cloned() {
			let store = store.clone();
			let semaphore = semaphore.clone();
			tasks.spawn(async move {
				let _permit = semaphore
					.acquire_owned()
					.await
					.map_err(|_| CoreError::state("import worker pool closed"))?;
				let size = body.len();
				let hash = store.put(kind, &body).await?;
				Ok((kind, hash, size))
			});
		}
		while let Some(joined) = tasks.join_next().await {
			let (kind, hash, size) = joined
				.map_err(|e| CoreError::state(format!("import worker panicked: {e}")))??;
			index.index_object(hash, kind, size as u64).await?;
			if kind == ObjectKind::Chunk {
				chunk_hashes.push(hash);
			}
			report.stored += 1;
		}

		if let Some(progress) = &progress {
			progress(ImportProgress {
				stored: report.stored,
				total,
			});
		}
	}

	report.assembled_blobs =
		assemble_chunks(store.as_ref(), index.as_ref(), &chunk_hashes).await?;

	// Seals last, in index batches.
	for batch in seals.chunks(config.seal_batch.max(1)) {
		if cancel.load(Ordering::Relaxed) {
			warn!(stored = report.stored, "import cancelled between seal batches");
			report.cancelled = true;
			return Ok(report);
		}
		let mut decoded: Vec<(ObjectHash, Seal)> = Vec::with_capacity(batch.len());
		for (_, body) in batch {
			let hash = store.put(ObjectKind::Seal, body).await?;
			index
				.index_object(hash, ObjectKind::Seal, body.len() as u64)
				.await?;
			let seal = Seal::decode(body).map_err(|e| CoreError::corrupt(hash, e.to_string()))?;
			decoded.push((hash, seal));
			report.stored += 1;
		}
		index.batch_index_seals(&decoded).await?;
		report.indexed_seals += decoded.len();

		if let Some(progress) = &progress {
			progress(ImportProgress {
				stored: report.stored,
				total,
			});
		}
	}

	info!(
		stored = report.stored,
		seals = report.indexed_seals,
		assembled = report.assembled_blobs,
		"import finished"
	);
	Ok(report)
}

/// Reassemble any blob whose chunk set is now complete. The digest of the
/// assembled bytes must equal the advertised blob hash.
pub async fn assemble_chunks(
	store: &dyn ObjectStore,
	index: &dyn SealIndex,
	chunk_hashes: &[ObjectHash],
) -> Result<usize> {
	use std::collections::BTreeMap;

	let mut by_blob: BTreeMap<ObjectHash, Vec<Chunk>> = BTreeMap::new();
	for &hash in chunk_hashes {
		let chunk = crate::store::TypedStore::load_chunk(store, hash).await?;
		index.index_chunk(hash, &chunk).await?;
		by_blob.entry(chunk.blob).or_default().push(chunk);
	}

	let mut assembled = 0usize;
	for (blob_hash, mut chunks) in by_blob {
		if store.exists(blob_hash).await {
			continue;
		}
		let expected = chunks[0].count as usize;
		if chunks.len() < expected {
			debug!(blob = %blob_hash.short(), have = chunks.len(), expected, "blob still incomplete");
			continue;
		}
		chunks.sort_by_key(|c| c.index);
		let mut data = Vec::new();
		for (position, chunk) in chunks.iter().enumerate() {
			if chunk.index as usize != position {
				return Err(CoreError::corrupt(
					blob_hash,
					format!("chunk sequence broken at segment {position}"),
				));
			}
			data.extend_from_slice(&chunk.data);
		}
		let blob = Blob::new(data);
		if blob.hash() != blob_hash {
			return Err(CoreError::corrupt(
				blob_hash,
				"assembled bytes do not match the advertised blob hash",
			));
		}
		let stored = store.put(ObjectKind::Blob, &blob.encode()).await?;
		index
			.index_object(stored, ObjectKind::Blob, blob.data.len() as u64)
			.await?;
		assembled += 1;
	}
	Ok(assembled)
}

/// Split an oversized blob into transfer segments.
pub fn chunk_blob(blob: &Blob, chunk_size: usize) -> Vec<Chunk> {
	let chunk_size = chunk_size.max(1);
	let blob_hash = blob.hash();
	let count = blob.data.len().div_ceil(chunk_size) as u32;
	blob.data
		.chunks(chunk_size)
		.enumerate()
		.map(|(index, piece)| Chunk {
			blob: blob_hash,
			index: index as u32,
			count,
			data: piece.to_vec(),
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_chunk_blob_covers_all_bytes() {
		let blob = Blob::new((0u8..=255).cycle().take(10_000).collect());
		let chunks = chunk_blob(&blob, 4096);
		assert_eq!(chunks.len(), 3);
		assert!(chunks.iter().all(|c| c.count == 3 && c.blob == blob.hash()));

		let mut reassembled = Vec::new();
		for chunk in &chunks {
			reassembled.extend_from_slice(&chunk.data);
		}
		assert_eq!(reassembled, blob.data);
	}
}
