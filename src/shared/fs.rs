//! Durable filesystem helpers
//!
//! All repository state documents are written through [`write_json_atomic`]:
//! serialize to a temp file in the target directory, fsync, then rename
//! into place. Readers either see the old document or the new one, never a
//! partial write.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Read and deserialize a JSON state document.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
	let bytes = tokio::fs::read(path)
		.await
		.map_err(|e| CoreError::io(path, e))?;
	serde_json::from_slice(&bytes)
		.map_err(|e| CoreError::state(format!("malformed document {}: {e}", path.display())))
}

/// Serialize and atomically replace a JSON state document.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
	let json = serde_json::to_vec_pretty(value)
		.map_err(|e| CoreError::state(format!("serialize {}: {e}", path.display())))?;
	write_atomic(path, &json).await
}

/// Atomically replace a file's contents via temp file + rename + fsync.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
	let parent = path
		.parent()
		.ok_or_else(|| CoreError::state(format!("no parent directory for {}", path.display())))?;
	tokio::fs::create_dir_all(parent)
		.await
		.map_err(|e| CoreError::io(parent, e))?;

	// Temp file must live in the same directory so the rename stays atomic.
	let tmp = parent.join(format!(
		".{}.tmp-{}",
		path.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "state".to_string()),
		std::process::id()
	));

	let file = tokio::fs::File::create(&tmp)
		.await
		.map_err(|e| CoreError::io(&tmp, e))?;
	{
		use tokio::io::AsyncWriteExt;
		let mut file = file;
		file.write_all(bytes)
			.await
			.map_err(|e| CoreError::io(&tmp, e))?;
		file.sync_all().await.map_err(|e| CoreError::io(&tmp, e))?;
	}

	tokio::fs::rename(&tmp, path)
		.await
		.map_err(|e| CoreError::io(path, e))?;

	// Persist the rename itself.
	sync_dir(parent).await;
	Ok(())
}

/// Best-effort fsync of a directory. Not all platforms support opening
/// directories for sync; failures here are ignored.
pub async fn sync_dir(path: &Path) {
	let path = path.to_path_buf();
	let _ = tokio::task::spawn_blocking(move || {
		if let Ok(dir) = std::fs::File::open(&path) {
			let _ = dir.sync_all();
		}
	})
	.await;
}
