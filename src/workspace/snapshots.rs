//! Snapshot persistence
//!
//! One JSON document per snapshot under `snapshots/<id>.json`. Auto
//! snapshots are the safety net under timeline switches; named snapshots
//! are the user's shelf and are never deleted automatically.

use std::path::PathBuf;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::WorkspaceSnapshot;
use crate::error::{CoreError, Result};
use crate::shared::fs::{read_json, write_json_atomic};

pub struct SnapshotManager {
	dir: PathBuf,
}

impl SnapshotManager {
	pub fn new(dir: PathBuf) -> Self {
		Self { dir }
	}

	fn path_for(&self, id: Uuid) -> PathBuf {
		self.dir.join(format!("{id}.json"))
	}

	pub async fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()> {
		write_json_atomic(&self.path_for(snapshot.id), snapshot).await?;
		info!(
			id = %snapshot.id,
			auto = snapshot.auto_saved,
			files = snapshot.file_count(),
			"saved workspace snapshot"
		);
		Ok(())
	}

	pub async fn get(&self, id: Uuid) -> Result<WorkspaceSnapshot> {
		let path = self.path_for(id);
		if !path.exists() {
			return Err(CoreError::not_found("snapshot", id.to_string()));
		}
		read_json(&path).await
	}

	/// Find by id string or shelf name.
	pub async fn find(&self, key: &str) -> Result<WorkspaceSnapshot> {
		if let Ok(id) = key.parse::<Uuid>() {
			return self.get(id).await;
		}
		self.list()
			.await?
			.into_iter()
			.find(|s| s.name.as_deref() == Some(key))
			.ok_or_else(|| CoreError::not_found("snapshot", key))
	}

	pub async fn delete(&self, id: Uuid) -> Result<()> {
		let path = self.path_for(id);
		match tokio::fs::remove_file(&path).await {
			Ok(()) => {
				debug!(id = %id, "deleted snapshot");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(CoreError::not_found("snapshot", id.to_string()))
			}
			Err(e) => Err(CoreError::io(path, e)),
		}
	}

	pub async fn list(&self) -> Result<Vec<WorkspaceSnapshot>> {
		let mut snapshots = Vec::new();
		let mut entries = match tokio::fs::read_dir(&self.dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
			Err(e) => return Err(CoreError::io(&self.dir, e)),
		};
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| CoreError::io(&self.dir, e))?
		{
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			let snapshot: WorkspaceSnapshot = read_json(&path).await?;
			snapshots.push(snapshot);
		}
		snapshots.sort_by_key(|s| s.timestamp);
		Ok(snapshots)
	}

	/// Most recent auto snapshot captured on `timeline`, if any.
	pub async fn latest_auto_for(&self, timeline: &str) -> Result<Option<WorkspaceSnapshot>> {
		Ok(self
			.list()
			.await?
			.into_iter()
			.filter(|s| s.auto_saved && s.timeline == timeline)
			.max_by_key(|s| s.timestamp))
	}
}
