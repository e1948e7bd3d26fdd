//! Workspace snapshots
//!
//! A snapshot captures the dirty working files and the anvil at a moment in
//! time, content included, so a timeline switch can never lose work.
//! Content travels by value (base64 in the JSON document), not by object
//! reference: snapshots must survive even if the objects were never sealed.

use std::collections::BTreeMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file_state::FileState;
use super::hash::ObjectHash;

/// One captured file: its tracked state plus the bytes it held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
	pub state: FileState,
	/// Base64 of the working content; None for deleted files
	pub content: Option<String>,
}

impl SnapshotFile {
	pub fn new(state: FileState, content: Option<&[u8]>) -> Self {
		Self {
			state,
			content: content.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
		}
	}

	pub fn content_bytes(&self) -> Option<Vec<u8>> {
		self.content.as_ref().and_then(|encoded| {
			base64::engine::general_purpose::STANDARD.decode(encoded).ok()
		})
	}
}

/// A captured copy of the working directory and anvil
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
	pub id: Uuid,
	/// User-supplied shelf name; None for auto-preserved snapshots
	pub name: Option<String>,
	pub timeline: String,
	/// Position hash at capture time
	pub position: ObjectHash,
	pub timestamp: DateTime<Utc>,
	pub files: BTreeMap<String, SnapshotFile>,
	pub anvil_files: BTreeMap<String, SnapshotFile>,
	pub auto_saved: bool,
	pub description: String,
}

impl WorkspaceSnapshot {
	pub fn file_count(&self) -> usize {
		self.files.len() + self.anvil_files.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::{FileStatus, ObjectKind};

	#[test]
	fn test_content_round_trip() {
		let state = FileState {
			path: "notes.txt".into(),
			status: FileStatus::Modified,
			base_hash: ObjectHash::compute(ObjectKind::Blob, b"old"),
			working_hash: ObjectHash::compute(ObjectKind::Blob, b"new"),
			size: 3,
			mtime: 0,
			on_anvil: false,
		};
		let file = SnapshotFile::new(state, Some(b"new"));
		assert_eq!(file.content_bytes().unwrap(), b"new");
	}

	#[test]
	fn test_deleted_files_have_no_content() {
		let mut state = FileState::clean("gone.txt", ObjectHash::compute(ObjectKind::Blob, b"x"), 1, 0);
		state.working_hash = ObjectHash::ZERO;
		state.derive_status();
		let file = SnapshotFile::new(state, None);
		assert!(file.content_bytes().is_none());
	}
}
