//! Per-file workspace state

use serde::{Deserialize, Serialize};

use super::hash::ObjectHash;

/// How a working file relates to the sealed base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
	Unmodified,
	Modified,
	Added,
	Deleted,
	/// Staged on the anvil for the next seal
	Gathered,
}

impl std::fmt::Display for FileStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			FileStatus::Unmodified => "unmodified",
			FileStatus::Modified => "modified",
			FileStatus::Added => "added",
			FileStatus::Deleted => "deleted",
			FileStatus::Gathered => "gathered",
		};
		f.write_str(s)
	}
}

/// Tracked state of one working file. Paths are repository-relative with
/// forward slashes regardless of platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
	pub path: String,
	pub status: FileStatus,
	/// Blob hash in the sealed base, zero for files not yet sealed
	pub base_hash: ObjectHash,
	/// Blob hash of current working content, zero for deleted files
	pub working_hash: ObjectHash,
	pub size: u64,
	/// Unix seconds of last modification, used with size for change detection
	pub mtime: i64,
	pub on_anvil: bool,
}

impl FileState {
	/// A file materialized from a seal: base and working content agree.
	pub fn clean(path: impl Into<String>, hash: ObjectHash, size: u64, mtime: i64) -> Self {
		Self {
			path: path.into(),
			status: FileStatus::Unmodified,
			base_hash: hash,
			working_hash: hash,
			size,
			mtime,
			on_anvil: false,
		}
	}

	/// Re-derive status from the base/working hash pair.
	pub fn derive_status(&mut self) {
		self.status = if self.working_hash.is_zero() {
			FileStatus::Deleted
		} else if self.base_hash.is_zero() {
			FileStatus::Added
		} else if self.base_hash == self.working_hash {
			FileStatus::Unmodified
		} else {
			FileStatus::Modified
		};
	}

	pub fn is_dirty(&self) -> bool {
		self.status != FileStatus::Unmodified
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::ObjectKind;

	#[test]
	fn test_derive_status() {
		let a = ObjectHash::compute(ObjectKind::Blob, b"a");
		let b = ObjectHash::compute(ObjectKind::Blob, b"b");

		let mut state = FileState::clean("src/main.rs", a, 1, 0);
		state.derive_status();
		assert_eq!(state.status, FileStatus::Unmodified);

		state.working_hash = b;
		state.derive_status();
		assert_eq!(state.status, FileStatus::Modified);

		state.base_hash = ObjectHash::ZERO;
		state.derive_status();
		assert_eq!(state.status, FileStatus::Added);

		state.working_hash = ObjectHash::ZERO;
		state.derive_status();
		assert_eq!(state.status, FileStatus::Deleted);
	}
}
