//! Workspace engine
//!
//! Everything between the filesystem and the object model: scanning the
//! working directory, the anvil (staging set), candidate-tree assembly,
//! the seal pipeline, per-timeline state persistence, restore, and the
//! auto-preservation that makes timeline switches lossless.

pub mod ignore;
pub mod snapshots;

pub use ignore::{IgnoreSet, IGNORE_FILE};
pub use snapshots::SnapshotManager;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
	Blob, FileState, FileStatus, Identity, ObjectHash, ObjectKind, Seal, SnapshotFile, Tree,
	TreeEntry, WorkspaceSnapshot,
};
use crate::error::{CoreError, Result};
use crate::index::SealIndex;
use crate::position::PositionManager;
use crate::refs::{MemorableNameGenerator, ReferenceRegistry};
use crate::shared::fs::{read_json, write_json_atomic};
use crate::shared::Clock;
use crate::store::{ObjectStore, TypedStore};
use crate::timeline::TimelineManager;

const FILE_MODE: u32 = 0o100644;

/// In-memory workspace state for the current timeline
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
struct WorkspaceState {
	files: BTreeMap<String, FileState>,
	anvil_files: BTreeMap<String, FileState>,
}

/// Result of a successful seal
#[derive(Debug, Clone)]
pub struct SealOutcome {
	pub hash: ObjectHash,
	pub tree: ObjectHash,
	pub memorable_name: String,
	pub iteration: u64,
}

/// Read-only status summary for the CLI
#[derive(Debug, Clone)]
pub struct WorkspaceStatus {
	pub timeline: String,
	pub head: ObjectHash,
	pub files: Vec<FileState>,
	pub anvil_files: Vec<FileState>,
}

impl WorkspaceStatus {
	pub fn is_clean(&self) -> bool {
		self.anvil_files.is_empty() && self.files.iter().all(|f| !f.is_dirty())
	}
}

pub struct WorkspaceEngine {
	root: PathBuf,
	vcs_dir: PathBuf,
	state: RwLock<WorkspaceState>,
	ignore: RwLock<IgnoreSet>,
	store: Arc<dyn ObjectStore>,
	index: Arc<dyn SealIndex>,
	registry: Arc<ReferenceRegistry>,
	generator: Arc<MemorableNameGenerator>,
	timelines: Arc<TimelineManager>,
	positions: Arc<PositionManager>,
	snapshots: Arc<SnapshotManager>,
	clock: Arc<dyn Clock>,
	user: Identity,
}

impl WorkspaceEngine {
	#[allow(clippy::too_many_arguments)]
	pub async fn open(
		root: PathBuf,
		vcs_dir: PathBuf,
		store: Arc<dyn ObjectStore>,
		index: Arc<dyn SealIndex>,
		registry: Arc<ReferenceRegistry>,
		generator: Arc<MemorableNameGenerator>,
		timelines: Arc<TimelineManager>,
		positions: Arc<PositionManager>,
		snapshots: Arc<SnapshotManager>,
		clock: Arc<dyn Clock>,
		user: Identity,
	) -> Result<Self> {
		let ignore = IgnoreSet::load(&root).await?;
		let engine = Self {
			root,
			vcs_dir,
			state: RwLock::new(WorkspaceState::default()),
			ignore: RwLock::new(ignore),
			store,
			index,
			registry,
			generator,
			timelines,
			positions,
			snapshots,
			clock,
			user,
		};
		let timeline = engine.timelines.current().await;
		engine.load_state(&timeline).await?;
		Ok(engine)
	}

	fn state_path(&self, timeline: &str) -> PathBuf {
		self.vcs_dir.join("workspace").join(format!("{timeline}.json"))
	}

	/// Persist the current timeline's file-state maps.
	pub async fn save_state(&self, timeline: &str) -> Result<()> {
		let state = self.state.read().await;
		write_json_atomic(&self.state_path(timeline), &*state).await
	}

	/// Replace in-memory state with the maps persisted for `timeline`.
	pub async fn load_state(&self, timeline: &str) -> Result<()> {
		let path = self.state_path(timeline);
		let loaded: WorkspaceState = if path.exists() {
			read_json(&path).await?
		} else {
			WorkspaceState::default()
		};
		*self.state.write().await = loaded;
		Ok(())
	}

	// --- scanning ---------------------------------------------------------

	/// Walk the working directory and refresh every file's status. Content
	/// is only rehashed when (size, mtime) changed since the last scan.
	pub async fn scan(&self) -> Result<WorkspaceStatus> {
		let on_disk = self.walk_working_directory().await?;
		let mut state = self.state.write().await;

		for (relative, (size, mtime)) in &on_disk {
			let known = state
				.files
				.get(relative)
				.or_else(|| state.anvil_files.get(relative));
			let needs_hash = match known {
				Some(existing) => existing.size != *size || existing.mtime != *mtime,
				None => true,
			};
			if !needs_hash {
				continue;
			}

			let bytes = self.read_working_file(relative).await?;
			let working_hash = ObjectHash::compute(ObjectKind::Blob, &bytes);

			if let Some(entry) = state.anvil_files.get_mut(relative) {
				// Gathered files track fresh content but stay on the anvil.
				entry.working_hash = working_hash;
				entry.size = *size;
				entry.mtime = *mtime;
				continue;
			}

			let entry = state.files.entry(relative.clone()).or_insert_with(|| FileState {
				path: relative.clone(),
				status: FileStatus::Added,
				base_hash: ObjectHash::ZERO,
				working_hash,
				size: *size,
				mtime: *mtime,
				on_anvil: false,
			});
			entry.working_hash = working_hash;
			entry.size = *size;
			entry.mtime = *mtime;
			entry.derive_status();
		}

		// Tracked files that vanished from disk.
		let missing: Vec<String> = state
			.files
			.keys()
			.chain(state.anvil_files.keys())
			.filter(|path| !on_disk.contains_key(*path))
			.cloned()
			.collect();
		for path in missing {
			let untracked_add = state
				.files
				.get(&path)
				.map(|entry| entry.base_hash.is_zero())
				.unwrap_or(false);
			if untracked_add {
				// An added file that disappeared is simply untracked again.
				state.files.remove(&path);
				continue;
			}
			if let Some(entry) = state.files.get_mut(&path) {
				entry.working_hash = ObjectHash::ZERO;
				entry.derive_status();
			} else if let Some(entry) = state.anvil_files.get_mut(&path) {
				entry.working_hash = ObjectHash::ZERO;
			}
		}

		drop(state);
		let timeline = self.timelines.current().await;
		self.save_state(&timeline).await?;
		self.status().await
	}

	async fn walk_working_directory(&self) -> Result<BTreeMap<String, (u64, i64)>> {
		let ignore = self.ignore.read().await;
		let mut found = BTreeMap::new();
		let mut queue = vec![self.root.clone()];

		while let Some(dir) = queue.pop() {
			let mut entries = match tokio::fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(e) => return Err(CoreError::io(&dir, e)),
			};
			while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::io(&dir, e))? {
				let path = entry.path();
				if path == self.vcs_dir {
					continue;
				}
				let Some(relative) = self.relative_path(&path) else {
					continue;
				};
				if ignore.is_ignored(&relative) {
					continue;
				}
				let meta = entry.metadata().await.map_err(|e| CoreError::io(&path, e))?;
				if meta.is_dir() {
					queue.push(path);
				} else if meta.is_file() {
					found.insert(relative, (meta.len(), mtime_seconds(&meta)));
				}
			}
		}
		Ok(found)
	}

	fn relative_path(&self, path: &Path) -> Option<String> {
		path.strip_prefix(&self.root)
			.ok()
			.map(|p| p.to_string_lossy().replace('\\', "/"))
	}

	async fn read_working_file(&self, relative: &str) -> Result<Vec<u8>> {
		let path = self.root.join(relative);
		tokio::fs::read(&path).await.map_err(|e| CoreError::io(path, e))
	}

	// --- the anvil --------------------------------------------------------

	/// Stage files matching the patterns. Only dirty files move; an
	/// unmodified file has nothing to put on the anvil.
	pub async fn gather(&self, patterns: &[String]) -> Result<Vec<String>> {
		let matcher = build_matcher(patterns)?;
		let mut state = self.state.write().await;
		let matching: Vec<String> = state
			.files
			.iter()
			.filter(|(path, file)| file.is_dirty() && matches_pattern(&matcher, path))
			.map(|(path, _)| path.clone())
			.collect();

		for path in &matching {
			let mut entry = state.files.remove(path).expect("path listed above");
			entry.status = FileStatus::Gathered;
			entry.on_anvil = true;
			state.anvil_files.insert(path.clone(), entry);
		}
		drop(state);

		let timeline = self.timelines.current().await;
		self.save_state(&timeline).await?;
		debug!(count = matching.len(), "gathered files onto the anvil");
		Ok(matching)
	}

	/// Take matching files back off the anvil.
	pub async fn discard(&self, patterns: &[String]) -> Result<Vec<String>> {
		let matcher = build_matcher(patterns)?;
		let mut state = self.state.write().await;
		let matching: Vec<String> = state
			.anvil_files
			.keys()
			.filter(|path| matches_pattern(&matcher, path))
			.cloned()
			.collect();

		for path in &matching {
			let mut entry = state.anvil_files.remove(path).expect("path listed above");
			entry.on_anvil = false;
			entry.derive_status();
			state.files.insert(path.clone(), entry);
		}
		drop(state);

		let timeline = self.timelines.current().await;
		self.save_state(&timeline).await?;
		debug!(count = matching.len(), "discarded files from the anvil");
		Ok(matching)
	}

	pub async fn discard_all(&self) -> Result<Vec<String>> {
		self.discard(&["**".to_string()]).await
	}

	// --- candidate tree ---------------------------------------------------

	/// The tree the next seal would name: anvil content layered over the
	/// sealed base, with staged deletions dropped.
	pub async fn build_candidate_tree(&self) -> Result<Tree> {
		let state = self.state.read().await;
		let targets = candidate_targets(&state);
		drop(state);
		let (_, mut trees) = build_tree_objects(&targets)?;
		// Children are pushed first; the root is always last.
		trees
			.pop()
			.ok_or_else(|| CoreError::state("candidate tree assembly produced no root"))
	}

	// --- sealing ----------------------------------------------------------

	/// The atomic seal pipeline. Object writes happen first; any failure
	/// after them leaves garbage-collectable objects but neither the head,
	/// the position nor the anvil moves.
	pub async fn seal(&self, message: &str) -> Result<SealOutcome> {
		if message.trim().is_empty() {
			return Err(CoreError::invalid("message", "seal message must not be empty"));
		}
		let timeline = self.timelines.current().await;

		// 1. Snapshot the anvil and read staged content.
		let state = self.state.read().await;
		if state.anvil_files.is_empty() {
			return Err(CoreError::state(
				"nothing gathered: the anvil is empty".to_string(),
			));
		}
		let staged: Vec<FileState> = state.anvil_files.values().cloned().collect();
		let targets = candidate_targets(&state);
		drop(state);

		// 2. Write blobs for staged content.
		let mut staged_hashes: BTreeMap<String, ObjectHash> = BTreeMap::new();
		for file in &staged {
			if file.working_hash.is_zero() {
				continue; // staged deletion
			}
			let bytes = self.read_working_file(&file.path).await?;
			let blob = Blob::new(bytes);
			let hash = self.store.put(ObjectKind::Blob, &blob.encode()).await?;
			self.index
				.index_object(hash, ObjectKind::Blob, blob.data.len() as u64)
				.await?;
			staged_hashes.insert(file.path.clone(), hash);
		}

		// Staged content may have moved since the last scan; the sealed
		// tree names what is actually on disk now.
		let mut targets = targets;
		for (path, hash) in &staged_hashes {
			targets.insert(path.clone(), *hash);
		}

		// 3. Write trees, children before parents.
		let (tree_hash, trees) = build_tree_objects(&targets)?;
		for tree in &trees {
			let body = tree.encode();
			let hash = self.store.put(ObjectKind::Tree, &body).await?;
			self.index.index_tree(hash, tree).await?;
			self.index
				.index_object(hash, ObjectKind::Tree, body.len() as u64)
				.await?;
		}

		// 4. Assemble the seal.
		let head = self.timelines.get_head(&timeline).await?;
		let parents = if head.is_zero() { vec![] } else { vec![head] };
		let taken = self.registry.taken_names().await;
		let memorable_name = self.generator.generate(&taken)?;
		let iteration = self.registry.next_iteration(&timeline).await?;
		let seal = Seal {
			tree: tree_hash,
			parents,
			author: self.user.clone(),
			committer: self.user.clone(),
			timestamp: self.clock.now().timestamp(),
			message: message.to_string(),
			memorable_name: memorable_name.clone(),
			iteration,
			overwrites: vec![],
		};

		// 5. Seal object, then index, then head, then position.
		let body = seal.encode();
		let seal_hash = self.store.put(ObjectKind::Seal, &body).await?;
		self.index
			.index_object(seal_hash, ObjectKind::Seal, body.len() as u64)
			.await?;
		self.index.index_seal(seal_hash, &seal).await?;
		self.timelines.update_head(&timeline, seal_hash).await?;
		self.positions.set_position(&timeline, seal_hash).await?;
		self.registry
			.register_memorable_name(&memorable_name, seal_hash, &self.user.name)
			.await?;
		self.positions
			.record_name(&memorable_name, seal_hash, &self.user.name)
			.await?;

		// 6. Clear the anvil; sealed files become the new base.
		let mut state = self.state.write().await;
		for file in staged {
			let path = file.path.clone();
			state.anvil_files.remove(&path);
			if file.working_hash.is_zero() && !staged_hashes.contains_key(&path) {
				state.files.remove(&path);
				continue;
			}
			let sealed_hash = staged_hashes
				.get(&path)
				.copied()
				.unwrap_or(file.working_hash);
			let mut entry = file;
			entry.base_hash = sealed_hash;
			entry.working_hash = sealed_hash;
			entry.status = FileStatus::Unmodified;
			entry.on_anvil = false;
			state.files.insert(path, entry);
		}
		drop(state);
		self.save_state(&timeline).await?;

		info!(
			seal = %seal_hash.short(),
			name = %memorable_name,
			iteration,
			timeline = %timeline,
			"sealed"
		);
		Ok(SealOutcome {
			hash: seal_hash,
			tree: tree_hash,
			memorable_name,
			iteration,
		})
	}

	// --- restore ----------------------------------------------------------

	/// Reset the working directory to a sealed tree. Ignored and untracked
	/// files are preserved; tracked files are replaced wholesale.
	pub async fn restore_working_directory(&self, seal_hash: ObjectHash) -> Result<()> {
		let seal = TypedStore::load_seal(self.store.as_ref(), seal_hash).await?;
		self.clear_tracked_files().await?;

		let mut files = BTreeMap::new();
		self.materialize_tree(seal.tree, String::new(), &mut files)
			.await?;

		let mut state = self.state.write().await;
		state.files = files;
		state.anvil_files.clear();
		drop(state);

		let timeline = self.timelines.current().await;
		self.save_state(&timeline).await?;
		info!(seal = %seal_hash.short(), "restored working directory");
		Ok(())
	}

	async fn clear_tracked_files(&self) -> Result<()> {
		let state = self.state.read().await;
		let tracked: Vec<String> = state
			.files
			.keys()
			.chain(state.anvil_files.keys())
			.cloned()
			.collect();
		drop(state);
		for relative in tracked {
			let path = self.root.join(&relative);
			match tokio::fs::remove_file(&path).await {
				Ok(()) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => return Err(CoreError::io(path, e)),
			}
		}
		Ok(())
	}

	fn materialize_tree<'a>(
		&'a self,
		tree_hash: ObjectHash,
		prefix: String,
		files: &'a mut BTreeMap<String, FileState>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let tree = TypedStore::load_tree(self.store.as_ref(), tree_hash).await?;
			for entry in tree.entries() {
				let relative = if prefix.is_empty() {
					entry.name.clone()
				} else {
					format!("{prefix}/{}", entry.name)
				};
				match entry.kind {
					ObjectKind::Tree => {
						let dir = self.root.join(&relative);
						tokio::fs::create_dir_all(&dir)
							.await
							.map_err(|e| CoreError::io(dir, e))?;
						self.materialize_tree(entry.hash, relative, files).await?;
					}
					ObjectKind::Blob => {
						let blob = match TypedStore::load_blob(self.store.as_ref(), entry.hash).await
						{
							Ok(blob) => blob,
							Err(CoreError::NotFound { .. }) => {
								// A tree naming a blob we do not have is a
								// broken repository, not a user mistake.
								return Err(CoreError::corrupt(
									entry.hash,
									format!("blob missing while restoring {relative}"),
								));
							}
							Err(e) => return Err(e),
						};
						let path = self.root.join(&relative);
						if let Some(parent) = path.parent() {
							tokio::fs::create_dir_all(parent)
								.await
								.map_err(|e| CoreError::io(parent, e))?;
						}
						tokio::fs::write(&path, &blob.data)
							.await
							.map_err(|e| CoreError::io(&path, e))?;
						let meta = tokio::fs::metadata(&path)
							.await
							.map_err(|e| CoreError::io(&path, e))?;
						files.insert(
							relative.clone(),
							FileState::clean(
								relative,
								entry.hash,
								blob.data.len() as u64,
								mtime_seconds(&meta),
							),
						);
					}
					other => {
						return Err(CoreError::corrupt(
							tree_hash,
							format!("tree child {relative} has kind {other}"),
						));
					}
				}
			}
			Ok(())
		})
	}

	// --- switching & snapshots --------------------------------------------

	/// Switch timelines, auto-preserving any uncommitted work and
	/// restoring the most recent auto snapshot waiting on the target.
	pub async fn switch_timeline(&self, target: &str) -> Result<()> {
		let current = self.timelines.current().await;
		if current == target {
			return Ok(());
		}
		if !self.timelines.exists(target).await {
			return Err(CoreError::not_found("timeline", target));
		}

		self.scan().await?;
		if self.is_dirty().await {
			let snapshot = self
				.capture_snapshot(None, &format!("auto-preserve before switch to {target}"), true)
				.await?;
			debug!(snapshot = %snapshot.id, "auto-preserved dirty workspace");
		}
		self.save_state(&current).await?;

		self.timelines.switch(target).await?;
		let head = self.timelines.get_head(target).await?;
		if head.is_zero() {
			self.clear_tracked_files().await?;
			let mut state = self.state.write().await;
			state.files.clear();
			state.anvil_files.clear();
			drop(state);
			self.save_state(target).await?;
		} else {
			self.restore_working_directory(head).await?;
		}

		if let Some(snapshot) = self.snapshots.latest_auto_for(target).await? {
			self.apply_snapshot(&snapshot).await?;
			self.snapshots.delete(snapshot.id).await?;
			info!(snapshot = %snapshot.id, "restored auto-preserved work");
		}

		self.positions.set_position(target, head).await?;
		info!(from = %current, to = %target, "switched timeline");
		Ok(())
	}

	pub async fn is_dirty(&self) -> bool {
		let state = self.state.read().await;
		!state.anvil_files.is_empty() || state.files.values().any(|f| f.is_dirty())
	}

	/// Capture dirty files and the anvil, content included.
	pub async fn capture_snapshot(
		&self,
		name: Option<String>,
		description: &str,
		auto_saved: bool,
	) -> Result<WorkspaceSnapshot> {
		let timeline = self.timelines.current().await;
		let position = match self.positions.current().await {
			Some(position) => position.hash,
			None => self.timelines.get_head(&timeline).await?,
		};

		let state = self.state.read().await;
		let dirty: Vec<FileState> = state.files.values().filter(|f| f.is_dirty()).cloned().collect();
		let staged: Vec<FileState> = state.anvil_files.values().cloned().collect();
		drop(state);

		let mut files = BTreeMap::new();
		for file in dirty {
			let content = self.snapshot_content(&file).await?;
			files.insert(file.path.clone(), SnapshotFile::new(file, content.as_deref()));
		}
		let mut anvil_files = BTreeMap::new();
		for file in staged {
			let content = self.snapshot_content(&file).await?;
			anvil_files.insert(file.path.clone(), SnapshotFile::new(file, content.as_deref()));
		}

		let snapshot = WorkspaceSnapshot {
			id: Uuid::new_v4(),
			name,
			timeline,
			position,
			timestamp: self.clock.now(),
			files,
			anvil_files,
			auto_saved,
			description: description.to_string(),
		};
		self.snapshots.save(&snapshot).await?;
		Ok(snapshot)
	}

	async fn snapshot_content(&self, file: &FileState) -> Result<Option<Vec<u8>>> {
		if file.working_hash.is_zero() {
			return Ok(None);
		}
		Ok(Some(self.read_working_file(&file.path).await?))
	}

	/// Write a snapshot's contents back into the working directory and
	/// adopt its file states.
	pub async fn apply_snapshot(&self, snapshot: &WorkspaceSnapshot) -> Result<()> {
		let mut state = self.state.write().await;
		for (collection, staged) in [(&snapshot.files, false), (&snapshot.anvil_files, true)] {
			for (relative, file) in collection {
				match file.content_bytes() {
					Some(bytes) => {
						let path = self.root.join(relative);
						if let Some(parent) = path.parent() {
							tokio::fs::create_dir_all(parent)
								.await
								.map_err(|e| CoreError::io(parent, e))?;
						}
						tokio::fs::write(&path, &bytes)
							.await
							.map_err(|e| CoreError::io(&path, e))?;
					}
					None => {
						let path = self.root.join(relative);
						match tokio::fs::remove_file(&path).await {
							Ok(()) => {}
							Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
							Err(e) => return Err(CoreError::io(path, e)),
						}
					}
				}
				let mut entry = file.state.clone();
				entry.on_anvil = staged;
				if staged {
					state.files.remove(relative);
					state.anvil_files.insert(relative.clone(), entry);
				} else {
					state.anvil_files.remove(relative);
					state.files.insert(relative.clone(), entry);
				}
			}
		}
		drop(state);
		let timeline = self.timelines.current().await;
		self.save_state(&timeline).await?;
		Ok(())
	}

	// --- ignores & status -------------------------------------------------

	/// Reload `.forgeignore` and synchronously drop newly ignored files
	/// from the anvil.
	pub async fn refresh_ignores(&self) -> Result<()> {
		let fresh = IgnoreSet::load(&self.root).await?;
		let mut state = self.state.write().await;

		let newly_ignored: Vec<String> = state
			.anvil_files
			.keys()
			.filter(|path| fresh.is_ignored(path))
			.cloned()
			.collect();
		for path in newly_ignored {
			if let Some(mut entry) = state.anvil_files.remove(&path) {
				warn!(path = %path, "file left the anvil: now ignored");
				entry.on_anvil = false;
				entry.status = FileStatus::Unmodified;
				state.files.insert(path, entry);
			}
		}
		for (path, entry) in state.files.iter_mut() {
			if fresh.is_ignored(path.as_str()) {
				entry.status = FileStatus::Unmodified;
			}
		}
		drop(state);

		*self.ignore.write().await = fresh;
		let timeline = self.timelines.current().await;
		self.save_state(&timeline).await?;
		Ok(())
	}

	pub async fn status(&self) -> Result<WorkspaceStatus> {
		let timeline = self.timelines.current().await;
		let head = self.timelines.get_head(&timeline).await?;
		let state = self.state.read().await;
		Ok(WorkspaceStatus {
			timeline,
			head,
			files: state.files.values().cloned().collect(),
			anvil_files: state.anvil_files.values().cloned().collect(),
		})
	}
}

fn mtime_seconds(meta: &std::fs::Metadata) -> i64 {
	meta.modified()
		.ok()
		.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

/// The paths and blob hashes the next seal will name: anvil over base.
fn candidate_targets(state: &WorkspaceState) -> BTreeMap<String, ObjectHash> {
	let mut targets = BTreeMap::new();
	for (path, file) in &state.files {
		if !file.base_hash.is_zero() {
			targets.insert(path.clone(), file.base_hash);
		}
	}
	for (path, file) in &state.anvil_files {
		if file.working_hash.is_zero() {
			targets.remove(path);
		} else {
			targets.insert(path.clone(), file.working_hash);
		}
	}
	targets
}

fn build_matcher(patterns: &[String]) -> Result<GlobSet> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		// "." and "all" are the CLI's everything shorthands.
		let normalized = if pattern == "." || pattern == "all" {
			"**"
		} else {
			pattern.as_str()
		};
		let glob = Glob::new(normalized)
			.map_err(|e| CoreError::invalid("pattern", format!("{pattern}: {e}")))?;
		builder.add(glob);
	}
	builder
		.build()
		.map_err(|e| CoreError::invalid("pattern", e.to_string()))
}

fn matches_pattern(set: &GlobSet, path: &str) -> bool {
	if set.is_match(path) {
		return true;
	}
	path.rsplit('/').next().map(|name| set.is_match(name)).unwrap_or(false)
}

/// Assemble the nested tree objects naming `targets`, children before
/// parents, returning the root hash. Shared by the seal pipeline and the
/// fuse coordinator's merge-tree construction.
pub(crate) fn build_tree_objects(
	targets: &BTreeMap<String, ObjectHash>,
) -> Result<(ObjectHash, Vec<Tree>)> {
	let node = DirNode::from_targets(targets);
	let mut trees = Vec::new();
	let root = node.compute(&mut trees)?;
	Ok((root, trees))
}

/// Nested directory plan for candidate-tree assembly
#[derive(Default)]
struct DirNode {
	files: BTreeMap<String, ObjectHash>,
	dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
	fn from_targets(targets: &BTreeMap<String, ObjectHash>) -> Self {
		let mut root = DirNode::default();
		for (path, hash) in targets {
			let mut node = &mut root;
			let mut parts = path.split('/').peekable();
			while let Some(part) = parts.next() {
				if parts.peek().is_some() {
					node = node.dirs.entry(part.to_string()).or_default();
				} else {
					node.files.insert(part.to_string(), *hash);
				}
			}
		}
		root
	}

	/// Compute every tree bottom-up, children pushed before parents, and
	/// return the root hash.
	fn compute(&self, out: &mut Vec<Tree>) -> Result<ObjectHash> {
		let mut entries = Vec::new();
		for (name, child) in &self.dirs {
			let child_hash = child.compute(out)?;
			entries.push(TreeEntry::dir(name.clone(), child_hash));
		}
		for (name, hash) in &self.files {
			entries.push(TreeEntry::file(name.clone(), FILE_MODE, *hash));
		}
		let tree = Tree::new(entries)
			.map_err(|e| CoreError::invalid("tree", e.to_string()))?;
		let hash = tree.hash();
		out.push(tree);
		Ok(hash)
	}
}
