//! Forge core
//!
//! The engine behind a human-centered version control system: a
//! content-addressed object store, a relational index over seals, named
//! timelines with per-timeline positions, natural-language reference
//! resolution, the anvil workspace, accountable history reshaping, and a
//! local sync/fuse coordinator. Command-line surface, rendering and
//! network transport live outside this crate and talk to [`Repository`].

pub mod config;
pub mod domain;
pub mod error;
pub mod fuse;
pub mod index;
pub mod position;
pub mod refs;
pub mod reshape;
pub mod shared;
pub mod store;
pub mod timeline;
pub mod workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::RepoConfig;
use crate::domain::{Identity, ObjectHash, WorkspaceSnapshot};
use crate::error::{CoreError, Result};
use crate::fuse::{
	FuseCoordinator, ImportConfig, PortalRegistry, PortalTransport, SyncAction, SyncOptions,
	SyncOutcome,
};
use crate::index::{SealIndex, SealRecord, SqliteIndex};
use crate::position::{Position, PositionManager};
use crate::refs::{MemorableNameGenerator, ReferenceRegistry, ReferenceResolver};
use crate::reshape::{
	ArchiveEntry, JsonOverwriteTracker, OverwriteRecord, ReshapeEngine, ReshapeOutcome,
	ReshapeRequest,
};
use crate::shared::fs::read_json;
use crate::shared::{Clock, SystemClock};
use crate::store::gc::{collect_garbage, GcReport, GcRoots};
use crate::store::{FsObjectStore, ObjectStore};
use crate::timeline::TimelineManager;
use crate::workspace::{SealOutcome, SnapshotManager, WorkspaceEngine, WorkspaceStatus};

/// Name of the repository metadata directory
pub const VCS_DIR: &str = ".forge";

/// The repository façade. Owns every manager; cross-references between
/// managers go through capability traits, never back-pointers.
pub struct Repository {
	root: PathBuf,
	vcs_dir: PathBuf,
	pub config: Arc<RwLock<RepoConfig>>,
	pub store: Arc<dyn ObjectStore>,
	pub index: Arc<dyn SealIndex>,
	pub timelines: Arc<TimelineManager>,
	pub positions: Arc<PositionManager>,
	pub registry: Arc<ReferenceRegistry>,
	pub resolver: Arc<ReferenceResolver>,
	pub workspace: Arc<WorkspaceEngine>,
	pub snapshots: Arc<SnapshotManager>,
	pub tracker: Arc<JsonOverwriteTracker>,
	pub reshape: Arc<ReshapeEngine>,
	pub fuse: Arc<FuseCoordinator>,
	pub portals: Arc<PortalRegistry>,
	clock: Arc<dyn Clock>,
}

impl Repository {
	/// Forge a new repository at `root`.
	pub async fn init(root: impl Into<PathBuf>, user: Identity) -> Result<Self> {
		Self::init_with_clock(root, user, Arc::new(SystemClock)).await
	}

	/// Forge with an injected clock (tests, replay tooling).
	pub async fn init_with_clock(
		root: impl Into<PathBuf>,
		user: Identity,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		if !user.is_valid() {
			return Err(CoreError::invalid("identity", "name must not be empty"));
		}
		let root = root.into();
		let vcs_dir = root.join(VCS_DIR);
		if vcs_dir.exists() {
			return Err(CoreError::already_exists(
				"repository",
				vcs_dir.display().to_string(),
			));
		}
		tokio::fs::create_dir_all(&vcs_dir)
			.await
			.map_err(|e| CoreError::io(&vcs_dir, e))?;

		let config = RepoConfig::new(user);
		config.save(&vcs_dir).await?;

		info!(root = %root.display(), "forged new repository");
		Self::assemble(root, config, clock, true).await
	}

	/// Open an existing repository.
	pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
		Self::open_with_clock(root, Arc::new(SystemClock)).await
	}

	pub async fn open_with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
		let root = root.into();
		let vcs_dir = root.join(VCS_DIR);
		if !vcs_dir.exists() {
			return Err(CoreError::not_found(
				"repository",
				vcs_dir.display().to_string(),
			));
		}
		let config = RepoConfig::load(&vcs_dir).await?;
		Self::assemble(root, config, clock, false).await
	}

	async fn assemble(
		root: PathBuf,
		config: RepoConfig,
		clock: Arc<dyn Clock>,
		fresh: bool,
	) -> Result<Self> {
		let vcs_dir = root.join(VCS_DIR);
		let user = config.user.clone();

		// 1. Object store and index.
		let store: Arc<dyn ObjectStore> =
			Arc::new(FsObjectStore::open(vcs_dir.join("objects")).await?);
		let index = Arc::new(SqliteIndex::open(&vcs_dir.join("index.db")).await?);
		let index_dyn: Arc<dyn SealIndex> = index;

		// 2. Timelines, positions, references.
		let timelines_path = vcs_dir.join("timelines.json");
		let timelines = Arc::new(if fresh {
			TimelineManager::initialize(timelines_path, index_dyn.clone(), clock.clone()).await?
		} else {
			TimelineManager::load(timelines_path, index_dyn.clone(), clock.clone()).await?
		});

		let position_path = vcs_dir.join("position").join("config.json");
		let positions = Arc::new(if fresh {
			PositionManager::initialize(position_path, clock.clone()).await?
		} else {
			PositionManager::load(position_path, clock.clone()).await?
		});

		let references_path = vcs_dir.join("references.json");
		let registry = Arc::new(if fresh {
			ReferenceRegistry::initialize(references_path, clock.clone()).await?
		} else {
			ReferenceRegistry::load(references_path, clock.clone()).await?
		});

		let generator = Arc::new(MemorableNameGenerator::new());

		// 3. The resolver sees the index, heads and registry as capabilities.
		let resolver = Arc::new(ReferenceResolver::new(
			registry.clone(),
			index_dyn.clone(),
			timelines.clone(),
			clock.clone(),
			user.clone(),
		));

		// 4. Workspace, snapshots, reshape, fuse, portals.
		let snapshots = Arc::new(SnapshotManager::new(vcs_dir.join("snapshots")));
		let workspace = Arc::new(
			WorkspaceEngine::open(
				root.clone(),
				vcs_dir.clone(),
				store.clone(),
				index_dyn.clone(),
				registry.clone(),
				generator.clone(),
				timelines.clone(),
				positions.clone(),
				snapshots.clone(),
				clock.clone(),
				user.clone(),
			)
			.await?,
		);

		let tracker = Arc::new(
			JsonOverwriteTracker::open(
				vcs_dir.join("overwrites"),
				vcs_dir.join("overwrite-config.json"),
				clock.clone(),
			)
			.await?,
		);
		let reshape = Arc::new(ReshapeEngine::new(
			store.clone(),
			index_dyn.clone(),
			registry.clone(),
			generator.clone(),
			timelines.clone(),
			positions.clone(),
			tracker.clone(),
			clock.clone(),
			user.clone(),
			vcs_dir.join("archive"),
		));

		let import_config = ImportConfig {
			workers: config.import.workers,
			blob_batch: config.import.blob_batch,
			seal_batch: config.import.seal_batch,
			chunk_threshold: config.chunk_threshold,
		};
		let fuse = Arc::new(FuseCoordinator::new(
			store.clone(),
			index_dyn.clone(),
			registry.clone(),
			generator,
			timelines.clone(),
			positions.clone(),
			clock.clone(),
			user,
			import_config,
		));

		let portals = Arc::new(PortalRegistry::open(vcs_dir.join("portals.json")).await?);

		Ok(Self {
			root,
			vcs_dir,
			config: Arc::new(RwLock::new(config)),
			store,
			index: index_dyn,
			timelines,
			positions,
			registry,
			resolver,
			workspace,
			snapshots,
			tracker,
			reshape,
			fuse,
			portals,
			clock,
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn vcs_dir(&self) -> &Path {
		&self.vcs_dir
	}

	// --- session operations ----------------------------------------------

	/// Rescan the working directory and report status.
	pub async fn status(&self) -> Result<WorkspaceStatus> {
		self.workspace.scan().await
	}

	/// Stage matching files onto the anvil.
	pub async fn gather(&self, patterns: &[String]) -> Result<Vec<String>> {
		self.workspace.scan().await?;
		self.workspace.gather(patterns).await
	}

	pub async fn discard(&self, patterns: &[String]) -> Result<Vec<String>> {
		self.workspace.discard(patterns).await
	}

	pub async fn discard_all(&self) -> Result<Vec<String>> {
		self.workspace.discard_all().await
	}

	/// Seal the anvil into a new commit on the current timeline.
	pub async fn seal(&self, message: &str) -> Result<SealOutcome> {
		self.workspace.seal(message).await
	}

	/// Switch timelines with auto-preservation.
	pub async fn switch_timeline(&self, name: &str) -> Result<()> {
		self.workspace.switch_timeline(name).await
	}

	/// Resolve a free-form reference. The resolver's precedence chain runs
	/// first; position-local forms (the empty reference, visit-history
	/// indexes) answer what the chain cannot.
	pub async fn resolve(&self, reference: &str) -> Result<ObjectHash> {
		let trimmed = reference.trim();
		if trimmed.is_empty() || trimmed == "position" || trimmed == "current" {
			return self
				.positions
				.parse_reference(trimmed)
				.await?
				.ok_or_else(|| CoreError::not_found("reference", reference));
		}
		let current = self.timelines.current().await;
		match self.resolver.resolve(trimmed, &current).await {
			Ok(hash) => Ok(hash),
			Err(CoreError::NotFound { .. }) => self
				.positions
				.parse_reference(trimmed)
				.await?
				.ok_or_else(|| CoreError::not_found("reference", reference)),
			Err(e) => Err(e),
		}
	}

	/// Move the position to a reference without touching the timeline head.
	pub async fn jump(&self, reference: &str) -> Result<Position> {
		let hash = self.resolve(reference).await?;
		let timeline = self.timelines.current().await;
		self.positions.set_position(&timeline, hash).await
	}

	/// Materialize a sealed tree into the working directory.
	pub async fn restore(&self, reference: &str) -> Result<ObjectHash> {
		let hash = self.resolve(reference).await?;
		self.workspace.restore_working_directory(hash).await?;
		Ok(hash)
	}

	/// Recent history of the current timeline, newest first.
	pub async fn log(&self, limit: Option<usize>) -> Result<Vec<SealRecord>> {
		let limit = match limit {
			Some(limit) => limit,
			None => self.config.read().await.history_limit,
		};
		let head = self.timelines.current_head().await?;
		self.index.get_seal_history(head, limit).await
	}

	/// Register a custom alias in both the registry and the position map.
	pub async fn add_alias(&self, alias: &str, reference: &str) -> Result<ObjectHash> {
		let hash = self.resolve(reference).await?;
		self.registry.register_alias(alias, hash).await?;
		self.positions.add_alias(alias, hash).await?;
		Ok(hash)
	}

	pub async fn refresh_ignores(&self) -> Result<()> {
		self.workspace.refresh_ignores().await
	}

	// --- shelf (named snapshots) ------------------------------------------

	pub async fn shelf_create(
		&self,
		name: &str,
		description: &str,
	) -> Result<WorkspaceSnapshot> {
		self.workspace.scan().await?;
		self.workspace
			.capture_snapshot(Some(name.to_string()), description, false)
			.await
	}

	pub async fn shelf_list(&self) -> Result<Vec<WorkspaceSnapshot>> {
		self.snapshots.list().await
	}

	pub async fn shelf_restore(&self, key: &str) -> Result<WorkspaceSnapshot> {
		let snapshot = self.snapshots.find(key).await?;
		self.workspace.apply_snapshot(&snapshot).await?;
		Ok(snapshot)
	}

	pub async fn shelf_delete(&self, key: &str) -> Result<()> {
		let snapshot = self.snapshots.find(key).await?;
		self.snapshots.delete(snapshot.id).await
	}

	// --- reshape ----------------------------------------------------------

	pub async fn reshape(&self, request: ReshapeRequest) -> Result<ReshapeOutcome> {
		self.reshape.reshape(request).await
	}

	pub async fn approve_reshape(&self, id: Uuid, approver: &str) -> Result<OverwriteRecord> {
		self.reshape.approve(id, approver).await
	}

	pub async fn reject_reshape(
		&self,
		id: Uuid,
		rejector: &str,
		reason: &str,
	) -> Result<OverwriteRecord> {
		self.reshape.reject(id, rejector, reason).await
	}

	pub async fn protect(&self, reference: &str) -> Result<ObjectHash> {
		use crate::reshape::OverwriteTracker;
		let hash = self.resolve(reference).await?;
		self.tracker.set_protected(hash, true).await?;
		Ok(hash)
	}

	pub async fn unprotect(&self, reference: &str) -> Result<ObjectHash> {
		use crate::reshape::OverwriteTracker;
		let hash = self.resolve(reference).await?;
		self.tracker.set_protected(hash, false).await?;
		Ok(hash)
	}

	pub async fn export_audit(&self) -> Result<serde_json::Value> {
		use crate::reshape::OverwriteTracker;
		self.tracker.export_audit().await
	}

	// --- sync -------------------------------------------------------------

	/// Pull a remote timeline through `transport` and reconcile.
	pub async fn sync(
		&self,
		transport: &dyn PortalTransport,
		options: &SyncOptions,
	) -> Result<SyncOutcome> {
		self.workspace.scan().await?;
		let dirty = self.workspace.is_dirty().await;
		let outcome = self.fuse.sync(transport, options, dirty).await?;

		// Landing on the current timeline also refreshes the working tree.
		let advanced = matches!(outcome.action, SyncAction::FastForward | SyncAction::Merged);
		if advanced && self.timelines.current().await == options.local_timeline {
			self.workspace
				.restore_working_directory(outcome.new_head)
				.await?;
		}
		Ok(outcome)
	}

	pub async fn push(&self, transport: &dyn PortalTransport, timeline: &str) -> Result<usize> {
		self.fuse.push(transport, timeline).await
	}

	// --- garbage collection ----------------------------------------------

	/// Remove objects unreachable from any timeline head, snapshot or
	/// overwrite archive.
	pub async fn gc(&self, dry_run: bool) -> Result<GcReport> {
		let roots = self.gc_roots().await?;
		collect_garbage(self.store.as_ref(), &roots, dry_run).await
	}

	async fn gc_roots(&self) -> Result<GcRoots> {
		use crate::reshape::OverwriteTracker;
		let mut roots = GcRoots::default();

		for timeline in self.timelines.list().await {
			roots.seals.push(timeline.head);
		}
		if let Some(position) = self.positions.current().await {
			roots.seals.push(position.hash);
		}
		for position in self.positions.history().await {
			roots.seals.push(position.hash);
		}
		roots.seals.extend(self.registry.reference_hashes().await);

		for record in self.tracker.list().await? {
			roots.seals.push(record.original_hash);
			roots.seals.push(record.new_hash);
		}
		roots.seals.extend(self.archived_hashes().await?);

		for snapshot in self.snapshots.list().await? {
			for file in snapshot.files.values().chain(snapshot.anvil_files.values()) {
				roots.blobs.push(file.state.base_hash);
				roots.blobs.push(file.state.working_hash);
			}
		}
		Ok(roots)
	}

	/// Original-seal hashes pinned by reshape archives.
	async fn archived_hashes(&self) -> Result<Vec<ObjectHash>> {
		let archive_dir = self.vcs_dir.join("archive");
		let mut hashes = Vec::new();
		let mut entries = match tokio::fs::read_dir(&archive_dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(hashes),
			Err(e) => return Err(CoreError::io(&archive_dir, e)),
		};
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| CoreError::io(&archive_dir, e))?
		{
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			let archived: ArchiveEntry = read_json(&path).await?;
			hashes.push(archived.original_hash);
		}
		Ok(hashes)
	}

	pub fn clock(&self) -> Arc<dyn Clock> {
		self.clock.clone()
	}
}
