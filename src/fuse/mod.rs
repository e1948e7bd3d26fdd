//! Sync/fuse coordinator
//!
//! Merges seals obtained from another repository into local timelines.
//! Transport is a capability; the coordinator only sees fetched objects
//! and a remote head. Fast-forward when the local head is an ancestor of
//! the remote one, a two-parent merge seal otherwise, and nothing moves
//! if any file-level merge conflicts.

pub mod import;
pub mod merge;
pub mod portals;

pub use import::{ImportConfig, ImportProgress, ImportReport, ProgressFn};
pub use merge::MergeOutcome;
pub use portals::PortalRegistry;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::domain::{Blob, Identity, ObjectHash, ObjectKind, Seal, Tree};
use crate::error::{CoreError, Result};
use crate::index::SealIndex;
use crate::position::PositionManager;
use crate::refs::{MemorableNameGenerator, ReferenceRegistry};
use crate::shared::Clock;
use crate::store::{ObjectStore, TypedStore};
use crate::timeline::TimelineManager;
use crate::workspace::build_tree_objects;

/// How divergent histories are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SyncStrategy {
	Auto,
	FastForward,
	Merge,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
	pub remote_timeline: String,
	pub local_timeline: String,
	pub strategy: SyncStrategy,
	pub force: bool,
	pub dry_run: bool,
}

impl Default for SyncOptions {
	fn default() -> Self {
		Self {
			remote_timeline: "main".to_string(),
			local_timeline: "main".to_string(),
			strategy: SyncStrategy::Auto,
			force: false,
			dry_run: false,
		}
	}
}

/// What a sync did (or, on a dry run, would do)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
	UpToDate,
	FastForward,
	Merged,
	WouldFastForward,
	WouldMerge,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
	pub action: SyncAction,
	pub new_head: ObjectHash,
	pub fetched: usize,
}

/// Transport capability. The network implementation lives outside the
/// core; tests drive this with an in-memory peer.
#[async_trait]
pub trait PortalTransport: Send + Sync {
	async fn fetch_head(&self, timeline: &str) -> Result<ObjectHash>;
	/// Objects reachable from `head` that the caller does not already have.
	async fn fetch_objects(
		&self,
		head: ObjectHash,
		have: &[ObjectHash],
	) -> Result<Vec<(ObjectKind, Vec<u8>)>>;
	async fn send_objects(
		&self,
		timeline: &str,
		head: ObjectHash,
		objects: Vec<(ObjectKind, Vec<u8>)>,
	) -> Result<()>;
}

pub struct FuseCoordinator {
	store: Arc<dyn ObjectStore>,
	index: Arc<dyn SealIndex>,
	registry: Arc<ReferenceRegistry>,
	generator: Arc<MemorableNameGenerator>,
	timelines: Arc<TimelineManager>,
	positions: Arc<PositionManager>,
	clock: Arc<dyn Clock>,
	user: Identity,
	import_config: ImportConfig,
}

impl FuseCoordinator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<dyn ObjectStore>,
		index: Arc<dyn SealIndex>,
		registry: Arc<ReferenceRegistry>,
		generator: Arc<MemorableNameGenerator>,
		timelines: Arc<TimelineManager>,
		positions: Arc<PositionManager>,
		clock: Arc<dyn Clock>,
		user: Identity,
		import_config: ImportConfig,
	) -> Self {
		Self {
			store,
			index,
			registry,
			generator,
			timelines,
			positions,
			clock,
			user,
			import_config,
		}
	}

	/// Pull a remote timeline and reconcile it with a local one.
	pub async fn sync(
		&self,
		transport: &dyn PortalTransport,
		options: &SyncOptions,
		dirty_workspace: bool,
	) -> Result<SyncOutcome> {
		if dirty_workspace && !options.force {
			return Err(CoreError::state(
				"workspace has uncommitted changes; seal or shelve them first",
			));
		}
		if !self.timelines.exists(&options.local_timeline).await {
			return Err(CoreError::not_found("timeline", &options.local_timeline));
		}

		let remote_head = transport.fetch_head(&options.remote_timeline).await?;
		if remote_head.is_zero() {
			return Ok(SyncOutcome {
				action: SyncAction::UpToDate,
				new_head: self.timelines.get_head(&options.local_timeline).await?,
				fetched: 0,
			});
		}

		let have = self.store.list().await?;
		let fetched_objects = transport.fetch_objects(remote_head, &have).await?;
		let fetched = fetched_objects.len();
		if fetched > 0 {
			import::import_objects(
				self.store.clone(),
				self.index.clone(),
				fetched_objects,
				&self.import_config,
				None,
				Arc::new(AtomicBool::new(false)),
			)
			.await?;
		}

		let local_head = self.timelines.get_head(&options.local_timeline).await?;
		if local_head == remote_head {
			return Ok(SyncOutcome {
				action: SyncAction::UpToDate,
				new_head: local_head,
				fetched,
			});
		}

		let can_fast_forward =
			local_head.is_zero() || self.is_ancestor(local_head, remote_head).await?;
		if can_fast_forward {
			if options.dry_run {
				return Ok(SyncOutcome {
					action: SyncAction::WouldFastForward,
					new_head: remote_head,
					fetched,
				});
			}
			self.advance_head(&options.local_timeline, remote_head).await?;
			info!(
				timeline = %options.local_timeline,
				head = %remote_head.short(),
				"fast-forwarded"
			);
			return Ok(SyncOutcome {
				action: SyncAction::FastForward,
				new_head: remote_head,
				fetched,
			});
		}

		if options.strategy == SyncStrategy::FastForward {
			return Err(CoreError::state(
				"histories diverged and the strategy forbids a merge",
			));
		}
		// Remote is behind us entirely: nothing to do.
		if self.is_ancestor(remote_head, local_head).await? {
			return Ok(SyncOutcome {
				action: SyncAction::UpToDate,
				new_head: local_head,
				fetched,
			});
		}

		let merge_head = self
			.merge_heads(&options.local_timeline, local_head, remote_head, options)
			.await?;
		match merge_head {
			Some(new_head) => Ok(SyncOutcome {
				action: SyncAction::Merged,
				new_head,
				fetched,
			}),
			None => Ok(SyncOutcome {
				action: SyncAction::WouldMerge,
				new_head: ObjectHash::ZERO,
				fetched,
			}),
		}
	}

	/// Send the closure of a local timeline head to the remote.
	pub async fn push(&self, transport: &dyn PortalTransport, timeline: &str) -> Result<usize> {
		let head = self.timelines.get_head(timeline).await?;
		if head.is_zero() {
			return Err(CoreError::state(format!("timeline '{timeline}' has no seals to push")));
		}
		let objects = self.collect_closure(head).await?;
		let count = objects.len();
		transport.send_objects(timeline, head, objects).await?;
		info!(timeline, objects = count, "pushed");
		Ok(count)
	}

	// --- internals --------------------------------------------------------

	async fn advance_head(&self, timeline: &str, head: ObjectHash) -> Result<()> {
		self.timelines.update_head(timeline, head).await?;
		if self.timelines.current().await == timeline {
			self.positions.set_position(timeline, head).await?;
		}
		Ok(())
	}

	/// Construct the merge seal, or return `None` on a conflict-free dry
	/// run. Conflicts abort with `Conflict` before anything moves.
	async fn merge_heads(
		&self,
		timeline: &str,
		local_head: ObjectHash,
		remote_head: ObjectHash,
		options: &SyncOptions,
	) -> Result<Option<ObjectHash>> {
		let local_seal = TypedStore::load_seal(self.store.as_ref(), local_head).await?;
		let remote_seal = TypedStore::load_seal(self.store.as_ref(), remote_head).await?;
		let ancestor = self.common_ancestor(local_head, remote_head).await?;
		let base_tree = match ancestor {
			Some(hash) => {
				let seal = TypedStore::load_seal(self.store.as_ref(), hash).await?;
				self.collect_tree_files(seal.tree).await?
			}
			None => BTreeMap::new(),
		};
		let ours = self.collect_tree_files(local_seal.tree).await?;
		let theirs = self.collect_tree_files(remote_seal.tree).await?;

		let (targets, conflicts) = self.merge_file_maps(&base_tree, &ours, &theirs).await?;
		if !conflicts.is_empty() {
			return Err(CoreError::Conflict { paths: conflicts });
		}
		if options.dry_run {
			return Ok(None);
		}

		let (tree_hash, trees) = build_tree_objects(&targets)?;
		for tree in &trees {
			let body = tree.encode();
			let hash = self.store.put(ObjectKind::Tree, &body).await?;
			self.index.index_tree(hash, tree).await?;
			self.index
				.index_object(hash, ObjectKind::Tree, body.len() as u64)
				.await?;
		}

		let taken = self.registry.taken_names().await;
		let memorable_name = self.generator.generate(&taken)?;
		let iteration = self.registry.next_iteration(timeline).await?;
		let seal = Seal {
			tree: tree_hash,
			parents: vec![local_head, remote_head],
			author: self.user.clone(),
			committer: self.user.clone(),
			timestamp: self.clock.now().timestamp(),
			message: format!(
				"Fuse {} into {}",
				options.remote_timeline, options.local_timeline
			),
			memorable_name: memorable_name.clone(),
			iteration,
			overwrites: vec![],
		};
		let body = seal.encode();
		let seal_hash = self.store.put(ObjectKind::Seal, &body).await?;
		self.index
			.index_object(seal_hash, ObjectKind::Seal, body.len() as u64)
			.await?;
		self.index.index_seal(seal_hash, &seal).await?;
		self.registry
			.register_memorable_name(&memorable_name, seal_hash, &self.user.name)
			.await?;
		self.positions
			.record_name(&memorable_name, seal_hash, &self.user.name)
			.await?;
		self.advance_head(timeline, seal_hash).await?;
		info!(
			timeline,
			head = %seal_hash.short(),
			name = %memorable_name,
			"created merge seal"
		);
		Ok(Some(seal_hash))
	}

	/// Entry-wise three-way merge of flattened trees. Returns merged
	/// targets plus the conflicting paths.
	async fn merge_file_maps(
		&self,
		base: &BTreeMap<String, ObjectHash>,
		ours: &BTreeMap<String, ObjectHash>,
		theirs: &BTreeMap<String, ObjectHash>,
	) -> Result<(BTreeMap<String, ObjectHash>, Vec<String>)> {
		let mut paths: HashSet<&String> = HashSet::new();
		paths.extend(base.keys());
		paths.extend(ours.keys());
		paths.extend(theirs.keys());
		let mut sorted: Vec<&String> = paths.into_iter().collect();
		sorted.sort();

		let mut targets = BTreeMap::new();
		let mut conflicts = Vec::new();

		for path in sorted {
			let b = base.get(path).copied();
			let o = ours.get(path).copied();
			let t = theirs.get(path).copied();

			let keep = if o == t {
				o
			} else if b == o {
				t
			} else if b == t {
				o
			} else {
				// Both sides changed the same path differently.
				match (o, t) {
					(Some(our_hash), Some(their_hash)) => {
						let base_bytes = match b {
							Some(hash) => {
								TypedStore::load_blob(self.store.as_ref(), hash).await?.data
							}
							None => Vec::new(),
						};
						let our_bytes =
							TypedStore::load_blob(self.store.as_ref(), our_hash).await?.data;
						let their_bytes =
							TypedStore::load_blob(self.store.as_ref(), their_hash).await?.data;
						match merge::merge_bytes(&base_bytes, &our_bytes, &their_bytes) {
							MergeOutcome::Clean(merged) => {
								let blob = Blob::new(merged);
								let hash =
									self.store.put(ObjectKind::Blob, &blob.encode()).await?;
								self.index
									.index_object(hash, ObjectKind::Blob, blob.data.len() as u64)
									.await?;
								Some(hash)
							}
							MergeOutcome::Conflict => {
								conflicts.push(path.clone());
								continue;
							}
						}
					}
					// Delete against modify is never auto-resolved.
					_ => {
						conflicts.push(path.clone());
						continue;
					}
				}
			};
			if let Some(hash) = keep {
				targets.insert(path.clone(), hash);
			}
		}
		debug!(
			merged = targets.len(),
			conflicts = conflicts.len(),
			"merged file maps"
		);
		Ok((targets, conflicts))
	}

	/// Flatten a tree into path -> blob hash.
	fn collect_tree_files(
		&self,
		tree_hash: ObjectHash,
	) -> BoxFuture<'_, Result<BTreeMap<String, ObjectHash>>> {
		Box::pin(async move {
			let mut files = BTreeMap::new();
			if tree_hash.is_zero() {
				return Ok(files);
			}
			let mut queue: VecDeque<(String, ObjectHash)> =
				VecDeque::from([(String::new(), tree_hash)]);
			while let Some((prefix, hash)) = queue.pop_front() {
				let tree: Tree = TypedStore::load_tree(self.store.as_ref(), hash).await?;
				for entry in tree.entries() {
					let path = if prefix.is_empty() {
						entry.name.clone()
					} else {
						format!("{prefix}/{}", entry.name)
					};
					match entry.kind {
						ObjectKind::Tree => queue.push_back((path, entry.hash)),
						_ => {
							files.insert(path, entry.hash);
						}
					}
				}
			}
			Ok(files)
		})
	}

	/// Is `ancestor` reachable from `head` through parent links?
	async fn is_ancestor(&self, ancestor: ObjectHash, head: ObjectHash) -> Result<bool> {
		let mut seen = HashSet::new();
		let mut queue = VecDeque::from([head]);
		while let Some(hash) = queue.pop_front() {
			if hash == ancestor {
				return Ok(true);
			}
			if !seen.insert(hash) || hash.is_zero() {
				continue;
			}
			let seal = TypedStore::load_seal(self.store.as_ref(), hash).await?;
			queue.extend(seal.parents);
		}
		Ok(false)
	}

	/// Most recent seal reachable from both heads, breadth-first.
	async fn common_ancestor(
		&self,
		a: ObjectHash,
		b: ObjectHash,
	) -> Result<Option<ObjectHash>> {
		let mut reachable = HashSet::new();
		let mut queue = VecDeque::from([a]);
		while let Some(hash) = queue.pop_front() {
			if hash.is_zero() || !reachable.insert(hash) {
				continue;
			}
			let seal = TypedStore::load_seal(self.store.as_ref(), hash).await?;
			queue.extend(seal.parents);
		}

		let mut seen = HashSet::new();
		let mut queue = VecDeque::from([b]);
		while let Some(hash) = queue.pop_front() {
			if hash.is_zero() || !seen.insert(hash) {
				continue;
			}
			if reachable.contains(&hash) {
				return Ok(Some(hash));
			}
			let seal = TypedStore::load_seal(self.store.as_ref(), hash).await?;
			queue.extend(seal.parents);
		}
		Ok(None)
	}

	/// Every object reachable from `head`, oversized blobs as chunks.
	async fn collect_closure(&self, head: ObjectHash) -> Result<Vec<(ObjectKind, Vec<u8>)>> {
		let mut out = Vec::new();
		let mut seen = HashSet::new();
		let mut queue = VecDeque::from([head]);
		while let Some(hash) = queue.pop_front() {
			if hash.is_zero() || !seen.insert(hash) {
				continue;
			}
			let (kind, body) = self.store.get(hash).await?;
			match kind {
				ObjectKind::Seal => {
					let seal = Seal::decode(&body)
						.map_err(|e| CoreError::corrupt(hash, e.to_string()))?;
					queue.push_back(seal.tree);
					queue.extend(seal.parents.iter().copied());
					out.push((kind, body));
				}
				ObjectKind::Tree => {
					let tree = Tree::decode(&body)
						.map_err(|e| CoreError::corrupt(hash, e.to_string()))?;
					queue.extend(tree.entries().iter().map(|e| e.hash));
					out.push((kind, body));
				}
				ObjectKind::Blob => {
					if body.len() > self.import_config.chunk_threshold {
						let blob = Blob::decode(&body);
						for chunk in import::chunk_blob(&blob, self.import_config.chunk_threshold)
						{
							out.push((ObjectKind::Chunk, chunk.encode()));
						}
					} else {
						out.push((kind, body));
					}
				}
				ObjectKind::Chunk => out.push((kind, body)),
			}
		}
		Ok(out)
	}
}
