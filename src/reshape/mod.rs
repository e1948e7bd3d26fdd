//! Accountable history rewriting
//!
//! Rewrites the last N seals of the current timeline with a mandatory
//! justification and category. Originals are archived before anything is
//! replaced, the overwrite record exists before the first replacement is
//! written, and a category that requires approval leaves the timeline
//! head untouched until someone signs off.

pub mod tracker;

pub use tracker::{
	ApprovalStatus, ArchiveEntry, JsonOverwriteTracker, OverwriteRecord, OverwriteTracker,
	ReshapeCategory, TrackerConfig,
};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Identity, ObjectHash, ObjectKind, Seal, SealOverwrite};
use crate::error::{CoreError, Result};
use crate::index::SealIndex;
use crate::position::PositionManager;
use crate::refs::{MemorableNameGenerator, ReferenceRegistry};
use crate::shared::fs::write_json_atomic;
use crate::shared::Clock;
use crate::store::{ObjectStore, TypedStore};
use crate::timeline::TimelineManager;

/// What the caller asks for
#[derive(Debug, Clone)]
pub struct ReshapeRequest {
	pub count: usize,
	pub justification: String,
	pub category: ReshapeCategory,
	pub interactive: bool,
	pub dry_run: bool,
}

/// What a reshape produced
#[derive(Debug, Clone)]
pub struct ReshapeOutcome {
	/// Absent for dry runs
	pub record_id: Option<Uuid>,
	pub new_head: ObjectHash,
	pub new_seals: Vec<ObjectHash>,
	pub replaced: Vec<ObjectHash>,
	pub planned_messages: Vec<String>,
	pub pending_approval: bool,
	pub dry_run: bool,
}

pub struct ReshapeEngine {
	store: Arc<dyn ObjectStore>,
	index: Arc<dyn SealIndex>,
	registry: Arc<ReferenceRegistry>,
	generator: Arc<MemorableNameGenerator>,
	timelines: Arc<TimelineManager>,
	positions: Arc<PositionManager>,
	tracker: Arc<dyn OverwriteTracker>,
	clock: Arc<dyn Clock>,
	user: Identity,
	archive_dir: PathBuf,
}

impl ReshapeEngine {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<dyn ObjectStore>,
		index: Arc<dyn SealIndex>,
		registry: Arc<ReferenceRegistry>,
		generator: Arc<MemorableNameGenerator>,
		timelines: Arc<TimelineManager>,
		positions: Arc<PositionManager>,
		tracker: Arc<dyn OverwriteTracker>,
		clock: Arc<dyn Clock>,
		user: Identity,
		archive_dir: PathBuf,
	) -> Self {
		Self {
			store,
			index,
			registry,
			generator,
			timelines,
			positions,
			tracker,
			clock,
			user,
			archive_dir,
		}
	}

	/// Rewrite the last `request.count` seals of the current timeline.
	pub async fn reshape(&self, request: ReshapeRequest) -> Result<ReshapeOutcome> {
		let config = self.tracker.config().await;
		self.validate(&request, &config)?;

		let timeline = self.timelines.current().await;
		let head = self.timelines.get_head(&timeline).await?;
		if head.is_zero() {
			return Err(CoreError::state("timeline has no history to reshape"));
		}

		// Oldest-first originals.
		let originals = self.collect_recent(head, request.count).await?;
		if originals.len() < request.count {
			return Err(CoreError::invalid(
				"count",
				format!(
					"requested {} seals but the timeline only has {}",
					request.count,
					originals.len()
				),
			));
		}

		for (hash, _) in &originals {
			if self.tracker.is_protected(*hash).await {
				return Err(CoreError::Protected { hash: *hash });
			}
		}

		let keep_names = is_metadata_only(request.category);
		let replacements = self.build_replacements(&request, &originals).await?;
		let planned_messages: Vec<String> =
			replacements.iter().map(|seal| seal.message.clone()).collect();

		if request.dry_run {
			return Ok(ReshapeOutcome {
				record_id: None,
				new_head: ObjectHash::ZERO,
				new_seals: vec![],
				replaced: originals.iter().map(|(hash, _)| *hash).collect(),
				planned_messages,
				pending_approval: false,
				dry_run: true,
			});
		}

		// The record exists before any replacement is written.
		let record_id = Uuid::new_v4();
		let record = OverwriteRecord {
			id: record_id,
			original_hash: originals[0].0,
			new_hash: ObjectHash::ZERO,
			justification: request.justification.clone(),
			category: request.category,
			author: self.user.name.clone(),
			timestamp: self.clock.now(),
			timeline: timeline.clone(),
			archived_versions: vec![],
			approval: if config.require_approval.contains(&request.category) {
				ApprovalStatus::Pending
			} else {
				ApprovalStatus::NotRequired
			},
		};
		self.tracker.create_record(&record).await?;

		for (hash, seal) in &originals {
			let file = self
				.archive_original(record_id, *hash, seal, &request.justification)
				.await?;
			self.tracker.append_archive(record_id, &file).await?;
		}

		// Write the replacement objects.
		let mut new_seals = Vec::with_capacity(replacements.len());
		for seal in &replacements {
			let body = seal.encode();
			let hash = self.store.put(ObjectKind::Seal, &body).await?;
			self.index
				.index_object(hash, ObjectKind::Seal, body.len() as u64)
				.await?;
			new_seals.push((hash, seal.clone()));
		}
		let new_head = new_seals
			.last()
			.map(|(hash, _)| *hash)
			.expect("replacements are never empty");
		self.tracker.set_new_hash(record_id, new_head).await?;

		let pending = matches!(record.approval, ApprovalStatus::Pending);
		if pending {
			info!(record = %record_id, "reshape awaiting approval; head unchanged");
		} else {
			self.finalize(&timeline, &originals, &new_seals, keep_names)
				.await?;
		}

		Ok(ReshapeOutcome {
			record_id: Some(record_id),
			new_head,
			new_seals: new_seals.iter().map(|(hash, _)| *hash).collect(),
			replaced: originals.iter().map(|(hash, _)| *hash).collect(),
			planned_messages,
			pending_approval: pending,
			dry_run: false,
		})
	}

	/// Land a reshape that was waiting for approval.
	pub async fn approve(&self, id: Uuid, approver: &str) -> Result<OverwriteRecord> {
		let record = self.tracker.approve(id, approver).await?;

		// Reload both sides of the rewrite from the store. Both chains
		// bottom out at the seal just below the rewritten range.
		let new_head = record.new_hash;
		if new_head.is_zero() {
			return Err(CoreError::state(format!(
				"record {id} has no replacement head"
			)));
		}
		let oldest_original =
			TypedStore::load_seal(self.store.as_ref(), record.original_hash).await?;
		let below_range = oldest_original
			.parents
			.first()
			.copied()
			.unwrap_or(ObjectHash::ZERO);
		let new_chain = self.collect_chain_until(new_head, below_range).await?;
		let head = self.timelines.get_head(&record.timeline).await?;
		let originals = self.collect_chain_until(head, below_range).await?;

		self.finalize(
			&record.timeline,
			&originals,
			&new_chain,
			is_metadata_only(record.category),
		)
		.await?;
		Ok(record)
	}

	/// Refuse a pending reshape; the already-written replacement objects
	/// stay unreferenced and fall to the garbage collector.
	pub async fn reject(&self, id: Uuid, rejector: &str, reason: &str) -> Result<OverwriteRecord> {
		self.tracker.reject(id, rejector, reason).await
	}

	// --- internals --------------------------------------------------------

	fn validate(&self, request: &ReshapeRequest, config: &TrackerConfig) -> Result<()> {
		if request.count == 0 {
			return Err(CoreError::invalid("count", "must be positive"));
		}
		if request.justification.trim().len() < config.min_justification {
			return Err(CoreError::invalid(
				"justification",
				format!("must be at least {} characters", config.min_justification),
			));
		}
		match request.category {
			ReshapeCategory::Squash if request.count < 2 => {
				Err(CoreError::invalid("count", "squash needs at least two seals"))
			}
			ReshapeCategory::Amend if request.count != 1 => {
				Err(CoreError::invalid("count", "amend rewrites exactly one seal"))
			}
			_ => Ok(()),
		}
	}

	/// Last `count` seals from `head`, oldest first.
	async fn collect_recent(&self, head: ObjectHash, count: usize) -> Result<Vec<(ObjectHash, Seal)>> {
		let mut chain = Vec::new();
		let mut cursor = head;
		while !cursor.is_zero() && chain.len() < count {
			let seal = TypedStore::load_seal(self.store.as_ref(), cursor).await?;
			let next = seal.parents.first().copied().unwrap_or(ObjectHash::ZERO);
			chain.push((cursor, seal));
			cursor = next;
		}
		chain.reverse();
		Ok(chain)
	}

	/// Walk first parents from `from` until (excluding) `until`, oldest first.
	async fn collect_chain_until(
		&self,
		from: ObjectHash,
		until: ObjectHash,
	) -> Result<Vec<(ObjectHash, Seal)>> {
		let mut chain = Vec::new();
		let mut cursor = from;
		while !cursor.is_zero() && cursor != until {
			let seal = TypedStore::load_seal(self.store.as_ref(), cursor).await?;
			let next = seal.parents.first().copied().unwrap_or(ObjectHash::ZERO);
			chain.push((cursor, seal));
			cursor = next;
		}
		chain.reverse();
		Ok(chain)
	}

	async fn build_replacements(
		&self,
		request: &ReshapeRequest,
		originals: &[(ObjectHash, Seal)],
	) -> Result<Vec<Seal>> {
		let now = self.clock.now().timestamp();
		let note = |previous: ObjectHash| SealOverwrite {
			previous,
			reason: request.justification.clone(),
			author: self.user.name.clone(),
			timestamp: now,
		};
		let all_notes: Vec<SealOverwrite> =
			originals.iter().map(|(hash, _)| note(*hash)).collect();

		let mut taken: HashSet<String> = self.registry.taken_names().await;
		let fresh_name = |taken: &mut HashSet<String>| -> Result<String> {
			let name = self.generator.generate(taken)?;
			taken.insert(name.clone());
			Ok(name)
		};

		let oldest = &originals[0].1;
		let newest = &originals[originals.len() - 1].1;

		let replacements = match request.category {
			ReshapeCategory::Squash => {
				let joined = originals
					.iter()
					.map(|(_, seal)| seal.message.as_str())
					.collect::<Vec<_>>()
					.join("; ");
				vec![Seal {
					tree: newest.tree,
					parents: oldest.parents.clone(),
					author: self.user.clone(),
					committer: self.user.clone(),
					timestamp: now,
					message: format!("SQUASHED: {joined}"),
					memorable_name: fresh_name(&mut taken)?,
					iteration: oldest.iteration,
					overwrites: all_notes,
				}]
			}
			ReshapeCategory::Amend => {
				let (hash, original) = &originals[0];
				vec![Seal {
					tree: original.tree,
					parents: original.parents.clone(),
					author: original.author.clone(),
					committer: self.user.clone(),
					timestamp: now,
					message: format!("AMENDED: {}", original.message),
					memorable_name: fresh_name(&mut taken)?,
					iteration: original.iteration,
					overwrites: vec![note(*hash)],
				}]
			}
			ReshapeCategory::Rebase => {
				let mut out: Vec<Seal> = Vec::with_capacity(originals.len());
				for (position, (_, original)) in originals.iter().enumerate() {
					let parents = if position == 0 {
						original.parents.clone()
					} else {
						vec![out[position - 1].hash()]
					};
					out.push(Seal {
						tree: original.tree,
						parents,
						author: original.author.clone(),
						committer: self.user.clone(),
						timestamp: now,
						message: format!("REBASED: {}", original.message),
						memorable_name: fresh_name(&mut taken)?,
						iteration: original.iteration,
						// Only the first replayed seal carries the audit notes.
						overwrites: if position == 0 { all_notes.clone() } else { vec![] },
					});
				}
				out
			}
			ReshapeCategory::Cleanup => {
				let mut out: Vec<Seal> = Vec::with_capacity(originals.len());
				for (position, (hash, original)) in originals.iter().enumerate() {
					let parents = if position == 0 {
						original.parents.clone()
					} else {
						vec![out[position - 1].hash()]
					};
					out.push(Seal {
						tree: original.tree,
						parents,
						author: original.author.clone(),
						committer: self.user.clone(),
						timestamp: now,
						message: normalize_message(&original.message),
						memorable_name: fresh_name(&mut taken)?,
						iteration: original.iteration,
						overwrites: vec![note(*hash)],
					});
				}
				out
			}
			// Metadata-only rewrite: message, tree, iteration and name all
			// survive; only the audit trail and committer change.
			ReshapeCategory::Security | ReshapeCategory::Mistake | ReshapeCategory::Refactor => {
				let mut out: Vec<Seal> = Vec::with_capacity(originals.len());
				for (position, (hash, original)) in originals.iter().enumerate() {
					let parents = if position == 0 {
						original.parents.clone()
					} else {
						vec![out[position - 1].hash()]
					};
					out.push(Seal {
						tree: original.tree,
						parents,
						author: original.author.clone(),
						committer: self.user.clone(),
						timestamp: now,
						message: original.message.clone(),
						memorable_name: original.memorable_name.clone(),
						iteration: original.iteration,
						overwrites: vec![note(*hash)],
					});
				}
				out
			}
		};
		Ok(replacements)
	}

	async fn archive_original(
		&self,
		record_id: Uuid,
		hash: ObjectHash,
		seal: &Seal,
		reason: &str,
	) -> Result<String> {
		tokio::fs::create_dir_all(&self.archive_dir)
			.await
			.map_err(|e| CoreError::io(&self.archive_dir, e))?;

		// Version suffix grows per memorable name.
		let mut version = 1u32;
		let file = loop {
			let candidate = format!("{}.v{version}.json", seal.memorable_name);
			if !self.archive_dir.join(&candidate).exists() {
				break candidate;
			}
			version += 1;
		};

		let entry = ArchiveEntry {
			record_id,
			original_hash: hash,
			original_name: seal.memorable_name.clone(),
			archived_at: self.clock.now(),
			reason: reason.to_string(),
		};
		write_json_atomic(&self.archive_dir.join(&file), &entry).await?;
		debug!(archive = %file, hash = %hash.short(), "archived original seal");
		Ok(file)
	}

	/// Apply a rewrite to the index, registry, head and position. Called
	/// immediately for auto-approved categories, or at approval time.
	async fn finalize(
		&self,
		timeline: &str,
		replaced: &[(ObjectHash, Seal)],
		new_seals: &[(ObjectHash, Seal)],
		keep_names: bool,
	) -> Result<()> {
		for (hash, _) in replaced {
			self.index.remove_seal(*hash).await?;
		}
		self.index.batch_index_seals(new_seals).await?;

		for (hash, seal) in new_seals {
			if keep_names {
				self.registry.reassign_name(&seal.memorable_name, *hash).await?;
			} else {
				self.registry
					.register_memorable_name(&seal.memorable_name, *hash, &self.user.name)
					.await?;
				self.positions
					.record_name(&seal.memorable_name, *hash, &self.user.name)
					.await?;
			}
		}

		let new_head = new_seals
			.last()
			.map(|(hash, _)| *hash)
			.ok_or_else(|| CoreError::state("reshape produced no seals"))?;
		self.timelines.update_head(timeline, new_head).await?;
		self.positions.set_position(timeline, new_head).await?;
		info!(timeline, head = %new_head.short(), "reshape finalized");
		Ok(())
	}
}

fn is_metadata_only(category: ReshapeCategory) -> bool {
	matches!(
		category,
		ReshapeCategory::Security | ReshapeCategory::Mistake | ReshapeCategory::Refactor
	)
}

/// Trim and capitalize the first letter, the cleanup-category contract.
fn normalize_message(message: &str) -> String {
	let trimmed = message.trim();
	let mut chars = trimmed.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
		None => String::new(),
	}
}
