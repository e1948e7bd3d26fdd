//! Reference registry
//!
//! The repository-wide table of memorable names, user aliases and
//! per-timeline iteration counters, persisted as `references.json`. All
//! mutation goes through one reader/writer lock and the document is
//! rewritten before the write lock is released.

pub mod generator;
pub mod resolver;

pub use generator::MemorableNameGenerator;
pub use resolver::{HeadSource, ReferenceResolver};

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::ObjectHash;
use crate::error::{CoreError, Result};
use crate::shared::fs::{read_json, write_json_atomic};
use crate::shared::Clock;

/// One registered memorable name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
	pub name: String,
	pub hash: ObjectHash,
	pub author: String,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReferenceDocument {
	references: BTreeMap<String, ReferenceEntry>,
	aliases: BTreeMap<String, ObjectHash>,
	iterations: BTreeMap<String, u64>,
}

pub struct ReferenceRegistry {
	path: PathBuf,
	state: RwLock<ReferenceDocument>,
	clock: Arc<dyn Clock>,
}

impl ReferenceRegistry {
	pub async fn initialize(path: PathBuf, clock: Arc<dyn Clock>) -> Result<Self> {
		let doc = ReferenceDocument::default();
		write_json_atomic(&path, &doc).await?;
		Ok(Self {
			path,
			state: RwLock::new(doc),
			clock,
		})
	}

	pub async fn load(path: PathBuf, clock: Arc<dyn Clock>) -> Result<Self> {
		let doc: ReferenceDocument = read_json(&path).await?;
		Ok(Self {
			path,
			state: RwLock::new(doc),
			clock,
		})
	}

	/// Register a freshly generated name for a seal. Names are unique
	/// across the whole repository.
	pub async fn register_memorable_name(
		&self,
		name: &str,
		hash: ObjectHash,
		author: &str,
	) -> Result<()> {
		let mut state = self.state.write().await;
		if state.references.contains_key(name) {
			return Err(CoreError::already_exists("memorable name", name));
		}
		state.references.insert(
			name.to_string(),
			ReferenceEntry {
				name: name.to_string(),
				hash,
				author: author.to_string(),
				created_at: self.clock.now(),
			},
		);
		write_json_atomic(&self.path, &*state).await?;
		debug!(name, hash = %hash.short(), "registered memorable name");
		Ok(())
	}

	/// Point an existing name at a replacement seal (metadata-only
	/// reshapes keep their original name).
	pub async fn reassign_name(&self, name: &str, hash: ObjectHash) -> Result<()> {
		let mut state = self.state.write().await;
		let entry = state
			.references
			.get_mut(name)
			.ok_or_else(|| CoreError::not_found("memorable name", name))?;
		entry.hash = hash;
		write_json_atomic(&self.path, &*state).await?;
		Ok(())
	}

	pub async fn lookup_name(&self, name: &str) -> Option<ObjectHash> {
		self.state.read().await.references.get(name).map(|e| e.hash)
	}

	pub async fn name_for(&self, hash: ObjectHash) -> Option<String> {
		self.state
			.read()
			.await
			.references
			.values()
			.find(|e| e.hash == hash)
			.map(|e| e.name.clone())
	}

	/// Snapshot of every taken name, for collision-free generation.
	pub async fn taken_names(&self) -> HashSet<String> {
		self.state.read().await.references.keys().cloned().collect()
	}

	/// Every hash a name or alias pins; these are GC roots.
	pub async fn reference_hashes(&self) -> Vec<ObjectHash> {
		let state = self.state.read().await;
		state
			.references
			.values()
			.map(|e| e.hash)
			.chain(state.aliases.values().copied())
			.collect()
	}

	pub async fn register_alias(&self, alias: &str, hash: ObjectHash) -> Result<()> {
		let mut state = self.state.write().await;
		state.aliases.insert(alias.to_string(), hash);
		write_json_atomic(&self.path, &*state).await?;
		debug!(alias, hash = %hash.short(), "registered alias");
		Ok(())
	}

	pub async fn remove_alias(&self, alias: &str) -> Result<()> {
		let mut state = self.state.write().await;
		if state.aliases.remove(alias).is_none() {
			return Err(CoreError::not_found("alias", alias));
		}
		write_json_atomic(&self.path, &*state).await?;
		Ok(())
	}

	pub async fn lookup_alias(&self, alias: &str) -> Option<ObjectHash> {
		self.state.read().await.aliases.get(alias).copied()
	}

	pub async fn list_aliases(&self) -> BTreeMap<String, ObjectHash> {
		self.state.read().await.aliases.clone()
	}

	/// Allocate the next iteration number for a timeline. The counter is
	/// persisted before the lock is released, so a crash can skip numbers
	/// but never reuse one.
	pub async fn next_iteration(&self, timeline: &str) -> Result<u64> {
		let mut state = self.state.write().await;
		let counter = state.iterations.entry(timeline.to_string()).or_insert(0);
		*counter += 1;
		let value = *counter;
		write_json_atomic(&self.path, &*state).await?;
		Ok(value)
	}

	pub async fn current_iteration(&self, timeline: &str) -> u64 {
		self.state
			.read()
			.await
			.iterations
			.get(timeline)
			.copied()
			.unwrap_or(0)
	}
}
