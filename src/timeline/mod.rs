//! Timeline manager
//!
//! Timelines are the named moving heads of history. The authoritative
//! record is a single `timelines.json` document, rewritten atomically
//! after every mutation while the state lock is still held; heads are
//! mirrored into the index so head-scoped queries stay in one database.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::ObjectHash;
use crate::error::{CoreError, Result};
use crate::index::SealIndex;
use crate::shared::fs::{read_json, write_json_atomic};
use crate::shared::Clock;

pub const DEFAULT_TIMELINE: &str = "main";

/// One named head
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
	pub name: String,
	pub head: ObjectHash,
	pub description: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	/// Timeline this one was forged from, if any
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimelineDocument {
	current: String,
	timelines: BTreeMap<String, Timeline>,
}

pub struct TimelineManager {
	path: PathBuf,
	state: RwLock<TimelineDocument>,
	index: Arc<dyn SealIndex>,
	clock: Arc<dyn Clock>,
}

impl TimelineManager {
	/// Create the default document with a "main" timeline and a zero head.
	pub async fn initialize(
		path: PathBuf,
		index: Arc<dyn SealIndex>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let now = clock.now();
		let mut timelines = BTreeMap::new();
		timelines.insert(
			DEFAULT_TIMELINE.to_string(),
			Timeline {
				name: DEFAULT_TIMELINE.to_string(),
				head: ObjectHash::ZERO,
				description: "default timeline".to_string(),
				created_at: now,
				updated_at: now,
				parent: None,
			},
		);
		let doc = TimelineDocument {
			current: DEFAULT_TIMELINE.to_string(),
			timelines,
		};
		write_json_atomic(&path, &doc).await?;
		index
			.upsert_timeline(DEFAULT_TIMELINE, ObjectHash::ZERO, "default timeline")
			.await?;
		info!("initialized timelines with default '{DEFAULT_TIMELINE}'");
		Ok(Self {
			path,
			state: RwLock::new(doc),
			index,
			clock,
		})
	}

	/// Load an existing document.
	pub async fn load(
		path: PathBuf,
		index: Arc<dyn SealIndex>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let doc: TimelineDocument = read_json(&path).await?;
		Ok(Self {
			path,
			state: RwLock::new(doc),
			index,
			clock,
		})
	}

	pub async fn current(&self) -> String {
		self.state.read().await.current.clone()
	}

	pub async fn exists(&self, name: &str) -> bool {
		self.state.read().await.timelines.contains_key(name)
	}

	pub async fn list(&self) -> Vec<Timeline> {
		self.state.read().await.timelines.values().cloned().collect()
	}

	pub async fn get(&self, name: &str) -> Result<Timeline> {
		self.state
			.read()
			.await
			.timelines
			.get(name)
			.cloned()
			.ok_or_else(|| CoreError::not_found("timeline", name))
	}

	pub async fn get_head(&self, name: &str) -> Result<ObjectHash> {
		Ok(self.get(name).await?.head)
	}

	pub async fn current_head(&self) -> Result<ObjectHash> {
		let state = self.state.read().await;
		let current = state.current.clone();
		state
			.timelines
			.get(&current)
			.map(|t| t.head)
			.ok_or_else(|| CoreError::not_found("timeline", current))
	}

	pub async fn create(&self, name: &str, description: &str) -> Result<Timeline> {
		if name.trim().is_empty() {
			return Err(CoreError::invalid("timeline", "name must not be empty"));
		}
		let mut state = self.state.write().await;
		if state.timelines.contains_key(name) {
			return Err(CoreError::already_exists("timeline", name));
		}
		let now = self.clock.now();
		// A new timeline forks from where the user currently stands.
		let parent = state.current.clone();
		let head = state
			.timelines
			.get(&parent)
			.map(|t| t.head)
			.unwrap_or(ObjectHash::ZERO);
		let timeline = Timeline {
			name: name.to_string(),
			head,
			description: description.to_string(),
			created_at: now,
			updated_at: now,
			parent: Some(parent),
		};
		state.timelines.insert(name.to_string(), timeline.clone());
		write_json_atomic(&self.path, &*state).await?;
		self.index.upsert_timeline(name, head, description).await?;
		info!(timeline = name, "created timeline");
		Ok(timeline)
	}

	pub async fn switch(&self, name: &str) -> Result<Timeline> {
		let mut state = self.state.write().await;
		let timeline = state
			.timelines
			.get(name)
			.cloned()
			.ok_or_else(|| CoreError::not_found("timeline", name))?;
		state.current = name.to_string();
		write_json_atomic(&self.path, &*state).await?;
		debug!(timeline = name, "switched current timeline");
		Ok(timeline)
	}

	pub async fn update_head(&self, name: &str, head: ObjectHash) -> Result<()> {
		let mut state = self.state.write().await;
		let timeline = state
			.timelines
			.get_mut(name)
			.ok_or_else(|| CoreError::not_found("timeline", name))?;
		timeline.head = head;
		timeline.updated_at = self.clock.now();
		let description = timeline.description.clone();
		write_json_atomic(&self.path, &*state).await?;
		self.index.upsert_timeline(name, head, &description).await?;
		debug!(timeline = name, head = %head.short(), "updated timeline head");
		Ok(())
	}

	pub async fn delete(&self, name: &str) -> Result<()> {
		let mut state = self.state.write().await;
		if state.current == name {
			return Err(CoreError::state(format!(
				"cannot delete the current timeline '{name}'"
			)));
		}
		if state.timelines.remove(name).is_none() {
			return Err(CoreError::not_found("timeline", name));
		}
		write_json_atomic(&self.path, &*state).await?;
		self.index.remove_timeline(name).await?;
		info!(timeline = name, "deleted timeline");
		Ok(())
	}

	pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
		if new.trim().is_empty() {
			return Err(CoreError::invalid("timeline", "name must not be empty"));
		}
		let mut state = self.state.write().await;
		if state.timelines.contains_key(new) {
			return Err(CoreError::already_exists("timeline", new));
		}
		let mut timeline = state
			.timelines
			.remove(old)
			.ok_or_else(|| CoreError::not_found("timeline", old))?;
		timeline.name = new.to_string();
		timeline.updated_at = self.clock.now();
		state.timelines.insert(new.to_string(), timeline);
		if state.current == old {
			state.current = new.to_string();
		}
		// Children keep pointing at the new name.
		for t in state.timelines.values_mut() {
			if t.parent.as_deref() == Some(old) {
				t.parent = Some(new.to_string());
			}
		}
		write_json_atomic(&self.path, &*state).await?;
		self.index.rename_timeline(old, new).await?;
		info!(from = old, to = new, "renamed timeline");
		Ok(())
	}
}

#[async_trait::async_trait]
impl crate::refs::HeadSource for TimelineManager {
	async fn head(&self, timeline: &str) -> Result<ObjectHash> {
		self.get_head(timeline).await
	}
}
