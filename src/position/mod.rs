//! Position manager
//!
//! Where the user is *looking*, per timeline, independent of the timeline
//! head. Every move lands in a bounded visit history; the manager also
//! keeps its own alias map and a memorable-name mirror so the most common
//! lookups never leave this module. Persistence is one JSON document at
//! `position/config.json`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::ObjectHash;
use crate::error::{CoreError, Result};
use crate::shared::fs::{read_json, write_json_atomic};
use crate::shared::Clock;

/// Visit history is bounded; the oldest entries are evicted first.
const MAX_HISTORY: usize = 100;

/// One visited point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
	pub timeline: String,
	pub hash: ObjectHash,
	pub timestamp: DateTime<Utc>,
}

/// Memorable-name mirror entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
	pub name: String,
	pub hash: ObjectHash,
	pub author: String,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PositionDocument {
	current: Option<Position>,
	history: Vec<Position>,
	aliases: BTreeMap<String, ObjectHash>,
	name_entries: Vec<NameEntry>,
}

pub struct PositionManager {
	path: PathBuf,
	state: RwLock<PositionDocument>,
	clock: Arc<dyn Clock>,
}

impl PositionManager {
	pub async fn initialize(path: PathBuf, clock: Arc<dyn Clock>) -> Result<Self> {
		let doc = PositionDocument::default();
		write_json_atomic(&path, &doc).await?;
		Ok(Self {
			path,
			state: RwLock::new(doc),
			clock,
		})
	}

	pub async fn load(path: PathBuf, clock: Arc<dyn Clock>) -> Result<Self> {
		let doc: PositionDocument = read_json(&path).await?;
		Ok(Self {
			path,
			state: RwLock::new(doc),
			clock,
		})
	}

	pub async fn current(&self) -> Option<Position> {
		self.state.read().await.current.clone()
	}

	pub async fn history(&self) -> Vec<Position> {
		self.state.read().await.history.clone()
	}

	/// Move the viewpoint. The previous current position joins the history.
	pub async fn set_position(&self, timeline: &str, hash: ObjectHash) -> Result<Position> {
		let mut state = self.state.write().await;
		let position = Position {
			timeline: timeline.to_string(),
			hash,
			timestamp: self.clock.now(),
		};
		if let Some(previous) = state.current.replace(position.clone()) {
			state.history.push(previous);
			let overflow = state.history.len().saturating_sub(MAX_HISTORY);
			if overflow > 0 {
				state.history.drain(..overflow);
			}
		}
		write_json_atomic(&self.path, &*state).await?;
		debug!(timeline, hash = %hash.short(), "moved position");
		Ok(position)
	}

	pub async fn add_alias(&self, alias: &str, hash: ObjectHash) -> Result<()> {
		let mut state = self.state.write().await;
		state.aliases.insert(alias.to_string(), hash);
		write_json_atomic(&self.path, &*state).await?;
		Ok(())
	}

	/// Mirror a memorable name so position-local lookups can stay local.
	pub async fn record_name(&self, name: &str, hash: ObjectHash, author: &str) -> Result<()> {
		let mut state = self.state.write().await;
		state.name_entries.push(NameEntry {
			name: name.to_string(),
			hash,
			author: author.to_string(),
			created_at: self.clock.now(),
		});
		write_json_atomic(&self.path, &*state).await?;
		Ok(())
	}

	/// Resolve the reference forms that never need the index: the current
	/// position, visit-history indexes, locally mirrored names and aliases,
	/// and coarse time phrases over the visit history. Returns `None` when
	/// the reference needs the full resolver.
	pub async fn parse_reference(&self, reference: &str) -> Result<Option<ObjectHash>> {
		let reference = reference.trim();
		let state = self.state.read().await;

		if reference.is_empty() || reference == "position" || reference == "current" {
			return match &state.current {
				Some(position) => Ok(Some(position.hash)),
				None => Err(CoreError::state("no current position")),
			};
		}

		// Visit-history indexes: #1 is the most recent visit, #-1 the oldest.
		if let Some(rest) = reference.strip_prefix('#') {
			if let Ok(n) = rest.parse::<i64>() {
				let len = state.history.len() as i64;
				let slot = if n > 0 { len - n } else if n < 0 { -n - 1 } else { -1 };
				if (0..len).contains(&slot) {
					return Ok(Some(state.history[slot as usize].hash));
				}
				return Ok(None);
			}
		}

		if let Some(entry) = state.name_entries.iter().rev().find(|e| e.name == reference) {
			return Ok(Some(entry.hash));
		}

		if let Some(hash) = state.aliases.get(reference) {
			return Ok(Some(*hash));
		}

		let phrase_delta = match reference.to_lowercase().as_str() {
			"yesterday" => Some(Duration::days(1)),
			"last week" => Some(Duration::days(7)),
			"last month" => Some(Duration::days(30)),
			_ => None,
		};
		if let Some(delta) = phrase_delta {
			let target = self.clock.now() - delta;
			let best = state
				.history
				.iter()
				.min_by_key(|p| (p.timestamp - target).num_seconds().abs())
				.map(|p| p.hash);
			return Ok(best);
		}

		Ok(None)
	}
}
