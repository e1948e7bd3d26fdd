//! Overwrite records and tracker configuration
//!
//! Every history rewrite produces an append-only record under
//! `overwrites/<record_id>.json`. The tracker also owns the policy knobs:
//! minimum justification length, which categories demand approval, and
//! the protected-hash list. The audit export bundles all of it into one
//! compliance document.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ObjectHash;
use crate::error::{CoreError, Result};
use crate::shared::fs::{read_json, write_json_atomic};
use crate::shared::Clock;

/// Why history was rewritten
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReshapeCategory {
	Security,
	Cleanup,
	Mistake,
	Refactor,
	Rebase,
	Squash,
	Amend,
}

/// Approval state of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalStatus {
	NotRequired,
	Pending,
	Approved { by: String, at: DateTime<Utc> },
	Rejected { by: String, at: DateTime<Utc> },
}

/// The audit entry produced by every reshape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverwriteRecord {
	pub id: Uuid,
	/// Oldest seal the reshape replaced
	pub original_hash: ObjectHash,
	/// Head after the reshape; zero until the replacements are written
	pub new_hash: ObjectHash,
	pub justification: String,
	pub category: ReshapeCategory,
	pub author: String,
	pub timestamp: DateTime<Utc>,
	/// Timeline the rewrite applies to; needed to land a deferred approval
	pub timeline: String,
	/// Archive files written for the replaced seals
	pub archived_versions: Vec<String>,
	pub approval: ApprovalStatus,
}

/// One archived original, as written to `archive/<name>.v<k>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
	pub record_id: Uuid,
	pub original_hash: ObjectHash,
	pub original_name: String,
	pub archived_at: DateTime<Utc>,
	pub reason: String,
}

/// Tracker policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
	/// Minimum justification length in characters
	pub min_justification: usize,
	/// Categories that must be approved before the head moves
	pub require_approval: BTreeSet<ReshapeCategory>,
	/// Hex hashes that no reshape may touch
	pub protected: BTreeSet<String>,
}

impl Default for TrackerConfig {
	fn default() -> Self {
		let mut require_approval = BTreeSet::new();
		require_approval.insert(ReshapeCategory::Security);
		Self {
			min_justification: 10,
			require_approval,
			protected: BTreeSet::new(),
		}
	}
}

/// Tracker capability consumed by the reshape engine
#[async_trait]
pub trait OverwriteTracker: Send + Sync {
	async fn create_record(&self, record: &OverwriteRecord) -> Result<()>;
	async fn append_archive(&self, id: Uuid, archive_file: &str) -> Result<()>;
	async fn set_new_hash(&self, id: Uuid, hash: ObjectHash) -> Result<()>;
	async fn approve(&self, id: Uuid, approver: &str) -> Result<OverwriteRecord>;
	async fn reject(&self, id: Uuid, rejector: &str, reason: &str) -> Result<OverwriteRecord>;
	async fn get(&self, id: Uuid) -> Result<OverwriteRecord>;
	async fn list(&self) -> Result<Vec<OverwriteRecord>>;

	async fn config(&self) -> TrackerConfig;
	async fn set_protected(&self, hash: ObjectHash, protected: bool) -> Result<()>;
	async fn is_protected(&self, hash: ObjectHash) -> bool;

	/// The compliance artifact: configuration plus every record.
	async fn export_audit(&self) -> Result<serde_json::Value>;
}

/// JSON-file tracker, one document per record
pub struct JsonOverwriteTracker {
	records_dir: PathBuf,
	config_path: PathBuf,
	config: RwLock<TrackerConfig>,
	clock: Arc<dyn Clock>,
}

impl JsonOverwriteTracker {
	pub async fn open(
		records_dir: PathBuf,
		config_path: PathBuf,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let config = if config_path.exists() {
			read_json(&config_path).await?
		} else {
			let config = TrackerConfig::default();
			write_json_atomic(&config_path, &config).await?;
			config
		};
		tokio::fs::create_dir_all(&records_dir)
			.await
			.map_err(|e| CoreError::io(&records_dir, e))?;
		Ok(Self {
			records_dir,
			config_path,
			config: RwLock::new(config),
			clock,
		})
	}

	fn record_path(&self, id: Uuid) -> PathBuf {
		self.records_dir.join(format!("{id}.json"))
	}

	async fn load_record(&self, id: Uuid) -> Result<OverwriteRecord> {
		let path = self.record_path(id);
		if !path.exists() {
			return Err(CoreError::not_found("overwrite record", id.to_string()));
		}
		read_json(&path).await
	}

	async fn store_record(&self, record: &OverwriteRecord) -> Result<()> {
		write_json_atomic(&self.record_path(record.id), record).await
	}

	pub async fn update_config<F>(&self, apply: F) -> Result<TrackerConfig>
	where
		F: FnOnce(&mut TrackerConfig),
	{
		let mut config = self.config.write().await;
		apply(&mut config);
		write_json_atomic(&self.config_path, &*config).await?;
		Ok(config.clone())
	}
}

#[async_trait]
impl OverwriteTracker for JsonOverwriteTracker {
	async fn create_record(&self, record: &OverwriteRecord) -> Result<()> {
		if self.record_path(record.id).exists() {
			return Err(CoreError::already_exists("overwrite record", record.id.to_string()));
		}
		self.store_record(record).await?;
		info!(record = %record.id, category = %record.category, "created overwrite record");
		Ok(())
	}

	async fn append_archive(&self, id: Uuid, archive_file: &str) -> Result<()> {
		let mut record = self.load_record(id).await?;
		record.archived_versions.push(archive_file.to_string());
		self.store_record(&record).await
	}

	async fn set_new_hash(&self, id: Uuid, hash: ObjectHash) -> Result<()> {
		let mut record = self.load_record(id).await?;
		record.new_hash = hash;
		self.store_record(&record).await
	}

	async fn approve(&self, id: Uuid, approver: &str) -> Result<OverwriteRecord> {
		let mut record = self.load_record(id).await?;
		match record.approval {
			ApprovalStatus::Pending => {}
			_ => {
				return Err(CoreError::state(format!(
					"record {id} is not awaiting approval"
				)))
			}
		}
		record.approval = ApprovalStatus::Approved {
			by: approver.to_string(),
			at: self.clock.now(),
		};
		self.store_record(&record).await?;
		info!(record = %id, approver, "approved overwrite record");
		Ok(record)
	}

	async fn reject(&self, id: Uuid, rejector: &str, reason: &str) -> Result<OverwriteRecord> {
		let mut record = self.load_record(id).await?;
		match record.approval {
			ApprovalStatus::Pending => {}
			_ => {
				return Err(CoreError::state(format!(
					"record {id} is not awaiting approval"
				)))
			}
		}
		record
			.justification
			.push_str(&format!(" [REJECTED by {rejector}: {reason}]"));
		record.approval = ApprovalStatus::Rejected {
			by: rejector.to_string(),
			at: self.clock.now(),
		};
		self.store_record(&record).await?;
		info!(record = %id, rejector, "rejected overwrite record");
		Ok(record)
	}

	async fn get(&self, id: Uuid) -> Result<OverwriteRecord> {
		self.load_record(id).await
	}

	async fn list(&self) -> Result<Vec<OverwriteRecord>> {
		let mut records = Vec::new();
		let mut entries = match tokio::fs::read_dir(&self.records_dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
			Err(e) => return Err(CoreError::io(&self.records_dir, e)),
		};
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| CoreError::io(&self.records_dir, e))?
		{
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			records.push(read_json(&path).await?);
		}
		records.sort_by_key(|r: &OverwriteRecord| r.timestamp);
		Ok(records)
	}

	async fn config(&self) -> TrackerConfig {
		self.config.read().await.clone()
	}

	async fn set_protected(&self, hash: ObjectHash, protected: bool) -> Result<()> {
		let mut config = self.config.write().await;
		if protected {
			config.protected.insert(hash.to_hex());
		} else {
			config.protected.remove(&hash.to_hex());
		}
		write_json_atomic(&self.config_path, &*config).await?;
		debug!(hash = %hash.short(), protected, "updated protection list");
		Ok(())
	}

	async fn is_protected(&self, hash: ObjectHash) -> bool {
		self.config.read().await.protected.contains(&hash.to_hex())
	}

	async fn export_audit(&self) -> Result<serde_json::Value> {
		let config = self.config().await;
		let records = self.list().await?;
		Ok(serde_json::json!({
			"config": config,
			"records": records,
			"export": {
				"timestamp": self.clock.now(),
				"version": env!("CARGO_PKG_VERSION"),
			},
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::ObjectKind;
	use crate::shared::SystemClock;

	fn record(approval: ApprovalStatus) -> OverwriteRecord {
		OverwriteRecord {
			id: Uuid::new_v4(),
			original_hash: ObjectHash::compute(ObjectKind::Seal, b"orig"),
			new_hash: ObjectHash::ZERO,
			justification: "squashing noisy fixups".to_string(),
			category: ReshapeCategory::Squash,
			author: "mira".to_string(),
			timestamp: Utc::now(),
			timeline: "main".to_string(),
			archived_versions: vec![],
			approval,
		}
	}

	async fn tracker(dir: &std::path::Path) -> JsonOverwriteTracker {
		JsonOverwriteTracker::open(
			dir.join("overwrites"),
			dir.join("overwrite-config.json"),
			Arc::new(SystemClock),
		)
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn test_record_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let tracker = tracker(dir.path()).await;

		let record = record(ApprovalStatus::NotRequired);
		tracker.create_record(&record).await.unwrap();
		tracker.append_archive(record.id, "bright-river-42.v1.json").await.unwrap();

		let loaded = tracker.get(record.id).await.unwrap();
		assert_eq!(loaded.archived_versions, vec!["bright-river-42.v1.json"]);
		assert_eq!(tracker.list().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_reject_annotates_justification() {
		let dir = tempfile::tempdir().unwrap();
		let tracker = tracker(dir.path()).await;

		let record = record(ApprovalStatus::Pending);
		tracker.create_record(&record).await.unwrap();
		let rejected = tracker
			.reject(record.id, "dana", "insufficient reason")
			.await
			.unwrap();
		assert!(rejected
			.justification
			.ends_with("[REJECTED by dana: insufficient reason]"));
		assert!(matches!(rejected.approval, ApprovalStatus::Rejected { .. }));

		// A settled record cannot be approved afterwards.
		assert!(tracker.approve(record.id, "dana").await.is_err());
	}

	#[tokio::test]
	async fn test_protection_list_persists() {
		let dir = tempfile::tempdir().unwrap();
		let hash = ObjectHash::compute(ObjectKind::Seal, b"keep");
		{
			let tracker = tracker(dir.path()).await;
			tracker.set_protected(hash, true).await.unwrap();
			assert!(tracker.is_protected(hash).await);
		}
		let tracker = tracker(dir.path()).await;
		assert!(tracker.is_protected(hash).await);
		tracker.set_protected(hash, false).await.unwrap();
		assert!(!tracker.is_protected(hash).await);
	}

	#[tokio::test]
	async fn test_audit_export_shape() {
		let dir = tempfile::tempdir().unwrap();
		let tracker = tracker(dir.path()).await;
		tracker.create_record(&record(ApprovalStatus::NotRequired)).await.unwrap();

		let audit = tracker.export_audit().await.unwrap();
		assert!(audit.get("config").is_some());
		assert_eq!(audit["records"].as_array().unwrap().len(), 1);
		assert!(audit["export"]["timestamp"].is_string());
		assert!(audit["export"]["version"].is_string());
	}
}
