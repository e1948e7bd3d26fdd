//! Repository configuration
//!
//! One versioned JSON document at `.forge/config.json`. The schema
//! version gates forward migrations the way application configs usually
//! do: load, migrate if behind, save.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::Identity;
use crate::error::{CoreError, Result};
use crate::shared::fs::{read_json, write_json_atomic};

pub const CONFIG_FILE: &str = "config.json";

/// Versioned-document migration contract
pub trait Migrate {
	fn current_version(&self) -> u32;
	fn target_version() -> u32;
	fn migrate(&mut self) -> Result<()>;
}

/// Import tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
	pub workers: usize,
	pub blob_batch: usize,
	pub seal_batch: usize,
}

impl Default for ImportSettings {
	fn default() -> Self {
		Self {
			workers: 8,
			blob_batch: 100,
			seal_batch: 10,
		}
	}
}

/// Main repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
	/// Config schema version
	pub version: u32,
	/// Seal author for this repository
	pub user: Identity,
	/// Default number of seals shown by history queries
	pub history_limit: usize,
	pub import: ImportSettings,
	/// Blobs above this many bytes travel as chunk segments
	pub chunk_threshold: usize,
}

impl RepoConfig {
	pub fn new(user: Identity) -> Self {
		Self {
			version: Self::target_version(),
			user,
			history_limit: 50,
			import: ImportSettings::default(),
			chunk_threshold: 4 * 1024 * 1024,
		}
	}

	pub async fn load(vcs_dir: &Path) -> Result<Self> {
		let path = vcs_dir.join(CONFIG_FILE);
		let mut config: RepoConfig = read_json(&path).await?;
		if config.version < Self::target_version() {
			info!(
				from = config.version,
				to = Self::target_version(),
				"migrating repository config"
			);
			config.migrate()?;
			config.save(vcs_dir).await?;
		}
		Ok(config)
	}

	pub async fn save(&self, vcs_dir: &Path) -> Result<()> {
		write_json_atomic(&self.path_in(vcs_dir), self).await
	}

	fn path_in(&self, vcs_dir: &Path) -> PathBuf {
		vcs_dir.join(CONFIG_FILE)
	}
}

impl Migrate for RepoConfig {
	fn current_version(&self) -> u32 {
		self.version
	}

	fn target_version() -> u32 {
		1
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 | 1 => {
				self.version = 1;
				Ok(())
			}
			v => Err(CoreError::state(format!("unknown config version: {v}"))),
		}
	}
}
