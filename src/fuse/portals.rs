//! Portal registry
//!
//! Named remote endpoints, persisted as `portals.json`. The core only
//! stores names and URLs; transport lives outside.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::shared::fs::{read_json, write_json_atomic};

pub struct PortalRegistry {
	path: PathBuf,
	state: RwLock<BTreeMap<String, String>>,
}

impl PortalRegistry {
	pub async fn open(path: PathBuf) -> Result<Self> {
		let state = if path.exists() {
			read_json(&path).await?
		} else {
			BTreeMap::new()
		};
		Ok(Self {
			path,
			state: RwLock::new(state),
		})
	}

	pub async fn add(&self, name: &str, url: &str) -> Result<()> {
		let mut state = self.state.write().await;
		if state.contains_key(name) {
			return Err(CoreError::already_exists("portal", name));
		}
		state.insert(name.to_string(), url.to_string());
		write_json_atomic(&self.path, &*state).await?;
		info!(portal = name, url, "added portal");
		Ok(())
	}

	pub async fn remove(&self, name: &str) -> Result<()> {
		let mut state = self.state.write().await;
		if state.remove(name).is_none() {
			return Err(CoreError::not_found("portal", name));
		}
		write_json_atomic(&self.path, &*state).await?;
		info!(portal = name, "removed portal");
		Ok(())
	}

	pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
		let mut state = self.state.write().await;
		if state.contains_key(new) {
			return Err(CoreError::already_exists("portal", new));
		}
		let url = state
			.remove(old)
			.ok_or_else(|| CoreError::not_found("portal", old))?;
		state.insert(new.to_string(), url);
		write_json_atomic(&self.path, &*state).await?;
		Ok(())
	}

	pub async fn url_of(&self, name: &str) -> Result<String> {
		self.state
			.read()
			.await
			.get(name)
			.cloned()
			.ok_or_else(|| CoreError::not_found("portal", name))
	}

	pub async fn list(&self) -> BTreeMap<String, String> {
		self.state.read().await.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_add_rename_remove() {
		let dir = tempfile::tempdir().unwrap();
		let registry = PortalRegistry::open(dir.path().join("portals.json")).await.unwrap();

		registry.add("origin", "forge://hub/example").await.unwrap();
		assert!(registry.add("origin", "elsewhere").await.is_err());

		registry.rename("origin", "upstream").await.unwrap();
		assert_eq!(registry.url_of("upstream").await.unwrap(), "forge://hub/example");
		assert!(registry.url_of("origin").await.is_err());

		registry.remove("upstream").await.unwrap();
		assert!(registry.list().await.is_empty());
	}
}
