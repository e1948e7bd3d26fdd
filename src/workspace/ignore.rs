//! Ignore patterns
//!
//! Globs loaded from the project's `.forgeignore`, matched against the
//! repository-relative path and against the basename, so `target` ignores
//! a directory anywhere and `*.log` ignores by extension. The set is
//! read-mostly and only reloaded on explicit refresh.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

use crate::error::{CoreError, Result};

pub const IGNORE_FILE: &str = ".forgeignore";

pub struct IgnoreSet {
	patterns: Vec<String>,
	set: GlobSet,
}

impl IgnoreSet {
	pub fn empty() -> Self {
		Self {
			patterns: Vec::new(),
			set: GlobSet::empty(),
		}
	}

	pub fn from_patterns(patterns: Vec<String>) -> Result<Self> {
		let mut builder = GlobSetBuilder::new();
		for pattern in &patterns {
			match Glob::new(pattern) {
				Ok(glob) => {
					builder.add(glob);
				}
				Err(e) => {
					warn!(pattern, error = %e, "skipping malformed ignore pattern");
				}
			}
		}
		let set = builder
			.build()
			.map_err(|e| CoreError::invalid("ignore pattern", e.to_string()))?;
		Ok(Self { patterns, set })
	}

	/// Load from the project ignore file; a missing file means no patterns.
	pub async fn load(root: &Path) -> Result<Self> {
		let path = root.join(IGNORE_FILE);
		let content = match tokio::fs::read_to_string(&path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
			Err(e) => return Err(CoreError::io(path, e)),
		};
		let patterns = content
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty() && !line.starts_with('#'))
			.map(str::to_string)
			.collect();
		Self::from_patterns(patterns)
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	/// Match a slash-normalized relative path.
	pub fn is_ignored(&self, relative: &str) -> bool {
		if self.set.is_match(relative) {
			return true;
		}
		// Basename and ancestor-directory matches: "target" ignores
		// everything under any target/ directory.
		let mut prefix = String::new();
		for part in relative.split('/') {
			if self.set.is_match(part) {
				return true;
			}
			if !prefix.is_empty() {
				prefix.push('/');
			}
			prefix.push_str(part);
			if self.set.is_match(&prefix) {
				return true;
			}
		}
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_basename_and_path_matches() {
		let set = IgnoreSet::from_patterns(vec![
			"*.log".to_string(),
			"target".to_string(),
			"build/out".to_string(),
		])
		.unwrap();

		assert!(set.is_ignored("debug.log"));
		assert!(set.is_ignored("nested/deep/trace.log"));
		assert!(set.is_ignored("target"));
		assert!(set.is_ignored("target/release/app"));
		assert!(set.is_ignored("build/out"));
		assert!(set.is_ignored("build/out/artifact.bin"));
		assert!(!set.is_ignored("src/main.rs"));
		assert!(!set.is_ignored("buildout"));
	}

	#[tokio::test]
	async fn test_load_skips_comments_and_blanks() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(
			dir.path().join(IGNORE_FILE),
			"# build artifacts\n\n*.tmp\ntarget\n",
		)
		.await
		.unwrap();

		let set = IgnoreSet::load(dir.path()).await.unwrap();
		assert_eq!(set.patterns(), ["*.tmp", "target"]);
		assert!(set.is_ignored("a.tmp"));
	}

	#[tokio::test]
	async fn test_missing_file_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let set = IgnoreSet::load(dir.path()).await.unwrap();
		assert!(set.patterns().is_empty());
		assert!(!set.is_ignored("anything"));
	}
}
