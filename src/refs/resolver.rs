//! Free-form reference resolution
//!
//! Maps a user string to a seal hash with a deterministic precedence:
//! alias, memorable name, iteration syntax, temporal phrases, authorship
//! phrases, content phrases, then a raw hash prefix. The resolver is pure
//! with respect to the index and registry; its only I/O is index queries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::{Identity, ObjectHash};
use crate::error::{CoreError, Result};
use crate::index::{SealIndex, SealRecord};
use crate::shared::Clock;

use super::ReferenceRegistry;

/// Timeline-head lookup capability. The timeline manager implements this;
/// the resolver never owns it.
#[async_trait]
pub trait HeadSource: Send + Sync {
	async fn head(&self, timeline: &str) -> Result<ObjectHash>;
}

static ITERATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#(-?\d+)$").unwrap());
static TIMELINE_ITERATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)#(\d+)$").unwrap());
static RELATIVE_TIME: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day)s?\s+ago$").unwrap());
static AUTHOR_POSSESSIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)'s last commit$").unwrap());
static AUTHOR_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^last commit by (\w+)$").unwrap());
static CONTENT_WHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^where .*? added (.+)$").unwrap());
static CONTENT_ABOUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^the commit about (.+)$").unwrap());
static CONTENT_WHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^when (.+) was added$").unwrap());
static HEX_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{7,64}$").unwrap());

/// Fixed phrases and the duration they reach back
const TEMPORAL_TABLE: [(&str, i64); 5] = [
	("yesterday", 24),
	("last hour", 1),
	("this morning", 4),
	("last week", 24 * 7),
	("last month", 24 * 30),
];

pub struct ReferenceResolver {
	registry: Arc<ReferenceRegistry>,
	index: Arc<dyn SealIndex>,
	heads: Arc<dyn HeadSource>,
	clock: Arc<dyn Clock>,
	user: Identity,
}

impl ReferenceResolver {
	pub fn new(
		registry: Arc<ReferenceRegistry>,
		index: Arc<dyn SealIndex>,
		heads: Arc<dyn HeadSource>,
		clock: Arc<dyn Clock>,
		user: Identity,
	) -> Self {
		Self {
			registry,
			index,
			heads,
			clock,
			user,
		}
	}

	/// Resolve `raw` against the current timeline, stopping at the first
	/// source that produces a hit.
	pub async fn resolve(&self, raw: &str, current_timeline: &str) -> Result<ObjectHash> {
		let reference = raw.trim();
		if reference.is_empty() {
			return Err(CoreError::invalid("reference", "empty reference"));
		}

		// 1. User aliases are deliberate overrides: an alias spelled like
		// an existing memorable name shadows that name.
		if let Some(hash) = self.registry.lookup_alias(reference).await {
			debug!(reference, "resolved via alias");
			return Ok(hash);
		}

		// 2. Memorable names are exact matches.
		if let Some(hash) = self.registry.lookup_name(reference).await {
			debug!(reference, "resolved via memorable name");
			return Ok(hash);
		}

		// 3. Iteration syntax.
		if let Some(found) = self.try_iteration(reference, current_timeline).await? {
			return Ok(found);
		}

		let lowered = reference.to_lowercase();

		// 4. Temporal phrases.
		if let Some(found) = self.try_temporal(&lowered).await? {
			return Ok(found);
		}

		// 5. Authorship phrases.
		if let Some(found) = self.try_author(&lowered).await? {
			return Ok(found);
		}

		// 6. Content phrases.
		if let Some(found) = self.try_content(&lowered).await? {
			return Ok(found);
		}

		// 7. Raw hash prefix, seven hex chars minimum.
		if HEX_PREFIX.is_match(&lowered) {
			if let Some(record) = self.index.find_seal_by_hash_prefix(&lowered).await? {
				debug!(reference, "resolved via hash prefix");
				return Ok(record.hash);
			}
		}

		Err(CoreError::not_found("reference", reference))
	}

	async fn try_iteration(
		&self,
		reference: &str,
		current_timeline: &str,
	) -> Result<Option<ObjectHash>> {
		if let Some(caps) = ITERATION.captures(reference) {
			let n: i64 = caps[1]
				.parse()
				.map_err(|_| CoreError::invalid("reference", "iteration out of range"))?;
			let head = self.heads.head(current_timeline).await?;
			return self.iteration_on(head, n).await;
		}
		if let Some(caps) = TIMELINE_ITERATION.captures(reference) {
			let timeline = &caps[1];
			let n: i64 = caps[2]
				.parse()
				.map_err(|_| CoreError::invalid("reference", "iteration out of range"))?;
			let head = self.heads.head(timeline).await?;
			return self.iteration_on(head, n).await;
		}
		Ok(None)
	}

	/// Positive numbers address iterations directly; negative numbers count
	/// back from the newest seal (`#-1` is the head).
	async fn iteration_on(&self, head: ObjectHash, n: i64) -> Result<Option<ObjectHash>> {
		if head.is_zero() {
			return Ok(None);
		}
		let target = if n > 0 {
			n as u64
		} else if n < 0 {
			let Some(newest) = self.index.get_seal(head).await? else {
				return Ok(None);
			};
			let back = n.unsigned_abs() - 1;
			if back >= newest.iteration {
				return Ok(None);
			}
			newest.iteration - back
		} else {
			return Err(CoreError::invalid("reference", "iteration zero does not exist"));
		};
		Ok(self
			.index
			.find_seal_by_iteration(head, target)
			.await?
			.map(|record| record.hash))
	}

	async fn try_temporal(&self, reference: &str) -> Result<Option<ObjectHash>> {
		let hours_back = TEMPORAL_TABLE
			.iter()
			.find(|(phrase, _)| *phrase == reference)
			.map(|(_, hours)| Duration::hours(*hours));

		let delta = match hours_back {
			Some(delta) => Some(delta),
			None => RELATIVE_TIME.captures(reference).map(|caps| {
				let amount: i64 = caps[1].parse().unwrap_or(0);
				match &caps[2] {
					"minute" => Duration::minutes(amount),
					"hour" => Duration::hours(amount),
					_ => Duration::days(amount),
				}
			}),
		};

		let Some(delta) = delta else {
			return Ok(None);
		};

		let target = (self.clock.now() - delta).timestamp();
		// Narrow window first, then a day on either side.
		for window in [3600i64, 24 * 3600] {
			let candidates = self
				.index
				.find_seals_by_time_range(target - window, target + window)
				.await?;
			if let Some(best) = closest_to(candidates, target) {
				debug!(reference, "resolved via temporal phrase");
				return Ok(Some(best));
			}
		}
		Ok(None)
	}

	async fn try_author(&self, reference: &str) -> Result<Option<ObjectHash>> {
		let author = if reference == "my last commit" {
			Some(self.user.name.clone())
		} else if let Some(caps) = AUTHOR_POSSESSIVE.captures(reference) {
			Some(caps[1].to_string())
		} else {
			AUTHOR_BY.captures(reference).map(|caps| caps[1].to_string())
		};

		let Some(author) = author else {
			return Ok(None);
		};

		let seals = self.index.find_seals_by_author(&author).await?;
		if let Some(newest) = seals.first() {
			debug!(reference, author, "resolved via authorship phrase");
			return Ok(Some(newest.hash));
		}
		Ok(None)
	}

	async fn try_content(&self, reference: &str) -> Result<Option<ObjectHash>> {
		let needle = CONTENT_WHERE
			.captures(reference)
			.or_else(|| CONTENT_ABOUT.captures(reference))
			.or_else(|| CONTENT_WHEN.captures(reference))
			.map(|caps| caps[1].to_string());

		let Some(needle) = needle else {
			return Ok(None);
		};

		let seals = self.index.find_seals_containing(&needle).await?;
		if let Some(newest) = seals.first() {
			debug!(reference, needle, "resolved via content phrase");
			return Ok(Some(newest.hash));
		}
		Ok(None)
	}
}

/// Pick the seal closest to `target`, breaking ties toward the newest.
fn closest_to(candidates: Vec<SealRecord>, target: i64) -> Option<ObjectHash> {
	candidates
		.into_iter()
		.min_by_key(|record| ((record.timestamp - target).abs(), -record.timestamp))
		.map(|record| record.hash)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_patterns() {
		assert!(ITERATION.is_match("#7"));
		assert!(ITERATION.is_match("#-2"));
		assert!(!ITERATION.is_match("#x"));
		assert!(TIMELINE_ITERATION.is_match("feature#3"));
		assert!(RELATIVE_TIME.is_match("3 hours ago"));
		assert!(RELATIVE_TIME.is_match("1 minute ago"));
		assert!(AUTHOR_POSSESSIVE.is_match("mira's last commit"));
		assert!(AUTHOR_BY.is_match("last commit by mira"));
		assert!(CONTENT_ABOUT.is_match("the commit about auth"));
		assert!(CONTENT_WHERE.is_match("where we added logging"));
		assert!(CONTENT_WHEN.is_match("when logging was added"));
		assert!(HEX_PREFIX.is_match("abc1234"));
		assert!(!HEX_PREFIX.is_match("abc12"));
	}

	#[test]
	fn test_closest_prefers_newest_on_tie() {
		let record = |timestamp: i64, tag: &[u8]| SealRecord {
			hash: ObjectHash::compute(crate::domain::ObjectKind::Seal, tag),
			memorable_name: String::new(),
			iteration: 1,
			tree: ObjectHash::ZERO,
			message: String::new(),
			author: Identity::new("t", ""),
			timestamp,
			parent_count: 0,
		};
		let older = record(90, b"older");
		let newer = record(110, b"newer");
		let picked = closest_to(vec![older, newer.clone()], 100).unwrap();
		assert_eq!(picked, newer.hash);
	}
}
