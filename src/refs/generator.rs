//! Memorable name generation
//!
//! Seals get `adjective-noun-NNN` names so people can talk about history
//! without hex. Generation probes randomly first, then falls back to a
//! deterministic sweep of the whole name space so it always terminates,
//! even when a popular adjective/noun pair is nearly exhausted.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{CoreError, Result};

const ADJECTIVES: [&str; 32] = [
	"amber", "bold", "brave", "bright", "calm", "clever", "crisp", "deep", "eager", "fierce",
	"gentle", "golden", "grand", "happy", "keen", "kind", "lively", "lucky", "mellow", "noble",
	"proud", "quick", "quiet", "rapid", "silent", "solid", "steady", "swift", "tidy", "vivid",
	"warm", "wise",
];

const NOUNS: [&str; 32] = [
	"anvil", "badger", "beacon", "canyon", "cedar", "comet", "coral", "crane", "delta", "ember",
	"falcon", "fjord", "garnet", "glacier", "harbor", "heron", "lake", "maple", "meadow", "otter",
	"peak", "pine", "prairie", "raven", "reef", "river", "sparrow", "spruce", "summit", "tundra",
	"valley", "willow",
];

const MAX_NUMBER: u32 = 999;
const RANDOM_ATTEMPTS: u32 = 64;

pub struct MemorableNameGenerator {
	rng: Mutex<StdRng>,
}

impl MemorableNameGenerator {
	pub fn new() -> Self {
		Self {
			rng: Mutex::new(StdRng::from_entropy()),
		}
	}

	/// Deterministic generator for tests and replay.
	pub fn with_seed(seed: u64) -> Self {
		Self {
			rng: Mutex::new(StdRng::seed_from_u64(seed)),
		}
	}

	/// Produce a name absent from `taken`.
	pub fn generate(&self, taken: &HashSet<String>) -> Result<String> {
		let mut rng = self.rng.lock().unwrap();

		for _ in 0..RANDOM_ATTEMPTS {
			let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
			let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
			let number = rng.gen_range(1..=MAX_NUMBER);
			let candidate = format!("{adjective}-{noun}-{number}");
			if !taken.contains(&candidate) {
				return Ok(candidate);
			}
		}

		// Collision-heavy registry: sweep the space from a random offset.
		let offset = rng.gen_range(0..ADJECTIVES.len() * NOUNS.len());
		for slot in 0..ADJECTIVES.len() * NOUNS.len() {
			let pair = (offset + slot) % (ADJECTIVES.len() * NOUNS.len());
			let adjective = ADJECTIVES[pair / NOUNS.len()];
			let noun = NOUNS[pair % NOUNS.len()];
			for number in 1..=MAX_NUMBER {
				let candidate = format!("{adjective}-{noun}-{number}");
				if !taken.contains(&candidate) {
					return Ok(candidate);
				}
			}
		}

		Err(CoreError::state("memorable name space exhausted"))
	}

	/// Produce a name constrained to one adjective/noun pair.
	pub fn generate_for_pair(
		&self,
		adjective: &str,
		noun: &str,
		taken: &HashSet<String>,
	) -> Result<String> {
		let mut rng = self.rng.lock().unwrap();
		for _ in 0..RANDOM_ATTEMPTS {
			let number = rng.gen_range(1..=MAX_NUMBER);
			let candidate = format!("{adjective}-{noun}-{number}");
			if !taken.contains(&candidate) {
				return Ok(candidate);
			}
		}
		for number in 1..=MAX_NUMBER {
			let candidate = format!("{adjective}-{noun}-{number}");
			if !taken.contains(&candidate) {
				return Ok(candidate);
			}
		}
		Err(CoreError::state(format!(
			"all {MAX_NUMBER} names for {adjective}-{noun} are taken"
		)))
	}
}

impl Default for MemorableNameGenerator {
	fn default() -> Self {
		Self::new()
	}
}
