//! Injectable time source
//!
//! Every timestamp in the core flows through a [`Clock`] so history,
//! snapshots and temporal reference resolution stay deterministic under
//! test.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Time source capability
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Settable clock for tests and replay tooling
#[derive(Debug)]
pub struct ManualClock {
	now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			now: RwLock::new(now),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		*self.now.write().unwrap() = now;
	}

	pub fn advance(&self, delta: chrono::Duration) {
		let mut guard = self.now.write().unwrap();
		*guard += delta;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.read().unwrap()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances() {
		let start = Utc::now();
		let clock = ManualClock::new(start);
		assert_eq!(clock.now(), start);

		clock.advance(chrono::Duration::hours(2));
		assert_eq!(clock.now(), start + chrono::Duration::hours(2));
	}
}
