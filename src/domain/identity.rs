//! Author and committer identity

use serde::{Deserialize, Serialize};

/// Who made a change. Free text; the only requirement is a non-empty name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub name: String,
	pub email: String,
}

impl Identity {
	pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			email: email.into(),
		}
	}

	pub fn is_valid(&self) -> bool {
		!self.name.trim().is_empty()
	}
}

impl std::fmt::Display for Identity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.email.is_empty() {
			write!(f, "{}", self.name)
		} else {
			write!(f, "{} <{}>", self.name, self.email)
		}
	}
}
