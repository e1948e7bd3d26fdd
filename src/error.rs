//! Core error taxonomy
//!
//! Every fallible core operation returns [`CoreError`]. Store and index
//! errors propagate verbatim; upper layers may add context but never
//! swallow. The CLI layer maps these variants to exit codes; the core
//! itself never prints.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ObjectHash;

/// Errors produced by the core
#[derive(Error, Debug)]
pub enum CoreError {
	/// An object, seal, reference, timeline or snapshot is absent
	#[error("{kind} not found: {key}")]
	NotFound { kind: &'static str, key: String },

	/// Collision on a name that must be unique
	#[error("{kind} already exists: {key}")]
	AlreadyExists { kind: &'static str, key: String },

	/// Operation forbidden by the protection list
	#[error("seal {hash} is protected and cannot be rewritten")]
	Protected { hash: ObjectHash },

	/// Caller-supplied value failed validation
	#[error("invalid {field}: {reason}")]
	InvalidInput { field: &'static str, reason: String },

	/// Stored bytes fail to decode or contradict their hash
	#[error("corrupt object {hash}: {reason}")]
	Corrupt { hash: ObjectHash, reason: String },

	/// Filesystem failure
	#[error("io error at {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// Index transaction failed
	#[error("index error: {0}")]
	Index(#[from] sea_orm::DbErr),

	/// Merge cannot auto-resolve
	#[error("merge conflict in: {}", .paths.join(", "))]
	Conflict { paths: Vec<String> },

	/// Repository is in a state that forbids the operation
	#[error("{0}")]
	State(String),
}

impl CoreError {
	pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
		Self::NotFound {
			kind,
			key: key.into(),
		}
	}

	pub fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
		Self::AlreadyExists {
			kind,
			key: key.into(),
		}
	}

	pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidInput {
			field,
			reason: reason.into(),
		}
	}

	pub fn corrupt(hash: ObjectHash, reason: impl Into<String>) -> Self {
		Self::Corrupt {
			hash,
			reason: reason.into(),
		}
	}

	pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Self::Io {
			path: path.into(),
			source,
		}
	}

	pub fn state(what: impl Into<String>) -> Self {
		Self::State(what.into())
	}
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
