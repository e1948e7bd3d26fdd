//! Shared scaffolding for integration tests

use std::path::Path;

use forge_core::domain::Identity;
use forge_core::Repository;

pub async fn init_repo(root: &Path) -> Repository {
	// RUST_LOG=debug makes failing runs talkative.
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.try_init();
	Repository::init(root, Identity::new("Mira", "mira@example.com"))
		.await
		.unwrap()
}

pub async fn write_file(root: &Path, relative: &str, content: &str) {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await.unwrap();
	}
	tokio::fs::write(path, content).await.unwrap();
}

pub async fn read_file(root: &Path, relative: &str) -> String {
	tokio::fs::read_to_string(root.join(relative)).await.unwrap()
}

/// Gather everything dirty and seal it.
pub async fn seal_all(repo: &Repository, message: &str) -> forge_core::workspace::SealOutcome {
	repo.gather(&[".".to_string()]).await.unwrap();
	repo.seal(message).await.unwrap()
}
