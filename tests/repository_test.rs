//! Repository façade integration tests

mod helpers;

use tempfile::TempDir;

use forge_core::domain::Identity;
use forge_core::error::CoreError;
use forge_core::Repository;

use helpers::{init_repo, read_file, seal_all, write_file};

#[tokio::test]
async fn test_forge_creates_layout() {
	let dir = TempDir::new().unwrap();
	let _repo = init_repo(dir.path()).await;

	let vcs = dir.path().join(".forge");
	assert!(vcs.join("config.json").exists());
	assert!(vcs.join("index.db").exists());
	assert!(vcs.join("timelines.json").exists());
	assert!(vcs.join("position/config.json").exists());
	assert!(vcs.join("references.json").exists());
	assert!(vcs.join("overwrite-config.json").exists());
	assert!(vcs.join("objects").is_dir());
}

#[tokio::test]
async fn test_forge_twice_fails() {
	let dir = TempDir::new().unwrap();
	let _repo = init_repo(dir.path()).await;
	assert!(matches!(
		Repository::init(dir.path(), Identity::new("Mira", "")).await,
		Err(CoreError::AlreadyExists { .. })
	));
}

#[tokio::test]
async fn test_open_resumes_state() {
	let dir = TempDir::new().unwrap();
	let head;
	{
		let repo = init_repo(dir.path()).await;
		write_file(dir.path(), "a.txt", "persisted\n").await;
		head = seal_all(&repo, "persist me").await.hash;
		repo.timelines.create("feature", "later").await.unwrap();
	}

	let repo = Repository::open(dir.path()).await.unwrap();
	assert_eq!(repo.timelines.get_head("main").await.unwrap(), head);
	assert!(repo.timelines.exists("feature").await);
	assert_eq!(repo.positions.current().await.unwrap().hash, head);
	assert_eq!(repo.log(None).await.unwrap().len(), 1);
	assert!(repo.status().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_open_without_repository_fails() {
	let dir = TempDir::new().unwrap();
	assert!(matches!(
		Repository::open(dir.path()).await,
		Err(CoreError::NotFound { .. })
	));
}

#[tokio::test]
async fn test_jump_moves_position_not_head() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "v1\n").await;
	let first = seal_all(&repo, "first").await;
	write_file(dir.path(), "a.txt", "v2\n").await;
	let second = seal_all(&repo, "second").await;

	let position = repo.jump("#1").await.unwrap();
	assert_eq!(position.hash, first.hash);
	assert_eq!(repo.positions.current().await.unwrap().hash, first.hash);
	// The head is untouched by jumping.
	assert_eq!(repo.timelines.get_head("main").await.unwrap(), second.hash);

	// Jumping by memorable name works the same way.
	let position = repo.jump(&second.memorable_name).await.unwrap();
	assert_eq!(position.hash, second.hash);
}

#[tokio::test]
async fn test_restore_by_reference() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "v1\n").await;
	seal_all(&repo, "first").await;
	write_file(dir.path(), "a.txt", "v2\n").await;
	seal_all(&repo, "second").await;

	repo.restore("#1").await.unwrap();
	assert_eq!(read_file(dir.path(), "a.txt").await, "v1\n");
	repo.restore("#2").await.unwrap();
	assert_eq!(read_file(dir.path(), "a.txt").await, "v2\n");
}

#[tokio::test]
async fn test_alias_registration_and_resolution() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "v1\n").await;
	let first = seal_all(&repo, "the good one").await;
	write_file(dir.path(), "a.txt", "v2\n").await;
	seal_all(&repo, "second").await;

	repo.add_alias("golden", &first.memorable_name).await.unwrap();
	assert_eq!(repo.resolve("golden").await.unwrap(), first.hash);

	// An alias spelled like the seal's own name shadows it.
	repo.add_alias(&first.memorable_name, "#2").await.unwrap();
	let shadowed = repo.resolve(&first.memorable_name).await.unwrap();
	assert_ne!(shadowed, first.hash);
}

#[tokio::test]
async fn test_empty_reference_is_current_position() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;
	write_file(dir.path(), "a.txt", "v1\n").await;
	let outcome = seal_all(&repo, "only").await;

	assert_eq!(repo.resolve("").await.unwrap(), outcome.hash);
	assert_eq!(repo.resolve("position").await.unwrap(), outcome.hash);
	assert_eq!(repo.resolve("current").await.unwrap(), outcome.hash);
}

#[tokio::test]
async fn test_log_order_and_limit() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	for i in 1..=5 {
		write_file(dir.path(), "a.txt", &format!("v{i}\n")).await;
		seal_all(&repo, &format!("seal {i}")).await;
	}

	let log = repo.log(Some(3)).await.unwrap();
	assert_eq!(log.len(), 3);
	assert_eq!(log[0].message, "seal 5");
	assert_eq!(log[2].message, "seal 3");
	assert_eq!(log[0].iteration, 5);
}

#[tokio::test]
async fn test_portal_registry() -> anyhow::Result<()> {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	repo.portals.add("origin", "forge://hub/mira/project").await?;
	assert_eq!(
		repo.portals.url_of("origin").await?,
		"forge://hub/mira/project"
	);

	// Portals survive reopening.
	drop(repo);
	let repo = Repository::open(dir.path()).await?;
	assert_eq!(repo.portals.list().await.len(), 1);
	Ok(())
}

#[tokio::test]
async fn test_gc_removes_unreferenced_objects() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "kept\n").await;
	seal_all(&repo, "base").await;

	// An orphan object nothing references.
	use forge_core::domain::ObjectKind;
	let orphan = repo
		.store
		.put(ObjectKind::Blob, b"never sealed")
		.await
		.unwrap();

	let dry = repo.gc(true).await.unwrap();
	assert_eq!(dry.deleted, 1);
	assert!(repo.store.exists(orphan).await);

	let report = repo.gc(false).await.unwrap();
	assert_eq!(report.deleted, 1);
	assert!(!repo.store.exists(orphan).await);

	// The sealed history is intact.
	assert!(repo.status().await.unwrap().is_clean());
	assert_eq!(repo.log(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_protect_via_reference() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;
	write_file(dir.path(), "a.txt", "v1\n").await;
	let outcome = seal_all(&repo, "guarded").await;

	repo.protect(&outcome.memorable_name).await.unwrap();
	use forge_core::reshape::OverwriteTracker;
	assert!(repo.tracker.is_protected(outcome.hash).await);
	repo.unprotect(&outcome.memorable_name).await.unwrap();
	assert!(!repo.tracker.is_protected(outcome.hash).await);
}
