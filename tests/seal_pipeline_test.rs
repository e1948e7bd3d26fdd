//! Integration tests for the workspace engine and the seal pipeline

mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use forge_core::domain::{FileStatus, Identity, ObjectHash, ObjectKind};
use forge_core::error::{CoreError, Result};
use forge_core::index::SqliteIndex;
use forge_core::position::PositionManager;
use forge_core::refs::{MemorableNameGenerator, ReferenceRegistry};
use forge_core::shared::SystemClock;
use forge_core::store::{MemoryObjectStore, ObjectStore};
use forge_core::timeline::TimelineManager;
use forge_core::workspace::{SnapshotManager, WorkspaceEngine};

use helpers::{init_repo, seal_all, write_file};

#[tokio::test]
async fn test_scan_classifies_files() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "alpha\n").await;
	write_file(dir.path(), "src/b.rs", "fn b() {}\n").await;
	seal_all(&repo, "initial layout").await;

	// Untouched files stay unmodified.
	let status = repo.status().await.unwrap();
	assert!(status.is_clean());

	// Edit one, add one, delete one.
	write_file(dir.path(), "a.txt", "alpha changed\n").await;
	write_file(dir.path(), "c.txt", "new file\n").await;
	tokio::fs::remove_file(dir.path().join("src/b.rs")).await.unwrap();

	let status = repo.status().await.unwrap();
	let by_path = |path: &str| {
		status
			.files
			.iter()
			.find(|f| f.path == path)
			.unwrap_or_else(|| panic!("missing {path}"))
			.status
	};
	assert_eq!(by_path("a.txt"), FileStatus::Modified);
	assert_eq!(by_path("c.txt"), FileStatus::Added);
	assert_eq!(by_path("src/b.rs"), FileStatus::Deleted);
}

#[tokio::test]
async fn test_seal_advances_head_and_clears_anvil() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "notes.md", "remember the anvil\n").await;
	let outcome = seal_all(&repo, "first seal").await;

	assert_eq!(outcome.iteration, 1);
	assert!(!outcome.hash.is_zero());
	assert_eq!(
		repo.timelines.get_head("main").await.unwrap(),
		outcome.hash
	);
	assert_eq!(
		repo.positions.current().await.unwrap().hash,
		outcome.hash
	);

	let status = repo.status().await.unwrap();
	assert!(status.anvil_files.is_empty());
	assert!(status.files.iter().all(|f| f.status == FileStatus::Unmodified
		&& f.base_hash == f.working_hash));

	// The memorable name resolves to the seal.
	assert_eq!(
		repo.resolve(&outcome.memorable_name).await.unwrap(),
		outcome.hash
	);
}

#[tokio::test]
async fn test_gather_then_discard_is_observably_unchanged() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "one\n").await;
	seal_all(&repo, "base").await;
	write_file(dir.path(), "a.txt", "two\n").await;

	let before = repo.status().await.unwrap();
	repo.gather(&["a.txt".to_string()]).await.unwrap();
	repo.discard(&["a.txt".to_string()]).await.unwrap();
	let after = repo.status().await.unwrap();

	assert_eq!(before.files, after.files);
	assert!(after.anvil_files.is_empty());
}

#[tokio::test]
async fn test_seal_then_restore_scans_clean() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "x.txt", "x\n").await;
	write_file(dir.path(), "deep/nested/y.txt", "y\n").await;
	let outcome = seal_all(&repo, "two files").await;

	write_file(dir.path(), "x.txt", "scribbled over\n").await;
	tokio::fs::remove_file(dir.path().join("deep/nested/y.txt")).await.unwrap();

	repo.workspace
		.restore_working_directory(outcome.hash)
		.await
		.unwrap();
	let status = repo.status().await.unwrap();
	assert!(status.is_clean(), "restore must leave every file unmodified");
	assert_eq!(helpers::read_file(dir.path(), "x.txt").await, "x\n");
	assert_eq!(helpers::read_file(dir.path(), "deep/nested/y.txt").await, "y\n");
}

#[tokio::test]
async fn test_sealing_empty_anvil_fails() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;
	assert!(matches!(
		repo.seal("nothing staged").await,
		Err(CoreError::State(_))
	));
}

#[tokio::test]
async fn test_ignored_files_never_tracked() {
	let dir = TempDir::new().unwrap();
	write_file(dir.path(), ".forgeignore", "*.log\ntarget\n").await;
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "keep.txt", "kept\n").await;
	write_file(dir.path(), "debug.log", "noise\n").await;
	write_file(dir.path(), "target/out.bin", "artifact\n").await;

	let status = repo.status().await.unwrap();
	let paths: Vec<&str> = status.files.iter().map(|f| f.path.as_str()).collect();
	assert!(paths.contains(&"keep.txt"));
	assert!(!paths.contains(&"debug.log"));
	assert!(!paths.iter().any(|p| p.starts_with("target/")));
}

/// Store wrapper that fails seal writes on demand.
struct FailingSealStore {
	inner: MemoryObjectStore,
	fail_seals: AtomicBool,
}

#[async_trait]
impl ObjectStore for FailingSealStore {
	async fn put(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectHash> {
		if kind == ObjectKind::Seal && self.fail_seals.load(Ordering::SeqCst) {
			return Err(CoreError::io(
				"/injected/seal-write",
				std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
			));
		}
		self.inner.put(kind, body).await
	}

	async fn get(&self, hash: ObjectHash) -> Result<(ObjectKind, Vec<u8>)> {
		self.inner.get(hash).await
	}

	async fn exists(&self, hash: ObjectHash) -> bool {
		self.inner.exists(hash).await
	}

	async fn remove(&self, hash: ObjectHash) -> Result<()> {
		self.inner.remove(hash).await
	}

	async fn list(&self) -> Result<Vec<ObjectHash>> {
		self.inner.list().await
	}
}

#[tokio::test]
async fn test_seal_failure_leaves_head_position_and_anvil_unchanged() {
	let dir = TempDir::new().unwrap();
	let vcs_dir = dir.path().join(".forge");
	tokio::fs::create_dir_all(&vcs_dir).await.unwrap();
	let clock = Arc::new(SystemClock);

	let store = Arc::new(FailingSealStore {
		inner: MemoryObjectStore::new(),
		fail_seals: AtomicBool::new(false),
	});
	let index = Arc::new(SqliteIndex::open(&vcs_dir.join("index.db")).await.unwrap());
	let timelines = Arc::new(
		TimelineManager::initialize(vcs_dir.join("timelines.json"), index.clone(), clock.clone())
			.await
			.unwrap(),
	);
	let positions = Arc::new(
		PositionManager::initialize(vcs_dir.join("position").join("config.json"), clock.clone())
			.await
			.unwrap(),
	);
	let registry = Arc::new(
		ReferenceRegistry::initialize(vcs_dir.join("references.json"), clock.clone())
			.await
			.unwrap(),
	);
	let snapshots = Arc::new(SnapshotManager::new(vcs_dir.join("snapshots")));
	let workspace = WorkspaceEngine::open(
		dir.path().to_path_buf(),
		vcs_dir.clone(),
		store.clone(),
		index.clone(),
		registry.clone(),
		Arc::new(MemorableNameGenerator::with_seed(11)),
		timelines.clone(),
		positions.clone(),
		snapshots,
		clock,
		Identity::new("Mira", "mira@example.com"),
	)
	.await
	.unwrap();

	write_file(dir.path(), "work.txt", "important\n").await;
	workspace.scan().await.unwrap();
	workspace.gather(&[".".to_string()]).await.unwrap();

	// Inject the failure at the seal-object write.
	store.fail_seals.store(true, Ordering::SeqCst);
	let objects_before = store.list().await.unwrap().len();
	assert!(workspace.seal("doomed attempt").await.is_err());

	// Head, position and anvil are untouched.
	assert!(timelines.get_head("main").await.unwrap().is_zero());
	assert!(positions.current().await.is_none());
	let status = workspace.status().await.unwrap();
	assert_eq!(status.anvil_files.len(), 1);
	assert_eq!(status.anvil_files[0].status, FileStatus::Gathered);

	// Blobs and trees written before the failure remain.
	assert!(store.list().await.unwrap().len() > objects_before);

	// A retry succeeds.
	store.fail_seals.store(false, Ordering::SeqCst);
	let outcome = workspace.seal("second attempt").await.unwrap();
	assert_eq!(timelines.get_head("main").await.unwrap(), outcome.hash);
	assert_eq!(positions.current().await.unwrap().hash, outcome.hash);
	assert!(workspace.status().await.unwrap().anvil_files.is_empty());
}
