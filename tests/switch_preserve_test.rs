//! Timeline switching and workspace auto-preservation

mod helpers;

use tempfile::TempDir;

use forge_core::domain::FileStatus;

use helpers::{init_repo, read_file, seal_all, write_file};

#[tokio::test]
async fn test_switch_preserves_and_restores_work() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	// Shared base on main.
	write_file(dir.path(), "shared.txt", "base\n").await;
	write_file(dir.path(), "tool.txt", "tool v1\n").await;
	seal_all(&repo, "base layout").await;
	repo.timelines.create("feature", "side work").await.unwrap();

	// One modified file plus one gathered file.
	write_file(dir.path(), "shared.txt", "work in progress\n").await;
	write_file(dir.path(), "tool.txt", "tool v2 staged\n").await;
	repo.status().await.unwrap();
	repo.workspace.gather(&["tool.txt".to_string()]).await.unwrap();

	// Switching away must capture exactly those two files.
	repo.switch_timeline("feature").await.unwrap();
	let snapshots = repo.snapshots.list().await.unwrap();
	assert_eq!(snapshots.len(), 1);
	let snapshot = &snapshots[0];
	assert!(snapshot.auto_saved);
	assert_eq!(snapshot.timeline, "main");
	assert_eq!(snapshot.files.len(), 1);
	assert!(snapshot.files.contains_key("shared.txt"));
	assert_eq!(snapshot.anvil_files.len(), 1);
	assert!(snapshot.anvil_files.contains_key("tool.txt"));

	// The feature workspace is the sealed base, clean.
	assert_eq!(read_file(dir.path(), "shared.txt").await, "base\n");
	assert_eq!(read_file(dir.path(), "tool.txt").await, "tool v1\n");
	assert!(repo.status().await.unwrap().is_clean());

	// Switching back restores content byte-for-byte, anvil membership
	// included, and consumes the snapshot.
	repo.switch_timeline("main").await.unwrap();
	assert_eq!(read_file(dir.path(), "shared.txt").await, "work in progress\n");
	assert_eq!(read_file(dir.path(), "tool.txt").await, "tool v2 staged\n");

	let status = repo.status().await.unwrap();
	let shared = status.files.iter().find(|f| f.path == "shared.txt").unwrap();
	assert_eq!(shared.status, FileStatus::Modified);
	let tool = status
		.anvil_files
		.iter()
		.find(|f| f.path == "tool.txt")
		.unwrap();
	assert_eq!(tool.status, FileStatus::Gathered);
	assert!(tool.on_anvil);

	assert!(repo.snapshots.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_switch_round_trip_is_lossless() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;

	write_file(dir.path(), "a.txt", "main content\n").await;
	seal_all(&repo, "main base").await;

	repo.timelines.create("feature", "").await.unwrap();
	repo.switch_timeline("feature").await.unwrap();
	write_file(dir.path(), "a.txt", "feature content\n").await;
	seal_all(&repo, "feature change").await;

	// A -> B -> A: the working tree tracks each timeline's head.
	repo.switch_timeline("main").await.unwrap();
	assert_eq!(read_file(dir.path(), "a.txt").await, "main content\n");
	repo.switch_timeline("feature").await.unwrap();
	assert_eq!(read_file(dir.path(), "a.txt").await, "feature content\n");
	repo.switch_timeline("main").await.unwrap();
	assert_eq!(read_file(dir.path(), "a.txt").await, "main content\n");
	assert!(repo.status().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_clean_switch_makes_no_snapshot() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;
	write_file(dir.path(), "a.txt", "content\n").await;
	seal_all(&repo, "base").await;

	repo.timelines.create("feature", "").await.unwrap();
	repo.switch_timeline("feature").await.unwrap();
	assert!(repo.snapshots.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_named_shelf_survives_switches() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;
	write_file(dir.path(), "a.txt", "base\n").await;
	seal_all(&repo, "base").await;

	write_file(dir.path(), "a.txt", "shelved edit\n").await;
	repo.shelf_create("half-done", "paused refactor").await.unwrap();

	// Named snapshots are never consumed by switching.
	repo.timelines.create("feature", "").await.unwrap();
	repo.switch_timeline("feature").await.unwrap();
	repo.switch_timeline("main").await.unwrap();

	let named: Vec<_> = repo
		.shelf_list()
		.await
		.unwrap()
		.into_iter()
		.filter(|s| s.name.is_some())
		.collect();
	assert_eq!(named.len(), 1);

	// Restoring the shelf brings the edit back.
	write_file(dir.path(), "a.txt", "base\n").await;
	repo.status().await.unwrap();
	repo.shelf_restore("half-done").await.unwrap();
	assert_eq!(read_file(dir.path(), "a.txt").await, "shelved edit\n");

	repo.shelf_delete("half-done").await.unwrap();
	assert!(repo.shelf_list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ignored_files_survive_switching() {
	let dir = TempDir::new().unwrap();
	let repo = init_repo(dir.path()).await;
	write_file(dir.path(), "tracked.txt", "content\n").await;
	write_file(dir.path(), ".forgeignore", "scratch.txt\n").await;
	repo.refresh_ignores().await.unwrap();
	write_file(dir.path(), "scratch.txt", "untracked scratch\n").await;
	seal_all(&repo, "base").await;

	repo.timelines.create("feature", "").await.unwrap();
	repo.switch_timeline("feature").await.unwrap();
	assert!(dir.path().join("scratch.txt").exists());
	assert_eq!(read_file(dir.path(), "tracked.txt").await, "content\n");
}
