//! Sync/fuse coordinator integration tests
//!
//! Transport is simulated in-memory: one repository acts as the remote
//! peer of another, which is exactly the seam the network layer plugs
//! into.

mod helpers;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use forge_core::domain::{ObjectHash, ObjectKind, Seal, Tree};
use forge_core::error::{CoreError, Result};
use forge_core::fuse::{PortalTransport, SyncAction, SyncOptions};
use forge_core::store::ObjectStore;
use forge_core::Repository;

use helpers::{init_repo, read_file, seal_all, write_file};

/// Serves one repository as the remote side of a sync.
struct LocalPeer {
	remote: Arc<Repository>,
}

#[async_trait]
impl PortalTransport for LocalPeer {
	async fn fetch_head(&self, timeline: &str) -> Result<ObjectHash> {
		self.remote.timelines.get_head(timeline).await
	}

	async fn fetch_objects(
		&self,
		head: ObjectHash,
		have: &[ObjectHash],
	) -> Result<Vec<(ObjectKind, Vec<u8>)>> {
		let have: HashSet<ObjectHash> = have.iter().copied().collect();
		let mut out = Vec::new();
		let mut seen = HashSet::new();
		let mut queue = VecDeque::from([head]);
		while let Some(hash) = queue.pop_front() {
			if hash.is_zero() || !seen.insert(hash) {
				continue;
			}
			let (kind, body) = self.remote.store.get(hash).await?;
			match kind {
				ObjectKind::Seal => {
					let seal = Seal::decode(&body)
						.map_err(|e| CoreError::corrupt(hash, e.to_string()))?;
					queue.push_back(seal.tree);
					queue.extend(seal.parents.iter().copied());
				}
				ObjectKind::Tree => {
					let tree = Tree::decode(&body)
						.map_err(|e| CoreError::corrupt(hash, e.to_string()))?;
					queue.extend(tree.entries().iter().map(|e| e.hash));
				}
				_ => {}
			}
			if !have.contains(&hash) {
				out.push((kind, body));
			}
		}
		Ok(out)
	}

	async fn send_objects(
		&self,
		timeline: &str,
		head: ObjectHash,
		objects: Vec<(ObjectKind, Vec<u8>)>,
	) -> Result<()> {
		use forge_core::fuse::import::import_objects;
		use forge_core::fuse::ImportConfig;
		use std::sync::atomic::AtomicBool;

		import_objects(
			self.remote.store.clone(),
			self.remote.index.clone(),
			objects,
			&ImportConfig::default(),
			None,
			Arc::new(AtomicBool::new(false)),
		)
		.await?;
		self.remote.timelines.update_head(timeline, head).await
	}
}

#[tokio::test]
async fn test_fast_forward_sync() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = Arc::new(init_repo(dir_a.path()).await);
	let repo_b = init_repo(dir_b.path()).await;

	write_file(dir_a.path(), "readme.md", "hello from a\n").await;
	seal_all(&repo_a, "first").await;
	write_file(dir_a.path(), "src/lib.rs", "pub fn hi() {}\n").await;
	let head_a = seal_all(&repo_a, "second").await.hash;

	let peer = LocalPeer { remote: repo_a };
	let outcome = repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();

	assert_eq!(outcome.action, SyncAction::FastForward);
	assert_eq!(outcome.new_head, head_a);
	assert!(outcome.fetched > 0);
	assert_eq!(repo_b.timelines.get_head("main").await.unwrap(), head_a);

	// History and working tree landed too.
	let log = repo_b.log(None).await.unwrap();
	assert_eq!(log.len(), 2);
	assert_eq!(read_file(dir_b.path(), "readme.md").await, "hello from a\n");
	assert_eq!(read_file(dir_b.path(), "src/lib.rs").await, "pub fn hi() {}\n");

	// Second sync is a no-op.
	let again = repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();
	assert_eq!(again.action, SyncAction::UpToDate);
}

#[tokio::test]
async fn test_merge_of_disjoint_changes() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = Arc::new(init_repo(dir_a.path()).await);
	let repo_b = init_repo(dir_b.path()).await;

	// Shared base.
	write_file(dir_a.path(), "shared.txt", "line1\nline2\nline3\n").await;
	seal_all(&repo_a, "base").await;
	let peer = LocalPeer { remote: repo_a.clone() };
	repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();

	// Divergence in different files.
	write_file(dir_a.path(), "a_only.txt", "from a\n").await;
	let head_a = seal_all(&repo_a, "a work").await.hash;
	write_file(dir_b.path(), "b_only.txt", "from b\n").await;
	let head_b = seal_all(&repo_b, "b work").await.hash;

	let outcome = repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();
	assert_eq!(outcome.action, SyncAction::Merged);

	let merged = forge_core::store::TypedStore::load_seal(
		repo_b.store.as_ref(),
		outcome.new_head,
	)
	.await
	.unwrap();
	assert_eq!(merged.parents, vec![head_b, head_a]);

	// Both sides' work is present on disk.
	assert_eq!(read_file(dir_b.path(), "a_only.txt").await, "from a\n");
	assert_eq!(read_file(dir_b.path(), "b_only.txt").await, "from b\n");
	assert_eq!(
		read_file(dir_b.path(), "shared.txt").await,
		"line1\nline2\nline3\n"
	);
}

#[tokio::test]
async fn test_merge_of_disjoint_regions_in_one_file() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = Arc::new(init_repo(dir_a.path()).await);
	let repo_b = init_repo(dir_b.path()).await;

	write_file(dir_a.path(), "doc.txt", "top\nmiddle\nbottom\n").await;
	seal_all(&repo_a, "base").await;
	let peer = LocalPeer { remote: repo_a.clone() };
	repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();

	write_file(dir_a.path(), "doc.txt", "TOP\nmiddle\nbottom\n").await;
	seal_all(&repo_a, "edit top").await;
	write_file(dir_b.path(), "doc.txt", "top\nmiddle\nBOTTOM\n").await;
	seal_all(&repo_b, "edit bottom").await;

	let outcome = repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();
	assert_eq!(outcome.action, SyncAction::Merged);
	assert_eq!(read_file(dir_b.path(), "doc.txt").await, "TOP\nmiddle\nBOTTOM\n");
}

#[tokio::test]
async fn test_overlapping_edits_conflict_and_move_nothing() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = Arc::new(init_repo(dir_a.path()).await);
	let repo_b = init_repo(dir_b.path()).await;

	write_file(dir_a.path(), "doc.txt", "one\ntwo\nthree\n").await;
	seal_all(&repo_a, "base").await;
	let peer = LocalPeer { remote: repo_a.clone() };
	repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();

	write_file(dir_a.path(), "doc.txt", "one\nTWO-a\nthree\n").await;
	seal_all(&repo_a, "a edit").await;
	write_file(dir_b.path(), "doc.txt", "one\nTWO-b\nthree\n").await;
	let head_b = seal_all(&repo_b, "b edit").await.hash;

	let result = repo_b.sync(&peer, &SyncOptions::default()).await;
	match result {
		Err(CoreError::Conflict { paths }) => assert_eq!(paths, vec!["doc.txt"]),
		other => panic!("expected Conflict, got {other:?}"),
	}
	// The local head did not move.
	assert_eq!(repo_b.timelines.get_head("main").await.unwrap(), head_b);
}

#[tokio::test]
async fn test_fast_forward_strategy_refuses_divergence() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = Arc::new(init_repo(dir_a.path()).await);
	let repo_b = init_repo(dir_b.path()).await;

	write_file(dir_a.path(), "x.txt", "base\n").await;
	seal_all(&repo_a, "base").await;
	let peer = LocalPeer { remote: repo_a.clone() };
	repo_b.sync(&peer, &SyncOptions::default()).await.unwrap();

	write_file(dir_a.path(), "a.txt", "a\n").await;
	seal_all(&repo_a, "a work").await;
	write_file(dir_b.path(), "b.txt", "b\n").await;
	seal_all(&repo_b, "b work").await;

	let options = SyncOptions {
		strategy: forge_core::fuse::SyncStrategy::FastForward,
		..Default::default()
	};
	assert!(matches!(
		repo_b.sync(&peer, &options).await,
		Err(CoreError::State(_))
	));
}

#[tokio::test]
async fn test_dirty_workspace_blocks_sync_unless_forced() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = Arc::new(init_repo(dir_a.path()).await);
	let repo_b = init_repo(dir_b.path()).await;

	write_file(dir_a.path(), "x.txt", "remote\n").await;
	seal_all(&repo_a, "remote work").await;

	// Uncommitted local file.
	write_file(dir_b.path(), "draft.txt", "unsaved\n").await;

	let peer = LocalPeer { remote: repo_a.clone() };
	assert!(matches!(
		repo_b.sync(&peer, &SyncOptions::default()).await,
		Err(CoreError::State(_))
	));

	let forced = SyncOptions {
		force: true,
		..Default::default()
	};
	let outcome = repo_b.sync(&peer, &forced).await.unwrap();
	assert_eq!(outcome.action, SyncAction::FastForward);
}

#[tokio::test]
async fn test_push_lands_history_on_the_peer() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();
	let repo_a = init_repo(dir_a.path()).await;
	let repo_b = Arc::new(init_repo(dir_b.path()).await);

	write_file(dir_a.path(), "pushed.txt", "over the wire\n").await;
	let head = seal_all(&repo_a, "to be pushed").await.hash;

	let peer = LocalPeer { remote: repo_b.clone() };
	let sent = repo_a.push(&peer, "main").await.unwrap();
	assert!(sent >= 3, "seal, tree and blob at minimum");
	assert_eq!(repo_b.timelines.get_head("main").await.unwrap(), head);
	assert_eq!(repo_b.log(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_large_blobs_travel_as_chunks_on_push() {
	let dir_a = TempDir::new().unwrap();
	let dir_b = TempDir::new().unwrap();

	// Shrink the pushing side's chunk threshold before opening it.
	{
		let repo = init_repo(dir_a.path()).await;
		drop(repo);
		let config_path = dir_a.path().join(".forge/config.json");
		let mut config: serde_json::Value =
			serde_json::from_str(&tokio::fs::read_to_string(&config_path).await.unwrap())
				.unwrap();
		config["chunk_threshold"] = serde_json::json!(1024);
		tokio::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap())
			.await
			.unwrap();
	}
	let repo_a = Repository::open(dir_a.path()).await.unwrap();
	let repo_b = Arc::new(init_repo(dir_b.path()).await);

	let big: String = "0123456789abcdef\n".repeat(512); // ~8 KiB
	write_file(dir_a.path(), "big.bin", &big).await;
	let head = seal_all(&repo_a, "big file").await.hash;

	let peer = LocalPeer { remote: repo_b.clone() };
	let sent = repo_a.push(&peer, "main").await.unwrap();
	// One seal, one tree, and the blob split into several segments.
	assert!(sent > 3, "expected chunked transfer, sent {sent} objects");

	// The peer reassembled the blob and can serve the full file.
	let seal = forge_core::store::TypedStore::load_seal(repo_b.store.as_ref(), head)
		.await
		.unwrap();
	let tree = forge_core::store::TypedStore::load_tree(repo_b.store.as_ref(), seal.tree)
		.await
		.unwrap();
	let entry = tree.find("big.bin").unwrap();
	let blob = forge_core::store::TypedStore::load_blob(repo_b.store.as_ref(), entry.hash)
		.await
		.unwrap();
	assert_eq!(blob.data, big.as_bytes());
}
