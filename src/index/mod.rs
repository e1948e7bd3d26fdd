//! Relational index over stored seals
//!
//! SQLite via SeaORM. The index answers the queries the object store
//! cannot: lookup by memorable name, iteration, author, time range,
//! message substring and hash prefix. Writes are transactional — a seal
//! and all of its parent/overwrite rows land in one unit or not at all —
//! and serialized behind a writer lock; reads run concurrently.

pub mod entities;
pub mod migration;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait,
	Database as SeaDatabase, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
	QuerySelect, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{Chunk, Identity, ObjectHash, ObjectKind, Seal, Tree};
use crate::error::{CoreError, Result};

/// A seal as the index sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealRecord {
	pub hash: ObjectHash,
	pub memorable_name: String,
	pub iteration: u64,
	pub tree: ObjectHash,
	pub message: String,
	pub author: Identity,
	pub timestamp: i64,
	pub parent_count: usize,
}

impl SealRecord {
	fn from_model(model: entities::seal::Model) -> Result<Self> {
		let hash = ObjectHash::from_hex(&model.hash)
			.map_err(|e| CoreError::state(format!("index row has malformed hash: {e}")))?;
		let tree = ObjectHash::from_hex(&model.tree_hash)
			.map_err(|e| CoreError::state(format!("index row has malformed tree hash: {e}")))?;
		Ok(Self {
			hash,
			memorable_name: model.memorable_name,
			iteration: model.iteration as u64,
			tree,
			message: model.message,
			author: Identity::new(model.author_name, model.author_email),
			timestamp: model.timestamp,
			parent_count: model.parent_count as usize,
		})
	}
}

/// Index capability consumed by the resolver, reshape and fuse layers
#[async_trait]
pub trait SealIndex: Send + Sync {
	async fn index_seal(&self, hash: ObjectHash, seal: &Seal) -> Result<()>;
	async fn batch_index_seals(&self, seals: &[(ObjectHash, Seal)]) -> Result<()>;
	async fn index_tree(&self, hash: ObjectHash, tree: &Tree) -> Result<()>;
	async fn index_chunk(&self, hash: ObjectHash, chunk: &Chunk) -> Result<()>;
	async fn index_object(&self, hash: ObjectHash, kind: ObjectKind, size: u64) -> Result<()>;
	/// Drop a seal's rows (used when a reshape archives it out of history).
	async fn remove_seal(&self, hash: ObjectHash) -> Result<()>;

	async fn upsert_timeline(&self, name: &str, head: ObjectHash, description: &str) -> Result<()>;
	async fn remove_timeline(&self, name: &str) -> Result<()>;
	async fn rename_timeline(&self, old: &str, new: &str) -> Result<()>;

	async fn get_seal(&self, hash: ObjectHash) -> Result<Option<SealRecord>>;
	async fn parents_of(&self, hash: ObjectHash) -> Result<Vec<ObjectHash>>;
	async fn find_seal_by_name(&self, name: &str) -> Result<Option<SealRecord>>;
	/// Walk first-parent history from `head` looking for an iteration.
	async fn find_seal_by_iteration(
		&self,
		head: ObjectHash,
		iteration: u64,
	) -> Result<Option<SealRecord>>;
	async fn find_seals_by_author(&self, author: &str) -> Result<Vec<SealRecord>>;
	async fn find_seals_by_time_range(&self, start: i64, end: i64) -> Result<Vec<SealRecord>>;
	async fn find_seals_containing(&self, needle: &str) -> Result<Vec<SealRecord>>;
	async fn find_seal_by_hash_prefix(&self, prefix: &str) -> Result<Option<SealRecord>>;
	/// First-parent history from `head`, newest first.
	async fn get_seal_history(&self, head: ObjectHash, limit: usize) -> Result<Vec<SealRecord>>;
}

/// SQLite-backed index
pub struct SqliteIndex {
	conn: DatabaseConnection,
	/// Single writer at a time; readers go straight to the pool.
	write_lock: RwLock<()>,
}

impl SqliteIndex {
	/// Open (creating if needed) the index database and run migrations.
	pub async fn open(path: &Path) -> Result<Self> {
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| CoreError::io(parent, e))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());
		let mut opt = ConnectOptions::new(db_url);
		opt.max_connections(10)
			.min_connections(2)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false);

		let conn = SeaDatabase::connect(opt).await?;
		for pragma in [
			"PRAGMA journal_mode=WAL",
			"PRAGMA synchronous=NORMAL",
			"PRAGMA busy_timeout=5000",
			"PRAGMA temp_store=MEMORY",
		] {
			conn.execute(Statement::from_string(
				sea_orm::DatabaseBackend::Sqlite,
				pragma,
			))
			.await?;
		}

		migration::Migrator::up(&conn, None).await?;
		info!(path = %path.display(), "opened index database");

		Ok(Self {
			conn,
			write_lock: RwLock::new(()),
		})
	}

	async fn insert_seal_rows(
		txn: &sea_orm::DatabaseTransaction,
		hash: ObjectHash,
		seal: &Seal,
	) -> Result<()> {
		let existing = entities::seal::Entity::find()
			.filter(entities::seal::Column::Hash.eq(hash.to_hex()))
			.one(txn)
			.await?;
		if existing.is_some() {
			return Ok(());
		}

		entities::seal::ActiveModel {
			hash: Set(hash.to_hex()),
			memorable_name: Set(seal.memorable_name.clone()),
			iteration: Set(seal.iteration as i64),
			tree_hash: Set(seal.tree.to_hex()),
			message: Set(seal.message.clone()),
			author_name: Set(seal.author.name.clone()),
			author_email: Set(seal.author.email.clone()),
			timestamp: Set(seal.timestamp),
			parent_count: Set(seal.parents.len() as i32),
			..Default::default()
		}
		.insert(txn)
		.await?;

		for (position, parent) in seal.parents.iter().enumerate() {
			entities::seal_parent::ActiveModel {
				seal_hash: Set(hash.to_hex()),
				parent_hash: Set(parent.to_hex()),
				position: Set(position as i32),
				..Default::default()
			}
			.insert(txn)
			.await?;
		}

		for ow in &seal.overwrites {
			entities::seal_overwrite::ActiveModel {
				seal_hash: Set(hash.to_hex()),
				previous_hash: Set(ow.previous.to_hex()),
				reason: Set(ow.reason.clone()),
				author: Set(ow.author.clone()),
				timestamp: Set(ow.timestamp),
				..Default::default()
			}
			.insert(txn)
			.await?;
		}

		Ok(())
	}

	async fn first_parent(&self, hash: ObjectHash) -> Result<Option<ObjectHash>> {
		let row = entities::seal_parent::Entity::find()
			.filter(entities::seal_parent::Column::SealHash.eq(hash.to_hex()))
			.filter(entities::seal_parent::Column::Position.eq(0))
			.one(&self.conn)
			.await?;
		match row {
			Some(row) => Ok(Some(ObjectHash::from_hex(&row.parent_hash).map_err(
				|e| CoreError::state(format!("index parent row has malformed hash: {e}")),
			)?)),
			None => Ok(None),
		}
	}
}

#[async_trait]
impl SealIndex for SqliteIndex {
	async fn index_seal(&self, hash: ObjectHash, seal: &Seal) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let txn = self.conn.begin().await?;
		Self::insert_seal_rows(&txn, hash, seal).await?;
		txn.commit().await?;
		debug!(hash = %hash.short(), name = %seal.memorable_name, "indexed seal");
		Ok(())
	}

	async fn batch_index_seals(&self, seals: &[(ObjectHash, Seal)]) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let txn = self.conn.begin().await?;
		for (hash, seal) in seals {
			Self::insert_seal_rows(&txn, *hash, seal).await?;
		}
		txn.commit().await?;
		debug!(count = seals.len(), "indexed seal batch");
		Ok(())
	}

	async fn index_tree(&self, hash: ObjectHash, tree: &Tree) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let txn = self.conn.begin().await?;

		let existing = entities::tree::Entity::find()
			.filter(entities::tree::Column::Hash.eq(hash.to_hex()))
			.one(&txn)
			.await?;
		if existing.is_none() {
			entities::tree::ActiveModel {
				hash: Set(hash.to_hex()),
				entry_count: Set(tree.entries().len() as i32),
				..Default::default()
			}
			.insert(&txn)
			.await?;

			for (position, entry) in tree.entries().iter().enumerate() {
				entities::tree_entry::ActiveModel {
					tree_hash: Set(hash.to_hex()),
					name: Set(entry.name.clone()),
					mode: Set(entry.mode as i64),
					kind: Set(entry.kind as i32),
					child_hash: Set(entry.hash.to_hex()),
					position: Set(position as i32),
					..Default::default()
				}
				.insert(&txn)
				.await?;
			}
		}

		txn.commit().await?;
		Ok(())
	}

	async fn index_chunk(&self, hash: ObjectHash, chunk: &Chunk) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let txn = self.conn.begin().await?;
		let existing = entities::chunk::Entity::find()
			.filter(entities::chunk::Column::Hash.eq(hash.to_hex()))
			.one(&txn)
			.await?;
		if existing.is_none() {
			entities::chunk::ActiveModel {
				hash: Set(hash.to_hex()),
				blob_hash: Set(chunk.blob.to_hex()),
				chunk_index: Set(chunk.index as i32),
				chunk_count: Set(chunk.count as i32),
				size: Set(chunk.data.len() as i64),
				..Default::default()
			}
			.insert(&txn)
			.await?;
		}
		txn.commit().await?;
		Ok(())
	}

	async fn index_object(&self, hash: ObjectHash, kind: ObjectKind, size: u64) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let txn = self.conn.begin().await?;
		let existing = entities::object::Entity::find()
			.filter(entities::object::Column::Hash.eq(hash.to_hex()))
			.one(&txn)
			.await?;
		if existing.is_none() {
			entities::object::ActiveModel {
				hash: Set(hash.to_hex()),
				kind: Set(kind as i32),
				size: Set(size as i64),
				..Default::default()
			}
			.insert(&txn)
			.await?;
		}
		txn.commit().await?;
		Ok(())
	}

	async fn remove_seal(&self, hash: ObjectHash) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let txn = self.conn.begin().await?;
		entities::seal_parent::Entity::delete_many()
			.filter(entities::seal_parent::Column::SealHash.eq(hash.to_hex()))
			.exec(&txn)
			.await?;
		entities::seal_overwrite::Entity::delete_many()
			.filter(entities::seal_overwrite::Column::SealHash.eq(hash.to_hex()))
			.exec(&txn)
			.await?;
		entities::seal::Entity::delete_many()
			.filter(entities::seal::Column::Hash.eq(hash.to_hex()))
			.exec(&txn)
			.await?;
		txn.commit().await?;
		debug!(hash = %hash.short(), "removed seal from index");
		Ok(())
	}

	async fn upsert_timeline(&self, name: &str, head: ObjectHash, description: &str) -> Result<()> {
		let _guard = self.write_lock.write().await;
		let now = chrono::Utc::now();
		let existing = entities::timeline::Entity::find()
			.filter(entities::timeline::Column::Name.eq(name))
			.one(&self.conn)
			.await?;
		match existing {
			Some(model) => {
				let mut active: entities::timeline::ActiveModel = model.into();
				active.head_hash = Set(head.to_hex());
				active.description = Set(description.to_string());
				active.updated_at = Set(now);
				active.update(&self.conn).await?;
			}
			None => {
				entities::timeline::ActiveModel {
					name: Set(name.to_string()),
					head_hash: Set(head.to_hex()),
					description: Set(description.to_string()),
					created_at: Set(now),
					updated_at: Set(now),
					..Default::default()
				}
				.insert(&self.conn)
				.await?;
			}
		}
		Ok(())
	}

	async fn remove_timeline(&self, name: &str) -> Result<()> {
		let _guard = self.write_lock.write().await;
		entities::timeline::Entity::delete_many()
			.filter(entities::timeline::Column::Name.eq(name))
			.exec(&self.conn)
			.await?;
		Ok(())
	}

	async fn rename_timeline(&self, old: &str, new: &str) -> Result<()> {
		let _guard = self.write_lock.write().await;
		if let Some(model) = entities::timeline::Entity::find()
			.filter(entities::timeline::Column::Name.eq(old))
			.one(&self.conn)
			.await?
		{
			let mut active: entities::timeline::ActiveModel = model.into();
			active.name = Set(new.to_string());
			active.updated_at = Set(chrono::Utc::now());
			active.update(&self.conn).await?;
		}
		Ok(())
	}

	async fn get_seal(&self, hash: ObjectHash) -> Result<Option<SealRecord>> {
		let _guard = self.write_lock.read().await;
		let model = entities::seal::Entity::find()
			.filter(entities::seal::Column::Hash.eq(hash.to_hex()))
			.one(&self.conn)
			.await?;
		model.map(SealRecord::from_model).transpose()
	}

	async fn parents_of(&self, hash: ObjectHash) -> Result<Vec<ObjectHash>> {
		let _guard = self.write_lock.read().await;
		let rows = entities::seal_parent::Entity::find()
			.filter(entities::seal_parent::Column::SealHash.eq(hash.to_hex()))
			.order_by_asc(entities::seal_parent::Column::Position)
			.all(&self.conn)
			.await?;
		rows.into_iter()
			.map(|row| {
				ObjectHash::from_hex(&row.parent_hash).map_err(|e| {
					CoreError::state(format!("index parent row has malformed hash: {e}"))
				})
			})
			.collect()
	}

	async fn find_seal_by_name(&self, name: &str) -> Result<Option<SealRecord>> {
		let _guard = self.write_lock.read().await;
		let model = entities::seal::Entity::find()
			.filter(entities::seal::Column::MemorableName.eq(name))
			.one(&self.conn)
			.await?;
		model.map(SealRecord::from_model).transpose()
	}

	async fn find_seal_by_iteration(
		&self,
		head: ObjectHash,
		iteration: u64,
	) -> Result<Option<SealRecord>> {
		let mut cursor = head;
		while !cursor.is_zero() {
			let Some(record) = self.get_seal(cursor).await? else {
				return Ok(None);
			};
			if record.iteration == iteration {
				return Ok(Some(record));
			}
			// Iterations are monotonic along a timeline; once we walk past
			// the target there is nothing older to find.
			if record.iteration < iteration {
				return Ok(None);
			}
			match self.first_parent(cursor).await? {
				Some(parent) => cursor = parent,
				None => break,
			}
		}
		Ok(None)
	}

	async fn find_seals_by_author(&self, author: &str) -> Result<Vec<SealRecord>> {
		let _guard = self.write_lock.read().await;
		// LIKE without wildcards: case-insensitive equality, so "mira's
		// last commit" finds seals authored as "Mira".
		let rows = entities::seal::Entity::find()
			.filter(entities::seal::Column::AuthorName.like(author))
			.order_by_desc(entities::seal::Column::Timestamp)
			.all(&self.conn)
			.await?;
		rows.into_iter().map(SealRecord::from_model).collect()
	}

	async fn find_seals_by_time_range(&self, start: i64, end: i64) -> Result<Vec<SealRecord>> {
		let _guard = self.write_lock.read().await;
		let rows = entities::seal::Entity::find()
			.filter(entities::seal::Column::Timestamp.gte(start))
			.filter(entities::seal::Column::Timestamp.lte(end))
			.order_by_desc(entities::seal::Column::Timestamp)
			.all(&self.conn)
			.await?;
		rows.into_iter().map(SealRecord::from_model).collect()
	}

	async fn find_seals_containing(&self, needle: &str) -> Result<Vec<SealRecord>> {
		let _guard = self.write_lock.read().await;
		// SQLite LIKE is case-insensitive over ASCII, which is the contract
		// content references rely on.
		let rows = entities::seal::Entity::find()
			.filter(entities::seal::Column::Message.contains(needle))
			.order_by_desc(entities::seal::Column::Timestamp)
			.all(&self.conn)
			.await?;
		rows.into_iter().map(SealRecord::from_model).collect()
	}

	async fn find_seal_by_hash_prefix(&self, prefix: &str) -> Result<Option<SealRecord>> {
		let _guard = self.write_lock.read().await;
		let rows = entities::seal::Entity::find()
			.filter(entities::seal::Column::Hash.starts_with(prefix))
			.limit(2)
			.all(&self.conn)
			.await?;
		match rows.len() {
			0 => Ok(None),
			1 => SealRecord::from_model(rows.into_iter().next().expect("len checked")).map(Some),
			_ => Err(CoreError::invalid(
				"reference",
				format!("hash prefix {prefix} is ambiguous"),
			)),
		}
	}

	async fn get_seal_history(&self, head: ObjectHash, limit: usize) -> Result<Vec<SealRecord>> {
		let mut history = Vec::new();
		let mut cursor = head;
		while !cursor.is_zero() && history.len() < limit {
			let Some(record) = self.get_seal(cursor).await? else {
				break;
			};
			history.push(record);
			match self.first_parent(cursor).await? {
				Some(parent) => cursor = parent,
				None => break,
			}
		}
		Ok(history)
	}
}
