//! Initial migration: seal, object, tree, chunk and timeline tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Seals::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Seals::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Seals::Hash).string().not_null().unique_key())
					.col(
						ColumnDef::new(Seals::MemorableName)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Seals::Iteration).big_integer().not_null())
					.col(ColumnDef::new(Seals::TreeHash).string().not_null())
					.col(ColumnDef::new(Seals::Message).text().not_null())
					.col(ColumnDef::new(Seals::AuthorName).string().not_null())
					.col(ColumnDef::new(Seals::AuthorEmail).string().not_null())
					.col(ColumnDef::new(Seals::Timestamp).big_integer().not_null())
					.col(ColumnDef::new(Seals::ParentCount).integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(SealParents::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(SealParents::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(SealParents::SealHash).string().not_null())
					.col(ColumnDef::new(SealParents::ParentHash).string().not_null())
					.col(ColumnDef::new(SealParents::Position).integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(SealOverwrites::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(SealOverwrites::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(SealOverwrites::SealHash).string().not_null())
					.col(
						ColumnDef::new(SealOverwrites::PreviousHash)
							.string()
							.not_null(),
					)
					.col(ColumnDef::new(SealOverwrites::Reason).text().not_null())
					.col(ColumnDef::new(SealOverwrites::Author).string().not_null())
					.col(
						ColumnDef::new(SealOverwrites::Timestamp)
							.big_integer()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Objects::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Objects::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Objects::Hash).string().not_null().unique_key())
					.col(ColumnDef::new(Objects::Kind).integer().not_null())
					.col(ColumnDef::new(Objects::Size).big_integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Trees::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Trees::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Trees::Hash).string().not_null().unique_key())
					.col(ColumnDef::new(Trees::EntryCount).integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(TreeEntries::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(TreeEntries::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(TreeEntries::TreeHash).string().not_null())
					.col(ColumnDef::new(TreeEntries::Name).string().not_null())
					.col(ColumnDef::new(TreeEntries::Mode).big_integer().not_null())
					.col(ColumnDef::new(TreeEntries::Kind).integer().not_null())
					.col(ColumnDef::new(TreeEntries::ChildHash).string().not_null())
					.col(ColumnDef::new(TreeEntries::Position).integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Chunks::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Chunks::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Chunks::Hash).string().not_null().unique_key())
					.col(ColumnDef::new(Chunks::BlobHash).string().not_null())
					.col(ColumnDef::new(Chunks::ChunkIndex).integer().not_null())
					.col(ColumnDef::new(Chunks::ChunkCount).integer().not_null())
					.col(ColumnDef::new(Chunks::Size).big_integer().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Timelines::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Timelines::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(
						ColumnDef::new(Timelines::Name)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Timelines::HeadHash).string().not_null())
					.col(ColumnDef::new(Timelines::Description).text().not_null())
					.col(
						ColumnDef::new(Timelines::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(Timelines::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		// Query-path indices: the resolver hits these constantly.
		manager
			.create_index(
				Index::create()
					.name("idx_seals_iteration")
					.table(Seals::Table)
					.col(Seals::Iteration)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_seals_timestamp")
					.table(Seals::Table)
					.col(Seals::Timestamp)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_seals_author_name")
					.table(Seals::Table)
					.col(Seals::AuthorName)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_seal_parents_seal")
					.table(SealParents::Table)
					.col(SealParents::SealHash)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_seal_overwrites_seal")
					.table(SealOverwrites::Table)
					.col(SealOverwrites::SealHash)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_tree_entries_tree")
					.table(TreeEntries::Table)
					.col(TreeEntries::TreeHash)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_chunks_blob")
					.table(Chunks::Table)
					.col(Chunks::BlobHash)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		// Drop tables in reverse order of creation
		manager
			.drop_table(Table::drop().table(Timelines::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Chunks::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(TreeEntries::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Trees::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Objects::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(SealOverwrites::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(SealParents::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Seals::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(Iden)]
enum Seals {
	Table,
	Id,
	Hash,
	MemorableName,
	Iteration,
	TreeHash,
	Message,
	AuthorName,
	AuthorEmail,
	Timestamp,
	ParentCount,
}

#[derive(Iden)]
enum SealParents {
	Table,
	Id,
	SealHash,
	ParentHash,
	Position,
}

#[derive(Iden)]
enum SealOverwrites {
	Table,
	Id,
	SealHash,
	PreviousHash,
	Reason,
	Author,
	Timestamp,
}

#[derive(Iden)]
enum Objects {
	Table,
	Id,
	Hash,
	Kind,
	Size,
}

#[derive(Iden)]
enum Trees {
	Table,
	Id,
	Hash,
	EntryCount,
}

#[derive(Iden)]
enum TreeEntries {
	Table,
	Id,
	TreeHash,
	Name,
	Mode,
	Kind,
	ChildHash,
	Position,
}

#[derive(Iden)]
enum Chunks {
	Table,
	Id,
	Hash,
	BlobHash,
	ChunkIndex,
	ChunkCount,
	Size,
}

#[derive(Iden)]
enum Timelines {
	Table,
	Id,
	Name,
	HeadHash,
	Description,
	CreatedAt,
	UpdatedAt,
}
