//! Seal entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "seals")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	/// Lowercase hex of the seal hash
	#[sea_orm(unique)]
	pub hash: String,
	#[sea_orm(unique)]
	pub memorable_name: String,
	pub iteration: i64,
	pub tree_hash: String,
	pub message: String,
	pub author_name: String,
	pub author_email: String,
	/// Unix seconds, matching the canonical encoding
	pub timestamp: i64,
	pub parent_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::seal_parent::Entity")]
	SealParents,
	#[sea_orm(has_many = "super::seal_overwrite::Entity")]
	SealOverwrites,
}

impl Related<super::seal_parent::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::SealParents.def()
	}
}

impl Related<super::seal_overwrite::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::SealOverwrites.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
