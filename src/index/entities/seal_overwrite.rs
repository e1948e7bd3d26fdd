//! Overwrite annotations carried by rewritten seals

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "seal_overwrites")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub seal_hash: String,
	pub previous_hash: String,
	pub reason: String,
	pub author: String,
	pub timestamp: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::seal::Entity",
		from = "Column::SealHash",
		to = "super::seal::Column::Hash"
	)]
	Seal,
}

impl Related<super::seal::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Seal.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
