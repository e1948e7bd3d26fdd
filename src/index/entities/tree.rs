//! Tree entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trees")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	#[sea_orm(unique)]
	pub hash: String,
	pub entry_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::tree_entry::Entity")]
	TreeEntries,
}

impl Related<super::tree_entry::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::TreeEntries.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
