//! Tree entry rows, preserving canonical order

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tree_entries")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub tree_hash: String,
	pub name: String,
	pub mode: i64,
	/// Kind tag of the child: 1=blob, 2=tree
	pub kind: i32,
	pub child_hash: String,
	pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::tree::Entity",
		from = "Column::TreeHash",
		to = "super::tree::Column::Hash"
	)]
	Tree,
}

impl Related<super::tree::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Tree.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
