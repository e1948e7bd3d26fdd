//! In-memory object store for tests and import staging

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{ObjectHash, ObjectKind};
use crate::error::{CoreError, Result};

use super::ObjectStore;

#[derive(Default)]
pub struct MemoryObjectStore {
	objects: RwLock<HashMap<ObjectHash, (ObjectKind, Vec<u8>)>>,
}

impl MemoryObjectStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.objects.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.read().unwrap().is_empty()
	}
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
	async fn put(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectHash> {
		let hash = ObjectHash::compute(kind, body);
		self.objects
			.write()
			.unwrap()
			.entry(hash)
			.or_insert_with(|| (kind, body.to_vec()));
		Ok(hash)
	}

	async fn get(&self, hash: ObjectHash) -> Result<(ObjectKind, Vec<u8>)> {
		self.objects
			.read()
			.unwrap()
			.get(&hash)
			.cloned()
			.ok_or_else(|| CoreError::not_found("object", hash.to_hex()))
	}

	async fn exists(&self, hash: ObjectHash) -> bool {
		self.objects.read().unwrap().contains_key(&hash)
	}

	async fn remove(&self, hash: ObjectHash) -> Result<()> {
		self.objects.write().unwrap().remove(&hash);
		Ok(())
	}

	async fn list(&self) -> Result<Vec<ObjectHash>> {
		Ok(self.objects.read().unwrap().keys().copied().collect())
	}
}
