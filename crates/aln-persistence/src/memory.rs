use crate::error::Result;
use crate::store::Persistence;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;

/// Zero-I/O backend backed by a `DashMap`, used by every unit test and the
/// `test()` configuration profile. Lock-free, cheaply `Clone`-able, no
/// shared-mutex contention across tasks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	blobs: std::sync::Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl Persistence for MemoryStore {
	async fn save(&self, key: &str, blob: &[u8]) -> Result<()> {
		self.blobs.insert(key.to_string(), blob.to_vec());
		Ok(())
	}

	async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
	}

	async fn delete(&self, key: &str) -> Result<()> {
		self.blobs.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(self.blobs.contains_key(key))
	}

	async fn keys(&self) -> Result<BTreeSet<String>> {
		Ok(self.blobs.iter().map(|entry| entry.key().clone()).collect())
	}

	async fn clear(&self) -> Result<()> {
		self.blobs.clear();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn save_then_load_round_trips() {
		let store = MemoryStore::new();
		store.save("session:s1", b"hello").await.unwrap();
		assert_eq!(store.load("session:s1").await.unwrap(), Some(b"hello".to_vec()));
	}

	#[tokio::test]
	async fn missing_key_loads_none() {
		let store = MemoryStore::new();
		assert_eq!(store.load("nope").await.unwrap(), None);
	}

	#[tokio::test]
	async fn prefix_listing() {
		let store = MemoryStore::new();
		store.save("session:s1", b"a").await.unwrap();
		store.save("session:s2", b"b").await.unwrap();
		store.save("tokens:all", b"c").await.unwrap();
		let keys = store.keys_with_prefix("session:").await.unwrap();
		assert_eq!(keys.len(), 2);
	}

	#[tokio::test]
	async fn json_round_trip() {
		let store = MemoryStore::new();
		store.save_json("k", &vec![1, 2, 3]).await.unwrap();
		let back: Vec<i32> = store.load_json("k").await.unwrap().unwrap();
		assert_eq!(back, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn clear_removes_everything() {
		let store = MemoryStore::new();
		store.save("a", b"1").await.unwrap();
		store.clear().await.unwrap();
		assert!(store.keys().await.unwrap().is_empty());
	}
}
