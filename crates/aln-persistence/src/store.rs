use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Blobs keyed by string; atomic `save/load/delete`; list by key prefix.
///
/// One async trait, multiple backends behind it. Backend choice is startup
/// configuration (§1), never a runtime branch inside a service.
#[async_trait]
pub trait Persistence: Send + Sync {
	async fn save(&self, key: &str, blob: &[u8]) -> Result<()>;
	async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
	async fn delete(&self, key: &str) -> Result<()>;
	async fn exists(&self, key: &str) -> Result<bool>;
	async fn keys(&self) -> Result<BTreeSet<String>>;
	async fn clear(&self) -> Result<()>;

	/// Convenience: JSON-encode `value` and `save` it.
	async fn save_json<T>(&self, key: &str, value: &T) -> Result<()>
	where
		T: serde::Serialize + Sync,
	{
		let blob = serde_json::to_vec(value).map_err(|source| crate::error::PersistenceError::Serde { key: key.to_string(), source })?;
		self.save(key, &blob).await
	}

	/// Convenience: `load` and JSON-decode, returning `None` for a missing key.
	async fn load_json<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: serde::de::DeserializeOwned,
	{
		match self.load(key).await? {
			Some(blob) => {
				let value = serde_json::from_slice(&blob).map_err(|source| crate::error::PersistenceError::Serde { key: key.to_string(), source })?;
				Ok(Some(value))
			}
			None => Ok(None),
		}
	}

	/// `keys()` filtered to those starting with `prefix` — the convention used
	/// throughout §6 (`session:`, `archive:session:`, `backup:`, ...).
	async fn keys_with_prefix(&self, prefix: &str) -> Result<BTreeSet<String>> {
		Ok(self.keys().await?.into_iter().filter(|k| k.starts_with(prefix)).collect())
	}
}
