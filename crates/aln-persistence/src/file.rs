use crate::error::{PersistenceError, Result};
use crate::store::Persistence;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One file per key under `data_dir`. Writes go to a temp file in the same
/// directory and are renamed into place, so a crash mid-write never leaves a
/// half-written blob behind — the atomic write-through §9 calls for.
#[derive(Debug, Clone)]
pub struct FileStore {
	data_dir: PathBuf,
}

impl FileStore {
	/// # Errors
	/// Returns an error if `data_dir` cannot be created.
	pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
		let data_dir = data_dir.into();
		tokio::fs::create_dir_all(&data_dir)
			.await
			.map_err(|source| PersistenceError::Io { key: data_dir.display().to_string(), source })?;
		Ok(Self { data_dir })
	}

	fn path_for(&self, key: &str) -> PathBuf {
		// Keys carry `:` (session:, archive:session:, ...); encode rather than
		// nest directories so every key maps to exactly one flat filename.
		let encoded = key.replace(':', "__");
		self.data_dir.join(encoded)
	}

	fn key_for(data_dir: &Path, path: &Path) -> Option<String> {
		path.strip_prefix(data_dir).ok().and_then(|p| p.to_str()).map(|s| s.replace("__", ":"))
	}
}

#[async_trait]
impl Persistence for FileStore {
	async fn save(&self, key: &str, blob: &[u8]) -> Result<()> {
		let target = self.path_for(key);
		let tmp = target.with_extension("tmp");
		tokio::fs::write(&tmp, blob).await.map_err(|source| PersistenceError::Io { key: key.to_string(), source })?;
		tokio::fs::rename(&tmp, &target).await.map_err(|source| PersistenceError::Io { key: key.to_string(), source })?;
		Ok(())
	}

	async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
		match tokio::fs::read(self.path_for(key)).await {
			Ok(blob) => Ok(Some(blob)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(source) => Err(PersistenceError::Io { key: key.to_string(), source }),
		}
	}

	async fn delete(&self, key: &str) -> Result<()> {
		match tokio::fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(PersistenceError::Io { key: key.to_string(), source }),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(self.path_for(key).exists())
	}

	async fn keys(&self) -> Result<BTreeSet<String>> {
		let mut entries = tokio::fs::read_dir(&self.data_dir)
			.await
			.map_err(|source| PersistenceError::Io { key: self.data_dir.display().to_string(), source })?;
		let mut keys = BTreeSet::new();
		while let Some(entry) = entries.next_entry().await.map_err(|source| PersistenceError::Io { key: self.data_dir.display().to_string(), source })? {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
				continue;
			}
			if let Some(key) = Self::key_for(&self.data_dir, &path) {
				keys.insert(key);
			}
		}
		Ok(keys)
	}

	async fn clear(&self) -> Result<()> {
		for key in self.keys().await? {
			self.delete(&key).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn save_then_load_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(dir.path()).await.unwrap();
		store.save("session:s1", b"hello").await.unwrap();
		assert_eq!(store.load("session:s1").await.unwrap(), Some(b"hello".to_vec()));
	}

	#[tokio::test]
	async fn keys_roundtrip_through_colon_encoding() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(dir.path()).await.unwrap();
		store.save("archive:session:s1", b"x").await.unwrap();
		let keys = store.keys().await.unwrap();
		assert!(keys.contains("archive:session:s1"));
	}

	#[tokio::test]
	async fn delete_missing_key_is_ok() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(dir.path()).await.unwrap();
		store.delete("nope").await.unwrap();
	}
}
