//! Object storage abstraction for the snapshot bucket.
//!
//! Wraps an [`object_store::ObjectStore`] behind the small surface the
//! pipeline needs: delimiter listing of top-level snapshot folders,
//! existence probes for completion markers, file reads, and recursive
//! prefix deletion. Supports S3 for production and the local filesystem
//! for tests.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use tracing::debug;
use url::Url;

use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};

/// A reference-counted snapshot store.
pub type SnapshotStoreRef = Arc<SnapshotStore>;

/// Storage handle for the snapshot bucket.
#[derive(Clone)]
pub struct SnapshotStore {
    object_store: Arc<dyn ObjectStore>,
    /// Key prefix within the store, when the URL carries one.
    key: Option<Path>,
    canonical_url: String,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SnapshotStore<{}>", self.canonical_url)
    }
}

impl SnapshotStore {
    /// Create a store for the given URL with storage options.
    ///
    /// URLs with a scheme (`s3://bucket/prefix`) are dispatched to the
    /// matching cloud backend; bare paths map to the local filesystem.
    pub fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        if url.is_empty() {
            return InvalidUrlSnafu { url }.fail();
        }

        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() != "file" => {
                let (store, key) =
                    object_store::parse_url_opts(&parsed, options).context(ObjectStoreSnafu)?;
                let key = (!key.as_ref().is_empty()).then_some(key);
                Ok(Self {
                    object_store: Arc::from(store),
                    key,
                    canonical_url: url.to_string(),
                })
            }
            _ => {
                let path = url.strip_prefix("file://").unwrap_or(url);
                let store = LocalFileSystem::new_with_prefix(path)
                    .map_err(|source| StorageError::ObjectStore { source })?
                    .with_automatic_cleanup(true);
                Ok(Self {
                    object_store: Arc::new(store),
                    key: None,
                    canonical_url: url.to_string(),
                })
            }
        }
    }

    /// Qualify a path with the configured key prefix.
    fn qualify(&self, path: &Path) -> Path {
        match &self.key {
            Some(prefix) => prefix.parts().chain(path.parts()).collect(),
            None => path.clone(),
        }
    }

    /// Strip the configured key prefix from an absolute path.
    fn strip(&self, path: &Path) -> Path {
        let skip = self
            .key
            .as_ref()
            .map(|key| key.parts().count())
            .unwrap_or_default();
        path.parts().skip(skip).collect()
    }

    /// List top-level folder names one level deep, using a delimiter listing.
    ///
    /// Returns the final path segment of each common prefix, unsorted.
    pub async fn list_top_level_dirs(&self) -> Result<Vec<String>, StorageError> {
        let listing = self
            .object_store
            .list_with_delimiter(self.key.as_ref())
            .await
            .context(ObjectStoreSnafu)?;

        let dirs: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|prefix| self.strip(prefix).parts().last().map(|p| p.as_ref().to_string()))
            .collect();

        debug!(count = dirs.len(), "Listed top-level folders");
        Ok(dirs)
    }

    /// Check whether an object exists at the given path.
    pub async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        match self.object_store.head(&self.qualify(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// List every object under a prefix, paginating through the store.
    ///
    /// Returns paths relative to the configured key prefix, sorted.
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<Path>, StorageError> {
        let full_prefix = self.qualify(&Path::from(prefix));
        let mut paths: Vec<Path> = self
            .object_store
            .list(Some(&full_prefix))
            .map_ok(|meta| self.strip(&meta.location))
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;
        paths.sort();
        Ok(paths)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let result = self
            .object_store
            .get(&self.qualify(path))
            .await
            .context(ObjectStoreSnafu)?;
        result.bytes().await.context(ObjectStoreSnafu)
    }

    /// Put bytes to a path. Used by fixtures and tests.
    pub async fn put(&self, path: &Path, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.object_store
            .put(&self.qualify(path), PutPayload::from(Bytes::from(bytes)))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete every object under a prefix, batching deletes through the store.
    ///
    /// Returns the number of objects deleted.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let full_prefix = self.qualify(&Path::from(prefix));
        let locations = self
            .object_store
            .list(Some(&full_prefix))
            .map_ok(|meta| meta.location)
            .boxed();

        let deleted: Vec<Path> = self
            .object_store
            .delete_stream(locations)
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;

        debug!(prefix = %prefix, count = deleted.len(), "Deleted objects under prefix");
        Ok(deleted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage(temp_dir: &TempDir) -> SnapshotStore {
        SnapshotStore::for_url_with_options(temp_dir.path().to_str().unwrap(), HashMap::new())
            .unwrap()
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(SnapshotStore::for_url_with_options("", HashMap::new()).is_err());
    }

    #[tokio::test]
    async fn test_list_top_level_dirs() {
        let temp_dir = TempDir::new().unwrap();
        for folder in ["2025070100", "2025070200", "notes"] {
            let dir = temp_dir.path().join(folder);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("file.txt"), b"x").unwrap();
        }
        // Top-level objects are not folders and must not appear
        std::fs::write(temp_dir.path().join("README"), b"x").unwrap();

        let storage = create_test_storage(&temp_dir);
        let mut dirs = storage.list_top_level_dirs().await.unwrap();
        dirs.sort();

        assert_eq!(dirs, vec!["2025070100", "2025070200", "notes"]);
    }

    #[tokio::test]
    async fn test_exists() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("2025070100/livemode");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("coreapi_SUCCESS"), b"").unwrap();

        let storage = create_test_storage(&temp_dir);
        assert!(
            storage
                .exists(&Path::from("2025070100/livemode/coreapi_SUCCESS"))
                .await
                .unwrap()
        );
        assert!(
            !storage
                .exists(&Path::from("2025070200/livemode/coreapi_SUCCESS"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_list_prefix_returns_sorted_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("2025070100/livemode/charges");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("part-1.parquet"), b"b").unwrap();
        std::fs::write(dir.join("part-0.parquet"), b"a").unwrap();

        let storage = create_test_storage(&temp_dir);
        let paths = storage
            .list_prefix("2025070100/livemode/charges")
            .await
            .unwrap();

        assert_eq!(
            paths.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            vec![
                "2025070100/livemode/charges/part-0.parquet",
                "2025070100/livemode/charges/part-1.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("2025070100/livemode/charges");
        let new = temp_dir.path().join("2025070200/livemode/charges");
        std::fs::create_dir_all(&old).unwrap();
        std::fs::create_dir_all(&new).unwrap();
        std::fs::write(old.join("part-0.parquet"), b"a").unwrap();
        std::fs::write(old.join("part-1.parquet"), b"b").unwrap();
        std::fs::write(new.join("part-0.parquet"), b"c").unwrap();

        let storage = create_test_storage(&temp_dir);
        let deleted = storage.delete_prefix("2025070100").await.unwrap();

        assert_eq!(deleted, 2);
        assert!(!old.join("part-0.parquet").exists());
        assert!(new.join("part-0.parquet").exists());
    }

    #[tokio::test]
    async fn test_get_and_put_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir);

        let path = Path::from("2025070100/livemode/coreapi_SUCCESS");
        storage.put(&path, b"ok".to_vec()).await.unwrap();
        let bytes = storage.get(&path).await.unwrap();
        assert_eq!(bytes.as_ref(), b"ok");
    }
}
