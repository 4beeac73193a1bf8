//! Object store access.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::AdapterError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download one object's bytes
    async fn download(
        &self,
        namespace: &str,
        bucket: &str,
        object_name: &str,
    ) -> Result<Vec<u8>, AdapterError>;
}

/// Object store laid out on the local filesystem as `root/namespace/bucket/object`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object path, refusing names that escape the root
    pub fn object_path(
        &self,
        namespace: &str,
        bucket: &str,
        object_name: &str,
    ) -> Result<PathBuf, AdapterError> {
        let mut path = self.root.clone();
        for part in [namespace, bucket, object_name] {
            let relative = Path::new(part);
            let plain = relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
            if part.is_empty() || !plain {
                return Err(AdapterError::Format(format!(
                    "'{}' is not a valid object path segment",
                    part
                )));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download(
        &self,
        namespace: &str,
        bucket: &str,
        object_name: &str,
    ) -> Result<Vec<u8>, AdapterError> {
        let path = self.object_path(namespace, bucket, object_name)?;
        tracing::info!("Downloading {}", path.display());
        Ok(tokio::fs::read(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download() {
        let dir = tempfile::tempdir().unwrap();
        let object_dir = dir.path().join("ns").join("bucket").join("events");
        std::fs::create_dir_all(&object_dir).unwrap();
        std::fs::write(object_dir.join("a.json"), b"{}").unwrap();

        let store = LocalObjectStore::new(dir.path());
        let bytes = store.download("ns", "bucket", "events/a.json").await.unwrap();
        assert_eq!(bytes, b"{}".to_vec());

        let missing = store.download("ns", "bucket", "events/b.json").await;
        assert!(matches!(missing, Err(AdapterError::Io(_))));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let store = LocalObjectStore::new("/data");
        assert!(store.object_path("ns", "bucket", "../../etc/passwd").is_err());
        assert!(store.object_path("ns", "", "a.json").is_err());
        assert!(store.object_path("ns", "bucket", "/abs").is_err());
    }
}
