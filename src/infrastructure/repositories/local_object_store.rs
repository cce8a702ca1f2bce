use super::object_store_repository::{join_url, validate_key, ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Object store backed by a local directory, for development and tests
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: String) -> Self {
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(key: &str, err: std::io::Error) -> ObjectStoreError {
    match err.kind() {
        ErrorKind::NotFound => ObjectStoreError::NotFound(key.to_string()),
        ErrorKind::PermissionDenied => ObjectStoreError::Permanent(format!("{}: {}", key, err)),
        _ => ObjectStoreError::Transient(format!("{}: {}", key, err)),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_error(key, e))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| io_error(key, e))?;
        tracing::debug!(path = %path.display(), "Object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| io_error(key, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(prefix, e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(prefix, e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| io_error(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        Ok(keys)
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost/files".to_string());

        store.put("s1/chunk-0.mp3", vec![1, 2], "audio/mpeg").await.unwrap();
        store.put("s1/text/chunk-0.txt", b"hi".to_vec(), "text/plain").await.unwrap();
        store.put("s2/chunk-0.mp3", vec![3], "audio/mpeg").await.unwrap();

        assert_eq!(store.get("s1/chunk-0.mp3").await.unwrap(), vec![1, 2]);

        let mut keys = store.list("s1/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["s1/chunk-0.mp3", "s1/text/chunk-0.txt"]);
        assert_eq!(store.public_url("s1/chunk-0.mp3"), "http://localhost/files/s1/chunk-0.mp3");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost".to_string());
        assert!(matches!(store.get("nope/x.mp3").await, Err(ObjectStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost".to_string());
        let result = store.put("../outside.mp3", vec![1], "audio/mpeg").await;
        assert!(matches!(result, Err(ObjectStoreError::Permanent(_))));
    }
}
