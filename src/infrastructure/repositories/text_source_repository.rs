use super::object_store_repository::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TextSourceError {
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error("text chunk {key} is not valid UTF-8")]
    Encoding { key: String },
}

/// Supplies the ordered text chunks uploaded for a session
#[async_trait]
pub trait TextSource: Send + Sync {
    /// `(index, text)` pairs sorted by index; empty when the session has no text
    async fn fetch(&self, session_id: &str) -> Result<Vec<(usize, String)>, TextSourceError>;
}

/// Reads `{session}/text/chunk-{n}.txt` objects
pub struct ObjectStoreTextSource {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreTextSource {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn chunk_key(session_id: &str, index: usize) -> String {
        format!("{}/text/chunk-{}.txt", session_id, index)
    }
}

/// Index of a `chunk-{n}.txt` object, or None for anything else under the prefix
fn chunk_index(key: &str, prefix: &str) -> Option<usize> {
    key.strip_prefix(prefix)?
        .strip_prefix("chunk-")?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

#[async_trait]
impl TextSource for ObjectStoreTextSource {
    async fn fetch(&self, session_id: &str) -> Result<Vec<(usize, String)>, TextSourceError> {
        let prefix = format!("{}/text/", session_id);
        let mut indexed: Vec<(usize, String)> = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| chunk_index(&key, &prefix).map(|index| (index, key)))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        let mut chunks = Vec::with_capacity(indexed.len());
        for (index, key) in indexed {
            let bytes = self.store.get(&key).await?;
            let text = String::from_utf8(bytes).map_err(|_| TextSourceError::Encoding { key: key.clone() })?;
            chunks.push((index, text));
        }

        tracing::debug!(session_id, chunk_count = chunks.len(), "Session text fetched");
        Ok(chunks)
    }
}
