use crate::{error::YummyError, persistence::ConversationScope};
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Key-value store holding one JSON record per conversation.
pub trait AnnotationStore: Send + Sync {
    fn get(
        &self,
        scope: &ConversationScope,
    ) -> impl Future<Output = Result<Option<Value>, YummyError>> + Send;

    fn set(
        &self,
        scope: &ConversationScope,
        record: Value,
    ) -> impl Future<Output = Result<(), YummyError>> + Send;

    /// Removing a record that does not exist is not an error.
    fn delete(
        &self,
        scope: &ConversationScope,
    ) -> impl Future<Output = Result<(), YummyError>> + Send;
}

impl<S: AnnotationStore> AnnotationStore for Arc<S> {
    fn get(
        &self,
        scope: &ConversationScope,
    ) -> impl Future<Output = Result<Option<Value>, YummyError>> + Send {
        self.as_ref().get(scope)
    }

    fn set(
        &self,
        scope: &ConversationScope,
        record: Value,
    ) -> impl Future<Output = Result<(), YummyError>> + Send {
        self.as_ref().set(scope, record)
    }

    fn delete(
        &self,
        scope: &ConversationScope,
    ) -> impl Future<Output = Result<(), YummyError>> + Send {
        self.as_ref().delete(scope)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains(&self, scope: &ConversationScope) -> bool {
        self.records.read().contains_key(scope.key())
    }
}

impl AnnotationStore for MemoryStore {
    async fn get(&self, scope: &ConversationScope) -> Result<Option<Value>, YummyError> {
        Ok(self.records.read().get(scope.key()).cloned())
    }

    async fn set(&self, scope: &ConversationScope, record: Value) -> Result<(), YummyError> {
        self.records.write().insert(scope.key().to_string(), record);
        Ok(())
    }

    async fn delete(&self, scope: &ConversationScope) -> Result<(), YummyError> {
        self.records.write().remove(scope.key());
        Ok(())
    }
}

/// One JSON file per conversation inside `root`, named by the SHA-256 of the scope key.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FileStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, scope: &ConversationScope) -> PathBuf {
        let digest = Sha256::digest(scope.key().as_bytes());
        self.root.join(format!("{}.json", hex::encode(digest)))
    }
}

impl AnnotationStore for FileStore {
    async fn get(&self, scope: &ConversationScope) -> Result<Option<Value>, YummyError> {
        let path = self.path_for(scope);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(YummyError::Store(format!(
                "could not read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, scope: &ConversationScope, record: Value) -> Result<(), YummyError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(scope);
        let staging = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &path).await.map_err(|e| {
            YummyError::Store(format!("could not replace {}: {e}", path.display()))
        })?;
        tracing::debug!("[FileStore] wrote scope '{}' to {}", scope, path.display());
        Ok(())
    }

    async fn delete(&self, scope: &ConversationScope) -> Result<(), YummyError> {
        let path = self.path_for(scope);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
