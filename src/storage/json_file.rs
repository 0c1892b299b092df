//! File-backed implementation of DocumentStore
//!
//! Every collection lives in `<data_folder>/<collection>.json` as a JSON array
//! of documents. All collections are loaded when the store is opened; each
//! write rewrites the affected collection file through a temporary file and a
//! rename, so a crash never leaves a half-written collection behind.

use crate::core::store::{Document, DocumentStore, Filter};
use crate::storage::{InMemoryStore, StoreError};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Document store persisted as one JSON file per collection
pub struct JsonFileStore {
    dir: PathBuf,
    inner: InMemoryStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a data folder, loading every collection
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let inner = InMemoryStore::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(collection) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let documents = read_collection_file(&path).await?;
            tracing::debug!(collection, count = documents.len(), "loaded collection");
            inner.load_collection(collection, documents)?;
        }

        Ok(Self {
            dir,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    /// Data folder backing this store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    async fn persist(&self, collection: &str) -> Result<()> {
        let documents = self.inner.snapshot(collection)?;
        let path = self.collection_path(collection);
        let tmp = self.dir.join(format!(".{collection}.json.tmp"));

        let content = serde_json::to_vec_pretty(&documents)?;
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;

        Ok(())
    }

    /// Write a collection file, putting `previous` back in memory when the
    /// write fails so memory never holds a change the file does not
    async fn persist_or_restore(&self, collection: &str, previous: Vec<Document>) -> Result<()> {
        if let Err(err) = self.persist(collection).await {
            tracing::error!(collection, error = %err, "write failed, restoring collection");
            self.inner.load_collection(collection, previous)?;
            return Err(err);
        }
        Ok(())
    }
}

async fn read_collection_file(path: &Path) -> Result<Vec<Document>> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let malformed = |message: String| StoreError::Malformed {
        path: path.to_path_buf(),
        message,
    };

    let value: Value = serde_json::from_slice(&content).map_err(|e| malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array".to_string()).into());
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(document) => Ok(document),
            other => Err(anyhow::Error::from(malformed(format!(
                "expected an object, found {other}"
            )))),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.inner.find(collection, filter).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        self.inner.find_one(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.inner.count(collection, filter).await
    }

    async fn save(&self, collection: &str, document: Document) -> Result<Document> {
        let _guard = self.write_lock.lock().await;
        let previous = self.inner.snapshot(collection)?;
        let saved = self.inner.save(collection, document).await?;
        self.persist_or_restore(collection, previous).await?;
        Ok(saved)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let previous = self.inner.snapshot(collection)?;
        let existed = self.inner.delete(collection, id).await?;
        if existed {
            self.persist_or_restore(collection, previous).await?;
        }
        Ok(existed)
    }
}
