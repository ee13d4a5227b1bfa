use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{Document, DocumentStore, assign_ids};

/// Keeps every collection in process memory.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<T>(&self, f: impl FnOnce(&mut HashMap<String, Vec<Document>>) -> T) -> Result<T> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn delete_all(&self, collection: &str) -> Result<()> {
        self.with_collections(|c| {
            c.remove(collection);
        })
    }

    async fn insert_many(&self, collection: &str, mut docs: Vec<Document>) -> Result<()> {
        self.with_collections(|c| {
            let existing = c.entry(collection.to_string()).or_default();
            assign_ids(existing.len(), &mut docs);
            existing.extend(docs);
        })
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.with_collections(|c| c.get(collection).cloned().unwrap_or_default())
    }

    async fn replace_all(&self, collection: &str, mut docs: Vec<Document>) -> Result<()> {
        assign_ids(0, &mut docs);
        self.with_collections(|c| {
            c.insert(collection.to_string(), docs);
        })
    }
}
