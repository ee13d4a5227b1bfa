//! Document store abstraction for the bronze, silver and gold layers.
//!
//! Every layer is persisted as a named collection of schemaless JSON
//! documents. [`DocumentStore`] is the async trait each backend implements:
//! - [`MemoryStore`] keeps collections in process memory (tests, one-shot runs).
//! - [`FsStore`] writes one JSON-lines file per collection.
//! - [`S3Store`] writes one JSON array object per collection to S3.

mod fs;
mod memory;
mod s3;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{PipelineConfig, StoreBackend};

/// A schemaless stored record.
pub type Document = serde_json::Map<String, Value>;

/// Store-internal identifier field, assigned on insert and hidden from consumers.
pub const ID_FIELD: &str = "_id";

pub const RAW_TRIPS: &str = "raw_trips";
pub const SILVER_TRIPS: &str = "silver_trips";
pub const GOLD_HOURLY_STATS: &str = "gold_hourly_stats";
pub const GOLD_AREA_STATS: &str = "gold_area_stats";
pub const GOLD_PAYMENT_STATS: &str = "gold_payment_stats";

/// Minimal collection contract the pipeline stages rely on.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Removes every document from `collection`. Missing collections are a no-op.
    async fn delete_all(&self, collection: &str) -> Result<()>;

    /// Appends `docs` to `collection`, creating it if needed.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<()>;

    /// Returns every document in `collection`, or an empty list if it does not exist.
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>>;

    /// Replaces the contents of `collection` with `docs`.
    ///
    /// The default is clear-then-insert, which lets a concurrent reader see an
    /// empty collection in between. Backends that can swap a collection in a
    /// single write override this.
    async fn replace_all(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        self.delete_all(collection).await?;
        if !docs.is_empty() {
            self.insert_many(collection, docs).await?;
        }
        Ok(())
    }
}

/// Opens the backend selected in `config`.
pub async fn open_store(config: &PipelineConfig) -> Result<Box<dyn DocumentStore>> {
    let store: Box<dyn DocumentStore> = match config.store {
        StoreBackend::Memory => Box::new(MemoryStore::new()),
        StoreBackend::Fs => Box::new(FsStore::new(config.store_dir.join(&config.database))),
        StoreBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .context("S3 store selected but no bucket configured")?;
            let sdk_config = aws_config::load_from_env().await;
            Box::new(S3Store::new(
                aws_sdk_s3::Client::new(&sdk_config),
                bucket,
                config.database.clone(),
            ))
        }
    };
    Ok(store)
}

/// Serializes typed rows into documents.
pub fn to_documents<T: Serialize>(rows: &[T]) -> Result<Vec<Document>> {
    rows.iter()
        .map(|row| match serde_json::to_value(row)? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("expected a JSON object, got {other}"),
        })
        .collect()
}

/// Deserializes documents into typed rows, dropping the store-internal id.
pub fn from_documents<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|mut doc| {
            doc.remove(ID_FIELD);
            serde_json::from_value(Value::Object(doc)).context("document does not match row shape")
        })
        .collect()
}

/// Gives each document without an `_id` a sequential one, starting at `start`.
pub(crate) fn assign_ids(start: usize, docs: &mut [Document]) {
    for (offset, doc) in docs.iter_mut().enumerate() {
        doc.entry(ID_FIELD)
            .or_insert_with(|| Value::from((start + offset) as u64));
    }
}
