use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use super::{Document, DocumentStore, assign_ids};

/// Stores each collection as a single JSON array object at `<database>/<collection>.json`.
///
/// A `PutObject` replaces the whole object, so `replace_all` is one write.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    database: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, database: String) -> Self {
        Self {
            client,
            bucket,
            database,
        }
    }

    fn key(&self, collection: &str) -> String {
        format!("{}/{}.json", self.database, collection)
    }

    async fn put(&self, collection: &str, docs: &[Document]) -> Result<()> {
        let key = self.key(collection);
        let body = serde_json::to_vec(docs)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .with_context(|| format!("S3 PutObject failed for '{key}'"))?;

        debug!(bucket = %self.bucket, key = %key, documents = docs.len(), "Collection written to S3");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for S3Store {
    async fn delete_all(&self, collection: &str) -> Result<()> {
        let key = self.key(collection);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("S3 DeleteObject failed for '{key}'"))?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, mut docs: Vec<Document>) -> Result<()> {
        let mut existing = self.find_all(collection).await?;
        assign_ids(existing.len(), &mut docs);
        existing.extend(docs);
        self.put(collection, &existing).await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let key = self.key(collection);
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_key()) =>
            {
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("S3 GetObject failed for '{key}'"));
            }
        };

        let bytes = resp.body.collect().await?.into_bytes();
        serde_json::from_slice(&bytes).with_context(|| format!("'{key}' is not a JSON document array"))
    }

    async fn replace_all(&self, collection: &str, mut docs: Vec<Document>) -> Result<()> {
        assign_ids(0, &mut docs);
        self.put(collection, &docs).await
    }
}
