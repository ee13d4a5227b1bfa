use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Document, DocumentStore, assign_ids};

/// Stores each collection as `<root>/<collection>.jsonl`, one document per line.
///
/// `replace_all` writes a shadow file and renames it over the collection, so
/// readers see either the old or the new contents, never an empty file.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.jsonl"))
    }

    fn read_collection(path: &Path) -> Result<Vec<Document>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut docs = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: Document = serde_json::from_str(&line).with_context(|| {
                format!("corrupt document at {}:{}", path.display(), line_no + 1)
            })?;
            docs.push(doc);
        }
        Ok(docs)
    }

    fn write_lines(file: File, docs: &[Document]) -> Result<()> {
        let mut writer = BufWriter::new(file);
        for doc in docs {
            serde_json::to_writer(&mut writer, doc)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn delete_all(&self, collection: &str) -> Result<()> {
        let path = self.collection_path(collection);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "Collection file removed");
        }
        Ok(())
    }

    async fn insert_many(&self, collection: &str, mut docs: Vec<Document>) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.collection_path(collection);
        let existing = Self::read_collection(&path)?.len();
        assign_ids(existing, &mut docs);

        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Self::write_lines(file, &docs)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        Self::read_collection(&self.collection_path(collection))
    }

    async fn replace_all(&self, collection: &str, mut docs: Vec<Document>) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        assign_ids(0, &mut docs);

        let path = self.collection_path(collection);
        let shadow = self.root.join(format!("{collection}.jsonl.tmp"));
        Self::write_lines(File::create(&shadow)?, &docs)?;
        fs::rename(&shadow, &path)
            .with_context(|| format!("failed to swap {} into place", shadow.display()))?;

        debug!(path = %path.display(), documents = docs.len(), "Collection replaced");
        Ok(())
    }
}
