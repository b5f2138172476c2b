//! Local filesystem storage implementation.
//!
//! Keeps every tracked site in one JSON document. Each `put_sites` call
//! loads the whole document, replaces the records for the given guids and
//! writes it back. There is no locking: a single writing process is assumed,
//! and two concurrent writers can lose each other's updates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Site;
use crate::storage::{SiteRecord, SiteStore};

/// Whole-document contents, keyed by site guid.
type Document = BTreeMap<String, SiteRecord>;

/// Single-file JSON storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// Create a store backed by the given file without touching the disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store and make sure its document exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        if store.read_bytes().await?.is_none() {
            store.write_document(&Document::new()).await?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the document doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_document(&self) -> Result<Document> {
        match self.read_bytes().await? {
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Document::new()),
        }
    }

    async fn write_document(&self, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        self.write_bytes(&bytes).await
    }
}

#[async_trait]
impl SiteStore for LocalStore {
    async fn get_sites(&self, guids: &[String]) -> Result<Vec<Site>> {
        let mut document = self.read_document().await?;

        if guids.is_empty() {
            return Ok(document.into_values().map(|record| record.site).collect());
        }

        Ok(guids
            .iter()
            .filter_map(|guid| document.remove(guid))
            .map(|record| record.site)
            .collect())
    }

    async fn put_sites(&self, sites: &[Site]) -> Result<Vec<Site>> {
        let mut document = self.read_document().await?;
        for site in sites {
            document.insert(site.guid.clone(), SiteRecord::now(site.clone()));
        }
        self.write_document(&document).await?;

        log::debug!(
            "Wrote {} site(s) to {} ({} total)",
            sites.len(),
            self.path.display(),
            document.len()
        );
        Ok(sites.to_vec())
    }
}
