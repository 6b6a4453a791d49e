/// Uploaded file storage (floor plans)
///
/// `store(bytes, suggested_name) -> reference`. The reference is what gets
/// persisted on the entity; callers never build paths themselves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("file is empty")]
    Empty,

    #[error("file exceeds the 10 MiB upload limit")]
    TooLarge,

    #[error("failed to write file: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, bytes: Bytes, suggested_name: &str) -> Result<String, FileStoreError>;
}

/// Keeps the extension and a readable stem; drops anything path-like
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');

    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

fn check_size(bytes: &Bytes) -> Result<(), FileStoreError> {
    if bytes.is_empty() {
        return Err(FileStoreError::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(FileStoreError::TooLarge);
    }
    Ok(())
}

/// Writes under a root directory as `{uuid}_{name}`
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, bytes: Bytes, suggested_name: &str) -> Result<String, FileStoreError> {
        check_size(&bytes)?;

        let file_name = format!("{}_{}", Uuid::new_v4().simple(), sanitize_file_name(suggested_name));
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&file_name), &bytes).await?;

        tracing::info!(file = %file_name, size = bytes.len(), "Stored upload");
        Ok(file_name)
    }
}

/// Keeps uploads in memory (tests and `STORAGE_BACKEND=memory`)
#[derive(Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reference: &str) -> Option<Bytes> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .cloned()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn store(&self, bytes: Bytes, suggested_name: &str) -> Result<String, FileStoreError> {
        check_size(&bytes)?;

        let reference = format!("{}_{}", Uuid::new_v4().simple(), sanitize_file_name(suggested_name));
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(reference.clone(), bytes);
        Ok(reference)
    }
}
