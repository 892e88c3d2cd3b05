use crate::domain::model::{Document, DocumentBatch, UnreadableDocument};
use crate::domain::ports::DocumentSource;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// 掃描目錄中的單據影像
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSource {
    directory: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryDocumentSource {
    pub fn new(directory: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            directory: directory.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocumentSource {
    async fn load(&self) -> Result<DocumentBatch> {
        let mut batch = DocumentBatch::default();

        if !self.directory.is_dir() {
            tracing::warn!(
                stage = "extraction",
                "📁 Documents directory not found at '{}'",
                self.directory.display()
            );
            return Ok(batch);
        }

        tracing::info!(
            stage = "extraction",
            "📁 Scanning for documents in '{}'",
            self.directory.display()
        );

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && self.is_supported(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            match tokio::fs::read(&path).await {
                Ok(bytes) if bytes.is_empty() => batch.unreadable.push(UnreadableDocument {
                    name,
                    reason: "file is empty".to_string(),
                }),
                Ok(bytes) => batch.documents.push(Document { name, bytes }),
                Err(e) => batch.unreadable.push(UnreadableDocument {
                    name,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(batch)
    }
}

/// 呼叫端自行準備的單據
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocuments {
    documents: Vec<Document>,
}

impl InMemoryDocuments {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocuments {
    async fn load(&self) -> Result<DocumentBatch> {
        Ok(DocumentBatch {
            documents: self.documents.clone(),
            unreadable: Vec::new(),
        })
    }
}
