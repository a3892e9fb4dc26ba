//! Document uploads: blob storage plus the document record.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::blob::{BlobHandle, BlobStore};
use crate::error::{ServiceError, ValidationError};
use crate::records::{
    Document, DocumentCategory, DocumentKind, NewDocument, RelatedToType,
};
use crate::service::{Outcome, RecordService};

/// Folder used for documents not attached to another record.
const GENERAL_FOLDER: &str = "general";

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    /// MIME type reported by the client; guessed from the name when absent.
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Record fields supplied alongside an upload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DocumentDetails {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<DocumentCategory>,
    pub tags: Vec<String>,
    pub related_to_type: Option<RelatedToType>,
    pub related_to_id: Option<String>,
}

/// Keep ASCII letters, digits, `.`, `_` and `-`; anything else becomes `-`.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn guess_file_type(file_name: &str, content_type: Option<String>) -> String {
    content_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            mime_guess::from_path(file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
}

/// Document facade that also manages file contents.
pub struct DocumentUploads {
    records: RecordService<DocumentKind>,
    blobs: Arc<dyn BlobStore>,
    url_ttl: Duration,
}

impl DocumentUploads {
    pub fn new(
        records: RecordService<DocumentKind>,
        blobs: Arc<dyn BlobStore>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            records,
            blobs,
            url_ttl,
        }
    }

    /// The plain record facade (list, get, update, stats).
    pub fn records(&self) -> &RecordService<DocumentKind> {
        &self.records
    }

    /// Store the file, then create its record. The blob is removed again if
    /// the record cannot be created.
    pub async fn upload(&self, file: Upload, details: DocumentDetails) -> Outcome<Document> {
        let file_name = file.file_name.trim().to_string();
        if file_name.is_empty() {
            return Outcome::Err {
                error: ValidationError::MissingField { field: "file_name" }.into(),
                via_fallback: false,
            };
        }

        let folder = details
            .related_to_type
            .map_or(GENERAL_FOLDER, RelatedToType::as_str);
        let path_hint = format!(
            "{folder}/{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(&file_name)
        );
        let file_type = guess_file_type(&file_name, file.content_type);
        let file_size = i64::try_from(file.bytes.len()).unwrap_or(i64::MAX);

        let handle = match self.blobs.store(file.bytes, &path_hint).await {
            Ok(handle) => handle,
            Err(e) => {
                return Outcome::Err {
                    error: e.into(),
                    via_fallback: false,
                };
            }
        };

        let draft = NewDocument {
            name: details.name.unwrap_or_default(),
            description: details.description,
            file_name,
            file_path: handle.as_str().to_string(),
            file_type: Some(file_type),
            file_size,
            category: details.category,
            tags: details.tags,
            related_to_type: details.related_to_type,
            related_to_id: details.related_to_id,
        };
        let outcome = self.records.create(draft).await;
        if outcome.is_err()
            && let Err(e) = self.blobs.remove(&handle).await
        {
            tracing::warn!("Failed to remove orphaned blob {}: {}", handle.as_str(), e);
        }
        outcome
    }

    /// Signed download URL for the document's file. `ttl` defaults to the
    /// configured lifetime.
    pub async fn download_url(&self, id: Uuid, ttl: Option<Duration>) -> Outcome<Url> {
        let (document, via_fallback) = match self.records.get(id).await.into_parts() {
            (Ok(document), via_fallback) => (document, via_fallback),
            (Err(error), via_fallback) => {
                return Outcome::Err {
                    error,
                    via_fallback,
                };
            }
        };
        let handle = BlobHandle::new(document.file_path);
        let result = self
            .blobs
            .signed_url(&handle, ttl.unwrap_or(self.url_ttl))
            .await
            .map_err(ServiceError::from);
        Outcome::from_result(result, via_fallback)
    }

    /// Delete the record, then its file. A failed file removal is logged only.
    pub async fn delete(&self, id: Uuid) -> Outcome<()> {
        let handle = self
            .records
            .get(id)
            .await
            .value()
            .map(|document| BlobHandle::new(document.file_path.clone()));
        let outcome = self.records.delete(id).await;
        if !outcome.is_err()
            && let Some(handle) = handle
            && let Err(e) = self.blobs.remove(&handle).await
        {
            tracing::warn!("Failed to remove blob {}: {}", handle.as_str(), e);
        }
        outcome
    }
}
