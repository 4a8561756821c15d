//! Upload validation, storage, and the `documents` table.
//!
//! Accepted files are written under `[uploads].dir` as
//! `<uuid>-<sanitized name>` and recorded with their owner and SHA-256.

use anyhow::Context;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::config::UploadsConfig;
use crate::models::Document;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file selected")]
    NoFileSelected,
    #[error("File type not allowed. Allowed types: {0}")]
    NotAllowed(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Reduces an uploaded filename to a safe basename.
///
/// Directory components are dropped and only ASCII letters, digits, `.`,
/// `_` and `-` survive; whitespace becomes `_`. Leading dots are removed so
/// the result can never be hidden or relative.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Checks the filename against the allow-list before anything is written.
pub fn validate(config: &UploadsConfig, filename: &str) -> Result<(), UploadError> {
    if filename.trim().is_empty() {
        return Err(UploadError::NoFileSelected);
    }
    if !config.is_allowed(filename) {
        return Err(UploadError::NotAllowed(
            config.allowed_extensions.join(", "),
        ));
    }
    Ok(())
}

/// Validates, persists, and records an upload for `user_id`.
pub async fn store_upload(
    pool: &SqlitePool,
    config: &UploadsConfig,
    user_id: i64,
    filename: &str,
    bytes: &[u8],
) -> Result<Document, UploadError> {
    validate(config, filename)?;

    let safe_name = match secure_filename(filename) {
        name if name.is_empty() => "upload".to_string(),
        name => name,
    };
    let path: PathBuf = config.dir.join(format!("{}-{}", Uuid::new_v4(), safe_name));

    tokio::fs::create_dir_all(&config.dir)
        .await
        .with_context(|| format!("Failed to create upload dir: {}", config.dir.display()))?;
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write upload: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let content_hash = format!("{:x}", hasher.finalize());
    let created_at = chrono::Utc::now().timestamp();
    let filepath = path.to_string_lossy().to_string();

    let id = sqlx::query(
        "INSERT INTO documents (user_id, filename, filepath, content_hash, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(filename)
    .bind(&filepath)
    .bind(&content_hash)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to record document")?
    .last_insert_rowid();

    tracing::info!(user_id, document_id = id, filename, "upload stored");

    Ok(Document {
        id,
        user_id,
        filename: filename.to_string(),
        filepath,
        content_hash,
        created_at,
    })
}

/// Documents owned by `user_id`, newest first.
pub async fn list_documents(pool: &SqlitePool, user_id: i64) -> anyhow::Result<Vec<Document>> {
    let docs = sqlx::query_as::<_, Document>(
        "SELECT id, user_id, filename, filepath, content_hash, created_at
         FROM documents WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(docs)
}

/// Looks up a document, returning `None` unless `user_id` owns it.
pub async fn get_document(
    pool: &SqlitePool,
    user_id: i64,
    document_id: i64,
) -> anyhow::Result<Option<Document>> {
    let doc = sqlx::query_as::<_, Document>(
        "SELECT id, user_id, filename, filepath, content_hash, created_at
         FROM documents WHERE id = ? AND user_id = ?",
    )
    .bind(document_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(doc)
}
