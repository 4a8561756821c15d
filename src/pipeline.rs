//! Upload → extract → analyze.
//!
//! Shared by the dashboard form, the JSON `process_query` route, and the
//! `analyze` CLI command.

use sqlx::SqlitePool;
use std::path::Path;
use thiserror::Error;

use crate::analysis::{AnalysisError, Analyzer};
use crate::config::UploadsConfig;
use crate::extract::{self, ExtractError};
use crate::models::{Analysis, Document};
use crate::upload::{self, UploadError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("failed to read stored document: {0}")]
    Read(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Input the user can fix (missing file, wrong type, empty question),
    /// as opposed to a failure while processing an accepted file.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::Upload(UploadError::NoFileSelected | UploadError::NotAllowed(_))
                | PipelineError::Analysis(AnalysisError::EmptyQuery)
        )
    }
}

/// Extracts text on the blocking pool; PDF parsing is CPU bound.
pub async fn extract_file(filename: &str, bytes: Vec<u8>) -> Result<String, PipelineError> {
    let filename = filename.to_string();
    let text =
        tokio::task::spawn_blocking(move || extract::extract_text(&filename, bytes)).await??;
    Ok(text)
}

/// Extracts an upload's text, stores it for `user_id`, then answers `query`.
pub async fn answer_upload(
    pool: &SqlitePool,
    uploads: &UploadsConfig,
    analyzer: &Analyzer,
    user_id: i64,
    filename: &str,
    bytes: Vec<u8>,
    query: &str,
) -> Result<(Document, Analysis), PipelineError> {
    upload::validate(uploads, filename)?;
    if query.trim().is_empty() {
        return Err(AnalysisError::EmptyQuery.into());
    }

    // Only files that extract cleanly become documents.
    let text = extract_file(filename, bytes.clone()).await?;
    let document = upload::store_upload(pool, uploads, user_id, filename, &bytes).await?;
    let analysis = analyzer.analyze(&text, query).await?;
    Ok((document, analysis))
}

/// Answers `query` against a previously stored document.
pub async fn answer_stored(
    analyzer: &Analyzer,
    document: &Document,
    query: &str,
) -> Result<Analysis, PipelineError> {
    if query.trim().is_empty() {
        return Err(AnalysisError::EmptyQuery.into());
    }
    let bytes = tokio::fs::read(&document.filepath).await?;
    let text = extract_file(&document.filename, bytes).await?;
    Ok(analyzer.analyze(&text, query).await?)
}

/// Answers `query` against a file on disk without storing anything.
pub async fn answer_path(
    analyzer: &Analyzer,
    path: &Path,
    query: &str,
) -> Result<Analysis, PipelineError> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let text = extract_file(&filename, bytes).await?;
    Ok(analyzer.analyze(&text, query).await?)
}
