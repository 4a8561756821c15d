//! Core data models.
//!
//! Users and uploaded documents as stored in SQLite, plus the outcome of a
//! document/query analysis as handed back to the controller layer.

use serde::Serialize;

/// An account row. `password_hash` is a PHC-format Argon2id string.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
}

/// Metadata for one uploaded file. The bytes live at `filepath`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Document {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    #[serde(skip)]
    pub filepath: String,
    pub content_hash: String,
    pub created_at: i64,
}

/// Which side of the similarity threshold an analysis landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Similarity above the threshold: the answer is taken from the document.
    Document,
    /// Similarity at or below the threshold: the configured fallback ran.
    Fallback,
}

impl Branch {
    pub fn for_similarity(similarity: f32, threshold: f32) -> Self {
        if similarity > threshold {
            Branch::Document
        } else {
            Branch::Fallback
        }
    }
}

/// Result of analyzing a query against a document's text.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub similarity: f32,
    pub branch: Branch,
    pub response: String,
}
