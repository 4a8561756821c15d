//! Document/query analysis.
//!
//! The whole document and the whole query are embedded once each and
//! compared by cosine similarity. Above the threshold the answer comes from
//! the document; at or below it the configured [`Fallback`] runs:
//!
//! | `[analysis].fallback` | Behavior |
//! |---|---|
//! | `generate` | prompt a [`Generator`] with a document excerpt and the query |
//! | `regex` | return the document sentence with the most query keywords |
//! | `lookup` | return the first canned answer whose keyword is in the query |
//! | `similarity` | report the score only |

use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{CannedAnswer, Config};
use crate::embedding::{cosine_similarity, create_embedder, Embedder};
use crate::generation::{create_generator, Generator};
use crate::models::{Analysis, Branch};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "when", "where", "which", "who", "why",
    "how", "does", "did", "this", "that", "with", "from", "about", "into", "there", "their", "has",
    "have", "can", "you", "your", "its", "not", "but", "any", "all",
];

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Please enter a question")]
    EmptyQuery,
    #[error("embedding failed: {0}")]
    Embedding(anyhow::Error),
    #[error("generation failed: {0}")]
    Generation(anyhow::Error),
}

/// What to do when the query is not similar enough to the document.
pub enum Fallback {
    Generate(Arc<dyn Generator>),
    Regex(SentenceExtractor),
    Lookup(Vec<CannedAnswer>),
    SimilarityOnly,
}

pub struct Analyzer {
    embedder: Arc<dyn Embedder>,
    fallback: Fallback,
    threshold: f32,
    excerpt_chars: usize,
}

impl Analyzer {
    pub fn new(embedder: Arc<dyn Embedder>, fallback: Fallback, threshold: f32) -> Self {
        Self {
            embedder,
            fallback,
            threshold,
            excerpt_chars: 500,
        }
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// Builds the embedder, the generator if any, and the fallback from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let fallback = match config.analysis.fallback.as_str() {
            "generate" => {
                let generator = create_generator(&config.generation)?.ok_or_else(|| {
                    anyhow::anyhow!("analysis.fallback = 'generate' requires a [generation] provider")
                })?;
                Fallback::Generate(generator)
            }
            "regex" => Fallback::Regex(SentenceExtractor::new()?),
            "lookup" => Fallback::Lookup(config.analysis.canned.clone()),
            "similarity" => Fallback::SimilarityOnly,
            other => anyhow::bail!("Unknown analysis fallback: {}", other),
        };

        tracing::info!(
            embedder = embedder.model_name(),
            fallback = config.analysis.fallback.as_str(),
            threshold = config.analysis.threshold,
            "analyzer ready"
        );

        Ok(Self::new(embedder, fallback, config.analysis.threshold)
            .with_excerpt_chars(config.analysis.excerpt_chars))
    }

    /// Scores `query` against `document_text` and produces the user-facing answer.
    pub async fn analyze(&self, document_text: &str, query: &str) -> Result<Analysis, AnalysisError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AnalysisError::EmptyQuery);
        }

        let doc_embedding = self
            .embedder
            .embed_one(document_text)
            .await
            .map_err(AnalysisError::Embedding)?;
        let query_embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(AnalysisError::Embedding)?;

        let similarity = cosine_similarity(&doc_embedding, &query_embedding);
        let branch = Branch::for_similarity(similarity, self.threshold);
        tracing::debug!(similarity, ?branch, "document scored");

        let body = match branch {
            Branch::Document => "Response based on document content.".to_string(),
            Branch::Fallback => self.run_fallback(document_text, query).await?,
        };

        Ok(Analysis {
            similarity,
            branch,
            response: format!("Similarity score: {:.2}\n{}", similarity, body),
        })
    }

    async fn run_fallback(&self, document_text: &str, query: &str) -> Result<String, AnalysisError> {
        match &self.fallback {
            Fallback::Generate(generator) => {
                let excerpt: String = document_text.chars().take(self.excerpt_chars).collect();
                let prompt = format!("Document: {}...\nQuery: {}", excerpt, query);
                let text = generator
                    .generate(&prompt)
                    .await
                    .map_err(AnalysisError::Generation)?;
                Ok(format!("Generated response: {}", text))
            }
            Fallback::Regex(extractor) => Ok(match extractor.best_sentence(document_text, query) {
                Some(sentence) => format!("Extracted answer: {}", sentence),
                None => "No matching passage found in the document.".to_string(),
            }),
            Fallback::Lookup(canned) => Ok(match lookup(canned, query) {
                Some(answer) => format!("Answer: {}", answer),
                None => "Sorry, I don't have an answer for that question.".to_string(),
            }),
            Fallback::SimilarityOnly => {
                Ok("The document does not appear to address this query.".to_string())
            }
        }
    }
}

/// First canned answer whose keyword occurs in the lowercased query.
fn lookup<'a>(canned: &'a [CannedAnswer], query: &str) -> Option<&'a str> {
    let query = query.to_lowercase();
    canned
        .iter()
        .find(|c| !c.keyword.is_empty() && query.contains(&c.keyword.to_lowercase()))
        .map(|c| c.answer.as_str())
}

/// Regex-based sentence picker for the `regex` fallback.
pub struct SentenceExtractor {
    sentence: Regex,
    word: Regex,
}

impl SentenceExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sentence: Regex::new(r"[^.!?\n]+[.!?]?")?,
            word: Regex::new(r"[\p{L}\p{N}]+")?,
        })
    }

    fn keywords(&self, text: &str) -> HashSet<String> {
        self.word
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
            .collect()
    }

    /// The sentence sharing the most distinct keywords with `query`; the
    /// earliest one wins ties. `None` if no sentence shares any keyword.
    pub fn best_sentence(&self, document_text: &str, query: &str) -> Option<String> {
        let wanted = self.keywords(query);
        if wanted.is_empty() {
            return None;
        }

        let mut best: Option<(usize, &str)> = None;
        for m in self.sentence.find_iter(document_text) {
            let sentence = m.as_str().trim();
            if sentence.is_empty() {
                continue;
            }
            let hits = self.keywords(sentence).intersection(&wanted).count();
            if hits > 0 && best.map_or(true, |(score, _)| hits > score) {
                best = Some((hits, sentence));
            }
        }
        best.map(|(_, s)| s.to_string())
    }
}
