//! Query-time retrieval over a [`VectorIndex`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// A question plus the number of chunks to retrieve for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The question text, embedded with the index's embedder.
    pub text: String,
    /// How many chunks to retrieve; never zero when built with [`Query::new`].
    pub k: usize,
}

impl Query {
    /// Create a query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `k == 0`.
    pub fn new(text: impl Into<String>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }
        Ok(Self { text: text.into(), k })
    }
}

/// Retrieved chunks, most similar first.
///
/// Scores are kept for diagnostics; most callers only need
/// [`texts`](RetrievalResult::texts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Scored chunks in descending score order.
    pub results: Vec<SearchResult>,
}

impl RetrievalResult {
    /// The retrieved chunks, best first.
    pub fn chunks(&self) -> Vec<&Chunk> {
        self.results.iter().map(|r| &r.chunk).collect()
    }

    /// The retrieved chunk texts, best first.
    pub fn texts(&self) -> Vec<String> {
        self.results.iter().map(|r| r.chunk.text.clone()).collect()
    }

    /// The similarity scores, best first.
    pub fn scores(&self) -> Vec<f32> {
        self.results.iter().map(|r| r.score).collect()
    }

    /// Number of retrieved chunks.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Embeds queries with the index's own embedder and searches the index.
pub struct Retriever {
    index: Arc<VectorIndex>,
    similarity_threshold: Option<f32>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index, similarity_threshold: None }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Return the index this retriever reads from.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed the query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.index.embedder().embed(text).await
    }

    /// Search with an already-embedded query.
    pub async fn search(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        let mut results = self.index.query(vector, k).await?;
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }
        for (rank, r) in results.iter().enumerate() {
            debug!(rank, score = r.score, chunk.id = %r.chunk.id, source = %r.chunk.source, "retrieved chunk");
        }
        Ok(RetrievalResult { results })
    }

    /// Embed `query.text` and return up to `query.k` chunks, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the query cannot be embedded, or the
    /// store's error if the search fails.
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        let vector = self.embed_query(&query.text).await?;
        self.search(&vector, query.k).await
    }
}
