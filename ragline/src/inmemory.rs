//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a process-local vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. Data is lost
//! when the store is dropped. It is suitable for single-run pipelines,
//! development, and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{EmbeddedChunk, SearchResult};
use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    ids: HashSet<String>,
    // Insertion order doubles as the tie-breaker for equal scores.
    entries: Vec<EmbeddedChunk>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as collection name → insertion-ordered entries.
/// Writers are serialised by the lock, so a single store can be shared
/// across tasks; each write is applied atomically.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_collection(collection: &str) -> RagError {
    RagError::vector_store(BACKEND, format!("collection '{collection}' does not exist"))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            if existing.dimensions != dimensions {
                return Err(RagError::vector_store(
                    BACKEND,
                    format!(
                        "collection '{name}' exists with {} dimensions, requested {dimensions}",
                        existing.dimensions
                    ),
                ));
            }
            return Ok(());
        }
        collections.insert(name.to_string(), Collection { dimensions, ..Default::default() });
        debug!(collection = name, dimensions, "created in-memory collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing_collection(collection))?;

        // Validate the whole batch before touching the collection.
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != store.dimensions) {
            return Err(RagError::vector_store(
                BACKEND,
                format!(
                    "chunk '{}' has {} dimensions, collection '{collection}' expects {}",
                    bad.chunk.id,
                    bad.vector.len(),
                    store.dimensions
                ),
            ));
        }

        let mut inserted = 0;
        for chunk in chunks {
            if store.ids.insert(chunk.chunk.id.clone()) {
                store.entries.push(chunk.clone());
                inserted += 1;
            }
        }

        debug!(collection, inserted, skipped = chunks.len() - inserted, "upserted chunks");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing_collection(collection))?;

        if !store.entries.is_empty() && embedding.len() != store.dimensions {
            return Err(RagError::vector_store(
                BACKEND,
                format!(
                    "query has {} dimensions, collection '{collection}' expects {}",
                    embedding.len(),
                    store.dimensions
                ),
            ));
        }

        let mut scored: Vec<SearchResult> = store
            .entries
            .iter()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.vector, embedding),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.entries.len())
            .ok_or_else(|| missing_collection(collection))
    }
}
