//! The vector index: embeds chunks and stores them in a [`VectorStore`].

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::{Chunk, EmbeddedChunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// An embedder, a storage backend and a collection name bound together.
///
/// [`add`](VectorIndex::add) is all-or-nothing per call: chunks are written
/// only after every embedding in the batch has been produced and checked.
/// Re-adding a chunk whose id is already stored is a no-op.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl VectorIndex {
    /// Bind an embedder and store to `collection`, creating it if needed.
    ///
    /// The collection is created with the dimensionality reported by the
    /// embedder.
    ///
    /// # Errors
    ///
    /// Propagates the store's error, e.g. [`RagError::Connection`] when a
    /// networked backend is unreachable.
    pub async fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let collection = collection.into();
        let dimensions = embedder.dimensions();
        store.create_collection(&collection, dimensions).await.map_err(|e| {
            error!(collection = %collection, backend = store.name(), error = %e, "failed to open collection");
            e
        })?;
        info!(collection = %collection, backend = store.name(), dimensions, "opened vector index");
        Ok(Self { embedder, store, collection })
    }

    /// Return the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Return the embedding provider shared with the retriever.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Return the storage backend.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed `chunks` and write them to the collection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the provider fails or returns the
    /// wrong number or size of vectors; nothing is stored in that case.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        let embedded = self.embed(chunks).await?;
        self.store_embedded(&embedded).await?;
        Ok(embedded)
    }

    /// Embed `chunks` without storing them.
    ///
    /// Split from [`store_embedded`](Self::store_embedded) so callers can put
    /// separate deadlines on the two external calls.
    pub async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let provider = self.embedder.name();
        if vectors.len() != chunks.len() {
            return Err(RagError::embedding(
                provider,
                format!("expected {} embeddings, got {}", chunks.len(), vectors.len()),
            ));
        }
        let dimensions = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(RagError::embedding(
                provider,
                format!("expected {dimensions}-dimensional embeddings, got {}", bad.len()),
            ));
        }

        Ok(chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect())
    }

    /// Write already-embedded chunks to the collection.
    pub async fn store_embedded(&self, embedded: &[EmbeddedChunk]) -> Result<()> {
        if embedded.is_empty() {
            return Ok(());
        }
        self.store.upsert(&self.collection, embedded).await?;
        debug!(collection = %self.collection, count = embedded.len(), "stored embedded chunks");
        Ok(())
    }

    /// Return up to `k` stored chunks most similar to `vector`, best first.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.store.search(&self.collection, vector, k).await
    }

    /// Number of chunks currently stored in the collection.
    pub async fn len(&self) -> Result<usize> {
        self.store.count(&self.collection).await
    }

    /// Whether the collection holds no chunks.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
