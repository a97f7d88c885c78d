//! Vector store trait for storing and searching embedded chunks.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::document::{EmbeddedChunk, SearchResult};
use crate::error::{RagError, Result};

/// A storage backend for embedded chunks with similarity search.
///
/// Implementations manage named collections. Writes are idempotent per chunk
/// id: upserting a chunk whose id is already stored leaves the collection
/// unchanged. All backends rank by cosine similarity, higher is closer.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &embedded).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Store embedded chunks in a collection.
    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Search for the `top_k` most similar chunks to the given embedding.
    ///
    /// Returns at most `top_k` results ordered by descending similarity score.
    /// An empty collection yields an empty `Vec`.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Number of chunks stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Which [`VectorStore`] backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// [`InMemoryVectorStore`](crate::InMemoryVectorStore), lost on exit.
    #[default]
    Memory,
    /// Chroma over HTTP.
    Chroma,
    /// Qdrant over gRPC.
    Qdrant,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::Memory => "memory",
            StoreKind::Chroma => "chroma",
            StoreKind::Qdrant => "qdrant",
        })
    }
}

impl FromStr for StoreKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(StoreKind::Memory),
            "chroma" | "chromadb" => Ok(StoreKind::Chroma),
            "qdrant" => Ok(StoreKind::Qdrant),
            other => Err(RagError::Config(format!("unknown vector store '{other}'"))),
        }
    }
}
