//! Chroma vector store backend.
//!
//! Provides [`ChromaVectorStore`] which implements [`VectorStore`] against
//! a Chroma server's HTTP API (v2). Collections are created with cosine
//! distance, and search scores are reported as `1 - distance`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::chroma::ChromaVectorStore;
//!
//! let store = ChromaVectorStore::new("http://localhost:8000")?;
//! store.create_collection("langchain", 1536).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::document::{Chunk, EmbeddedChunk, SearchResult};
use crate::error::{RagError, Result, Stage};
use crate::http;
use crate::vectorstore::VectorStore;

/// The default Chroma server URL.
pub const DEFAULT_URL: &str = "http://localhost:8000";

const BACKEND: &str = "chroma";

/// A [`VectorStore`] backed by a [Chroma](https://www.trychroma.com/) server.
///
/// Collection ids returned by the server are cached per collection name.
pub struct ChromaVectorStore {
    client: reqwest::Client,
    base_url: String,
    tenant: String,
    database: String,
    timeout: Duration,
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaVectorStore {
    /// Connect to `url` using the default tenant and database.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_options(url, "default_tenant", "default_database", http::DEFAULT_TIMEOUT)
    }

    /// Connect with an explicit tenant, database and request timeout.
    pub fn with_options(
        url: &str,
        tenant: impl Into<String>,
        database: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http::client(timeout)?,
            base_url: url.trim_end_matches('/').to_string(),
            tenant: tenant.into(),
            database: database.into(),
            timeout,
            collection_ids: RwLock::new(HashMap::new()),
        })
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    fn map_transport(&self, e: reqwest::Error, stage: Stage) -> RagError {
        error!(backend = BACKEND, error = %e, "request failed");
        if e.is_connect() {
            return RagError::Connection {
                backend: BACKEND.to_string(),
                message: format!("cannot reach {}: {e}", self.base_url),
            };
        }
        http::transport_error(e, stage, self.timeout, |m| RagError::vector_store(BACKEND, m))
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &Value,
        stage: Stage,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport(e, stage))?;
        if !response.status().is_success() {
            return Err(RagError::vector_store(BACKEND, http::error_detail(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| RagError::vector_store(BACKEND, format!("failed to parse response: {e}")))
    }

    /// Check that the server answers its heartbeat endpoint.
    pub async fn heartbeat(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/v2/heartbeat", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_transport(e, Stage::Store))?;
        if !response.status().is_success() {
            return Err(RagError::vector_store(BACKEND, http::error_detail(response).await));
        }
        Ok(())
    }

    /// Get or create the collection and return its server-side id.
    async fn collection_id(&self, name: &str, stage: Stage) -> Result<String> {
        if let Some(id) = self.collection_ids.read().await.get(name) {
            return Ok(id.clone());
        }

        let body = json!({
            "name": name,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });
        let collection: CollectionInfo = self.post(self.collections_url(), &body, stage).await?;
        self.collection_ids.write().await.insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize, Deserialize)]
struct ChunkMetadata {
    source: String,
    index: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    documents: Option<Vec<Vec<Option<String>>>>,
    metadatas: Option<Vec<Vec<Option<ChunkMetadata>>>>,
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    /// Flatten the first (only) query's columns into results.
    fn into_results(self) -> Vec<SearchResult> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents = self.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let mut metadatas = self.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let mut distances = self.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();
        documents.resize_with(ids.len(), || None);
        metadatas.resize_with(ids.len(), || None);
        distances.resize_with(ids.len(), || None);

        ids.into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, text), metadata), distance)| {
                let (source, index) = metadata.map(|m| (m.source, m.index)).unwrap_or_default();
                SearchResult {
                    chunk: Chunk { id, text: text.unwrap_or_default(), source, index },
                    score: 1.0 - distance.unwrap_or(1.0),
                }
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let id = self.collection_id(name, Stage::Store).await?;
        debug!(collection = name, id = %id, dimensions, "opened chroma collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection, Stage::Store).await?;

        let body = json!({
            "ids": chunks.iter().map(|c| c.chunk.id.as_str()).collect::<Vec<_>>(),
            "embeddings": chunks.iter().map(|c| &c.vector).collect::<Vec<_>>(),
            "documents": chunks.iter().map(|c| c.chunk.text.as_str()).collect::<Vec<_>>(),
            "metadatas": chunks
                .iter()
                .map(|c| ChunkMetadata { source: c.chunk.source.clone(), index: c.chunk.index })
                .collect::<Vec<_>>(),
        });
        let _: Value = self
            .post(format!("{}/{id}/upsert", self.collections_url()), &body, Stage::Store)
            .await?;

        debug!(collection, count = chunks.len(), "upserted chunks to chroma");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let id = self.collection_id(collection, Stage::Retrieve).await?;
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        let response: QueryResponse = self
            .post(format!("{}/{id}/query", self.collections_url()), &body, Stage::Retrieve)
            .await?;

        let mut results = response.into_results();
        results.truncate(top_k);
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let id = self.collection_id(collection, Stage::Store).await?;
        let response = self
            .client
            .get(format!("{}/{id}/count", self.collections_url()))
            .send()
            .await
            .map_err(|e| self.map_transport(e, Stage::Store))?;
        if !response.status().is_success() {
            return Err(RagError::vector_store(BACKEND, http::error_detail(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| RagError::vector_store(BACKEND, format!("failed to parse count: {e}")))
    }
}
