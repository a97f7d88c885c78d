//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragline::{
    Answer, ChatModel, EmbeddingProvider, GenerationParams, InMemoryVectorStore, Prompt,
    RagError, Role, VectorIndex,
};

/// Deterministic hash-based embeddings: same text, same vector.
pub struct HashEmbedder {
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> ragline::Result<Vec<f32>> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            // splitmix64 over (hash, i) gives well-spread components.
            let mut x = hash ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            x ^= x >> 31;
            *v = (x >> 40) as f32 / (1u64 << 24) as f32 - 0.5;
        }
        ragline::l2_normalize(&mut emb);
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embeddings looked up from a fixed table; unknown text is an error.
pub struct TableEmbedder {
    pub table: HashMap<String, Vec<f32>>,
    pub dimensions: usize,
}

impl TableEmbedder {
    pub fn new(entries: impl IntoIterator<Item = (String, Vec<f32>)>) -> Self {
        let table: HashMap<_, _> = entries.into_iter().collect();
        let dimensions = table.values().next().map(Vec::len).unwrap_or(0);
        Self { table, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    async fn embed(&self, text: &str) -> ragline::Result<Vec<f32>> {
        self.table.get(text).cloned().ok_or_else(|| RagError::Embedding {
            provider: "table".to_string(),
            message: format!("no embedding for {text:?}"),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Fails every batch after `ok_batches` successful ones.
pub struct FlakyEmbedder {
    pub inner: HashEmbedder,
    pub ok_batches: usize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn embed(&self, text: &str) -> ragline::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> ragline::Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_batches {
            return Err(RagError::Embedding {
                provider: "flaky".to_string(),
                message: "service unavailable".to_string(),
            });
        }
        let mut out = Vec::new();
        for text in texts {
            out.push(self.inner.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }
}

/// Sleeps before every embedding call.
pub struct SlowEmbedder {
    pub inner: HashEmbedder,
    pub delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn name(&self) -> &str {
        "slow"
    }

    async fn embed(&self, text: &str) -> ragline::Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }
}

/// Answers with the user message it was given.
pub struct EchoChatModel;

#[async_trait]
impl ChatModel for EchoChatModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn chat(&self, prompt: &Prompt, params: &GenerationParams) -> ragline::Result<Answer> {
        let user = prompt
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(Answer { text: user, model: params.model.clone() })
    }
}

/// Always fails as if the endpoint were down.
pub struct DownChatModel;

#[async_trait]
impl ChatModel for DownChatModel {
    fn name(&self) -> &str {
        "down"
    }

    async fn chat(&self, _prompt: &Prompt, _params: &GenerationParams) -> ragline::Result<Answer> {
        Err(RagError::Generation {
            provider: "down".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Open an in-memory index over `embedder` in collection `"test"`.
pub async fn memory_index(embedder: Arc<dyn EmbeddingProvider>) -> Arc<VectorIndex> {
    let store = Arc::new(InMemoryVectorStore::new());
    Arc::new(VectorIndex::open(embedder, store, "test").await.unwrap())
}

/// Text resembling three extracted PDF pages of prose.
pub fn three_page_text() -> String {
    let sentence = "LangChain is a framework for developing applications powered by language models";
    let page = |n: usize| {
        (0..12)
            .map(|i| format!("{sentence} (page {n}, sentence {i})."))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!("{}\n\n{}\n\n{}", page(1), page(2), page(3))
}
