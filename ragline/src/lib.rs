//! # ragline
//!
//! A small retrieval-augmented generation pipeline:
//!
//! 1. a [`DocumentLoader`] reads a PDF (or text file) into [`TextUnit`]s,
//! 2. a [`TextSplitter`] cuts them into overlapping [`Chunk`]s,
//! 3. a [`VectorIndex`] embeds the chunks and stores them in a [`VectorStore`],
//! 4. a [`Retriever`] finds the chunks closest to a question,
//! 5. an [`AnswerGenerator`] prompts a [`ChatModel`] with question and context.
//!
//! [`RagPipeline`] wires the stages together with per-call deadlines and
//! cancellation.
//!
//! ## Features
//!
//! | feature       | adds                                                  |
//! |---------------|-------------------------------------------------------|
//! | `openai`      | [`openai::OpenAIEmbeddingProvider`], [`openai::OpenAIChatModel`] |
//! | `huggingface` | [`huggingface::HfInferenceClient`] and its adapters   |
//! | `chroma`      | [`chroma::ChromaVectorStore`]                         |
//! | `qdrant`      | `qdrant::QdrantVectorStore`                           |
//!
//! The in-memory store, loaders, splitter and pipeline are always available.

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod inmemory;
pub mod loader;
pub mod pipeline;
pub mod retriever;
pub mod splitter;
pub mod vectorstore;

#[cfg(any(feature = "openai", feature = "huggingface", feature = "chroma"))]
mod http;

#[cfg(feature = "chroma")]
pub mod chroma;
#[cfg(feature = "huggingface")]
pub mod huggingface;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{Chunk, EmbeddedChunk, SearchResult, TextUnit};
pub use embedding::{EmbeddingProvider, cosine_similarity, l2_normalize};
pub use error::{ErrorKind, PipelineError, RagError, Result, Stage};
pub use generation::{
    Answer, AnswerGenerator, ChatModel, GenerationParams, GenerationParamsBuilder, Message,
    Prompt, PromptTemplate, Role,
};
pub use index::VectorIndex;
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentLoader, PdfLoader, TextLoader, loader_for_path};
pub use pipeline::{AskOutcome, IngestReport, RagPipeline, RagPipelineBuilder};
pub use retriever::{Query, RetrievalResult, Retriever};
pub use splitter::{
    RecursiveCharacterSplitter, Separator, SplitterConfig, SplitterConfigBuilder, TextSplitter,
};
pub use vectorstore::{StoreKind, VectorStore};

pub use tokio_util::sync::CancellationToken;
