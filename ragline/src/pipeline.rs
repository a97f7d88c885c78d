//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] runs the two halves of a request strictly in order:
//! ingestion (load → split → embed → store) and answering
//! (embed query → search → generate). Each external call is bounded by
//! [`PipelineConfig::call_timeout`] and can be aborted through a
//! [`CancellationToken`]. Errors come back as [`PipelineError`], tagged with
//! the failing [`Stage`] and otherwise unchanged. Nothing is retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::{RagPipeline, PipelineConfig, InMemoryVectorStore, VectorIndex};
//!
//! let index = VectorIndex::open(embedder, Arc::new(InMemoryVectorStore::new()), "docs").await?;
//! let pipeline = RagPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .index(Arc::new(index))
//!     .generator(AnswerGenerator::new(chat_model, GenerationParams::default()))
//!     .build()?;
//!
//! pipeline.ingest(Path::new("langchain.pdf")).await?;
//! let outcome = pipeline.ask("When to use LangChain?").await?;
//! println!("{}", outcome.answer.text);
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::config::PipelineConfig;
use crate::document::{Chunk, TextUnit};
use crate::error::{PipelineError, RagError, Result, Stage};
use crate::generation::{Answer, AnswerGenerator};
use crate::index::VectorIndex;
use crate::loader::{DocumentLoader, PdfLoader};
use crate::retriever::{Query, RetrievalResult, Retriever};
use crate::splitter::{RecursiveCharacterSplitter, SplitterConfig, TextSplitter};

/// What [`RagPipeline::ingest`] did.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Number of text units the loader produced.
    pub unit_count: usize,
    /// Chunks that were embedded and written, in split order.
    pub chunks: Vec<Chunk>,
}

/// The answer to a question together with the context it was generated from.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: Answer,
    pub context: RetrievalResult,
}

/// The RAG pipeline orchestrator.
///
/// Capability handles are injected through [`RagPipeline::builder()`]; the
/// pipeline holds no other state. It is `Send + Sync`, so one instance may
/// serve concurrent requests.
pub struct RagPipeline {
    config: PipelineConfig,
    loader: Arc<dyn DocumentLoader>,
    splitter: Arc<dyn TextSplitter>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Return the vector index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Run `fut` under the call deadline, racing it against `cancel`.
    async fn guarded<T>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, PipelineError> {
        let after = self.config.call_timeout;
        let fut = fut.instrument(info_span!("stage", %stage));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RagError::Cancelled(stage)),
            res = tokio::time::timeout(after, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(RagError::Timeout { stage, after }),
            },
        };
        outcome.map_err(|e| {
            error!(%stage, error = %e, "pipeline stage failed");
            PipelineError::new(stage, e)
        })
    }

    /// Ingest a document from disk: load → split → embed → store.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] naming the failing stage. If embedding
    /// fails or times out nothing is written to the index.
    pub async fn ingest(&self, source: &Path) -> std::result::Result<IngestReport, PipelineError> {
        self.ingest_with_cancel(source, &CancellationToken::new()).await
    }

    /// Like [`ingest`](Self::ingest), aborting when `cancel` fires.
    pub async fn ingest_with_cancel(
        &self,
        source: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<IngestReport, PipelineError> {
        let span = info_span!("ingest", source = %source.display());
        async {
            let units = self.guarded(Stage::Load, cancel, self.loader.load(source)).await?;
            self.ingest_units_with_cancel(&units, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Ingest already-loaded text units: split → embed → store.
    pub async fn ingest_units(
        &self,
        units: &[TextUnit],
    ) -> std::result::Result<IngestReport, PipelineError> {
        self.ingest_units_with_cancel(units, &CancellationToken::new()).await
    }

    async fn ingest_units_with_cancel(
        &self,
        units: &[TextUnit],
        cancel: &CancellationToken,
    ) -> std::result::Result<IngestReport, PipelineError> {
        let chunks: Vec<Chunk> = units.iter().flat_map(|u| self.splitter.split(u)).collect();
        if chunks.is_empty() {
            info!(unit_count = units.len(), chunk_count = 0, "ingested document (empty)");
            return Ok(IngestReport { unit_count: units.len(), chunks });
        }

        let embedded = self.guarded(Stage::Embed, cancel, self.index.embed(&chunks)).await?;
        self.guarded(Stage::Store, cancel, self.index.store_embedded(&embedded)).await?;

        info!(unit_count = units.len(), chunk_count = chunks.len(), "ingested document");
        Ok(IngestReport { unit_count: units.len(), chunks })
    }

    /// Retrieve the configured top-k chunks for `question`.
    pub async fn retrieve(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<RetrievalResult, PipelineError> {
        let query = Query::new(question, self.config.top_k)
            .map_err(|e| PipelineError::new(Stage::Retrieve, e))?;
        let vector =
            self.guarded(Stage::Embed, cancel, self.retriever.embed_query(&query.text)).await?;
        self.guarded(Stage::Retrieve, cancel, self.retriever.search(&vector, query.k)).await
    }

    /// Answer `question`: retrieve context, then generate.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] naming the failing stage; a partial answer
    /// is never returned.
    pub async fn ask(&self, question: &str) -> std::result::Result<AskOutcome, PipelineError> {
        self.ask_with_cancel(question, &CancellationToken::new()).await
    }

    /// Like [`ask`](Self::ask), aborting when `cancel` fires.
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<AskOutcome, PipelineError> {
        let span = info_span!("ask", top_k = self.config.top_k);
        async {
            let context = self.retrieve(question, cancel).await?;
            let texts = context.texts();
            let answer = self
                .guarded(Stage::Generate, cancel, self.generator.generate(question, &texts))
                .await?;
            info!(context_chunks = context.len(), "answered question");
            Ok::<_, PipelineError>(AskOutcome { answer, context })
        }
        .instrument(span)
        .await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `index` and `generator` are required. The loader defaults to a
/// whole-document [`PdfLoader`], the splitter to a
/// [`RecursiveCharacterSplitter`] with [`SplitterConfig::default()`], and the
/// config to [`PipelineConfig::default()`].
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<PipelineConfig>,
    loader: Option<Arc<dyn DocumentLoader>>,
    splitter: Option<Arc<dyn TextSplitter>>,
    index: Option<Arc<VectorIndex>>,
    generator: Option<AnswerGenerator>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the text splitter.
    pub fn splitter(mut self, splitter: Arc<dyn TextSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Set the vector index.
    pub fn index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: AnswerGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `index` or `generator` is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let index =
            self.index.ok_or_else(|| RagError::Config("index is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;
        let splitter = match self.splitter {
            Some(splitter) => splitter,
            None => Arc::new(RecursiveCharacterSplitter::new(SplitterConfig::default())?),
        };
        let loader = self.loader.unwrap_or_else(|| Arc::new(PdfLoader::new()));

        let mut retriever = Retriever::new(Arc::clone(&index));
        if let Some(threshold) = config.similarity_threshold {
            retriever = retriever.with_similarity_threshold(threshold);
        }

        Ok(RagPipeline { config, loader, splitter, index, retriever, generator })
    }
}
