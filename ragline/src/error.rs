//! Error types for the `ragline` crate.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A pipeline stage, used to report where a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading the source document.
    Load,
    /// Splitting text units into chunks.
    Split,
    /// Embedding chunks or queries.
    Embed,
    /// Writing to or reading from the vector store.
    Store,
    /// Running a similarity query.
    Retrieve,
    /// Calling the generation model.
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Split => "split",
            Stage::Embed => "embed",
            Stage::Store => "store",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The source document is missing, unreadable or cannot be parsed.
    #[error("Load error ({source_ref}): {message}")]
    Load {
        /// The path or identifier of the source.
        source_ref: String,
        /// A description of the failure.
        message: String,
    },

    /// The splitter configuration is invalid.
    #[error("Split error: {0}")]
    Split(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A networked backend could not be reached.
    #[error("Connection error ({backend}): {message}")]
    Connection {
        /// The backend that could not be reached.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation model call failed.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An external call exceeded its deadline.
    #[error("Timeout in {stage} stage after {after:?}")]
    Timeout {
        /// The stage whose call timed out.
        stage: Stage,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// The caller cancelled the request while a call was in flight.
    #[error("Cancelled during {0} stage")]
    Cancelled(Stage),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error not attributable to a specific source document.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The kind of a [`RagError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Load,
    Split,
    Embedding,
    VectorStore,
    Connection,
    Generation,
    Timeout,
    Cancelled,
    Config,
    Io,
}

impl RagError {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Load { .. } => ErrorKind::Load,
            RagError::Split(_) => ErrorKind::Split,
            RagError::Embedding { .. } => ErrorKind::Embedding,
            RagError::VectorStore { .. } => ErrorKind::VectorStore,
            RagError::Connection { .. } => ErrorKind::Connection,
            RagError::Generation { .. } => ErrorKind::Generation,
            RagError::Timeout { .. } => ErrorKind::Timeout,
            RagError::Cancelled(_) => ErrorKind::Cancelled,
            RagError::Config(_) => ErrorKind::Config,
            RagError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::Embedding { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn generation(provider: &str, message: impl Into<String>) -> Self {
        RagError::Generation { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn vector_store(backend: &str, message: impl Into<String>) -> Self {
        RagError::VectorStore { backend: backend.to_string(), message: message.into() }
    }
}

/// A [`RagError`] tagged with the pipeline stage that produced it.
///
/// The inner error is carried unchanged so callers can still match on its kind.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// The stage that failed.
    pub stage: Stage,
    /// The underlying error.
    #[source]
    pub source: RagError,
}

impl PipelineError {
    pub(crate) fn new(stage: Stage, source: RagError) -> Self {
        Self { stage, source }
    }

    /// Return the kind of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
