use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ragline::StoreKind;
use ragline::huggingface::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_QA_MODEL, DEFAULT_TEXT_GENERATION_MODEL,
    DEFAULT_TRANSLATION_MODEL,
};

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    about = "Answer questions about a PDF with retrieval-augmented generation"
)]
pub struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, env = "RAGLINE_LOG", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    /// Deadline for each external call, in seconds
    #[arg(long, global = true, env = "RAGLINE_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a document and answer a question about it
    Ask(AskArgs),
    /// Print the chunks a document splits into
    Chunks(ChunkArgs),
    /// Print the embedding of a text (hosted feature extraction)
    Embed(EmbedArgs),
    /// Translate English text to French (hosted translation)
    Translate(TranslateArgs),
    /// Extract an answer from a context passage (hosted question answering)
    Qa(QaArgs),
    /// Generate text from a prompt (hosted text generation)
    Generate(GenerateArgs),
}

/// Which hosted service embeds and generates for `ask`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Openai,
    Huggingface,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Maximum chunk length in characters
    #[arg(long, env = "RAGLINE_CHUNK_SIZE", default_value_t = 500)]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "RAGLINE_CHUNK_OVERLAP", default_value_t = 50)]
    pub chunk_overlap: usize,

    /// Load each PDF page as its own unit
    #[arg(long, default_value_t = false)]
    pub split_pages: bool,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Document to ingest (.pdf, otherwise read as UTF-8 text)
    #[arg(long)]
    pub file: PathBuf,

    /// Question to answer
    #[arg(long)]
    pub question: String,

    #[command(flatten)]
    pub split: SplitArgs,

    /// Vector store backend
    #[arg(long, env = "RAGLINE_STORE", default_value = "memory")]
    pub store: StoreKind,

    /// Collection holding the document's chunks
    #[arg(long, env = "RAGLINE_COLLECTION", default_value = "ragline")]
    pub collection: String,

    /// Chroma server URL
    #[arg(long, env = "CHROMA_URL", default_value = ragline::chroma::DEFAULT_URL)]
    pub chroma_url: String,

    /// Qdrant gRPC URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6334")]
    pub qdrant_url: String,

    /// Service used for embeddings and generation
    #[arg(long, value_enum, env = "RAGLINE_BACKEND", default_value = "openai")]
    pub backend: Backend,

    /// Number of chunks passed to the model
    #[arg(long, short = 'k', env = "RAGLINE_TOP_K", default_value_t = 2)]
    pub top_k: usize,

    /// Drop retrieved chunks scoring below this similarity
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Chat model (OpenAI) or text generation model (Hugging Face)
    #[arg(long, env = "RAGLINE_CHAT_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(long, env = "RAGLINE_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Maximum tokens in the answer
    #[arg(long, env = "RAGLINE_MAX_TOKENS", default_value_t = 100)]
    pub max_tokens: u32,

    /// Print per-stage timings after the answer
    #[arg(long, default_value_t = false)]
    pub timings: bool,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Hugging Face access token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChunkArgs {
    /// Document to split
    #[arg(long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub split: SplitArgs,

    /// Print chunks as JSON lines
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Text to embed
    pub text: String,

    /// Feature-extraction model
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    pub model: String,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// English text to translate
    pub text: String,

    /// Translation model
    #[arg(long, default_value = DEFAULT_TRANSLATION_MODEL)]
    pub model: String,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct QaArgs {
    /// Passage containing the answer
    #[arg(long)]
    pub context: String,

    /// Question about the passage
    #[arg(long)]
    pub question: String,

    /// Extractive question-answering model
    #[arg(long, default_value = DEFAULT_QA_MODEL)]
    pub model: String,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Prompt text
    pub prompt: String,

    /// Text generation model
    #[arg(long, default_value = DEFAULT_TEXT_GENERATION_MODEL)]
    pub model: String,

    /// Maximum new tokens
    #[arg(long, default_value_t = 512)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    #[command(flatten)]
    pub keys: KeyArgs,
}
