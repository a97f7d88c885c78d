use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use ragline::chroma::ChromaVectorStore;
use ragline::huggingface::{HfEmbeddingProvider, HfInferenceClient, HfTextGenerationModel};
use ragline::openai::{OpenAIChatModel, OpenAIConfig, OpenAIEmbeddingProvider};
use ragline::{
    AnswerGenerator, ChatModel, DocumentLoader, EmbeddingProvider, GenerationParams,
    InMemoryVectorStore, PipelineConfig, RagPipeline, RecursiveCharacterSplitter, SplitterConfig,
    StoreKind, TextSplitter, VectorIndex, VectorStore, loader_for_path,
};
use ragline_telemetry::SpanStorage;
use tracing::info;

use crate::cli::{
    AskArgs, Backend, ChunkArgs, EmbedArgs, GenerateArgs, KeyArgs, QaArgs, SplitArgs,
    TranslateArgs,
};

fn splitter(args: &SplitArgs) -> Result<RecursiveCharacterSplitter> {
    let config = SplitterConfig::builder()
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .build()?;
    Ok(RecursiveCharacterSplitter::new(config)?)
}

fn openai_config(keys: &KeyArgs, timeout: Duration) -> Result<OpenAIConfig> {
    let key = keys
        .openai_api_key
        .clone()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set for the openai backend"))?;
    let mut config = OpenAIConfig::new(key).with_timeout(timeout);
    if let Some(base_url) = &keys.openai_base_url {
        config = config.with_base_url(base_url.clone());
    }
    Ok(config)
}

fn hf_client(keys: &KeyArgs, timeout: Duration) -> Result<HfInferenceClient> {
    Ok(HfInferenceClient::with_options(
        keys.hf_token.clone(),
        ragline::huggingface::DEFAULT_BASE_URL,
        timeout,
    )?)
}

async fn vector_store(args: &AskArgs, timeout: Duration) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match args.store {
        StoreKind::Memory => Arc::new(InMemoryVectorStore::new()),
        StoreKind::Chroma => {
            let store = ChromaVectorStore::with_options(
                &args.chroma_url,
                "default_tenant",
                "default_database",
                timeout,
            )?;
            store
                .heartbeat()
                .await
                .with_context(|| format!("Chroma is not reachable at {}", args.chroma_url))?;
            Arc::new(store)
        }
        #[cfg(feature = "qdrant")]
        StoreKind::Qdrant => Arc::new(ragline::qdrant::QdrantVectorStore::new(&args.qdrant_url)?),
        #[cfg(not(feature = "qdrant"))]
        StoreKind::Qdrant => {
            bail!("qdrant support is not compiled in; rebuild with --features qdrant")
        }
    };
    Ok(store)
}

pub async fn ask(args: AskArgs, timeout: Duration, spans: Option<SpanStorage>) -> Result<()> {
    let embedder: Arc<dyn EmbeddingProvider>;
    let chat: Arc<dyn ChatModel>;
    let default_model = match args.backend {
        Backend::Openai => {
            let config = openai_config(&args.keys, timeout)?;
            embedder = Arc::new(OpenAIEmbeddingProvider::new(config.clone())?);
            chat = Arc::new(OpenAIChatModel::new(config)?);
            GenerationParams::default().model
        }
        Backend::Huggingface => {
            let client = hf_client(&args.keys, timeout)?;
            embedder = Arc::new(HfEmbeddingProvider::new(client.clone()));
            chat = Arc::new(HfTextGenerationModel::new(client));
            ragline::huggingface::DEFAULT_TEXT_GENERATION_MODEL.to_string()
        }
    };

    let params = GenerationParams::builder()
        .model(args.model.clone().unwrap_or(default_model))
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .build()?;

    let mut config = PipelineConfig::builder().top_k(args.top_k).call_timeout(timeout);
    if let Some(min_score) = args.min_score {
        config = config.similarity_threshold(min_score);
    }

    let store = vector_store(&args, timeout).await?;
    let index = VectorIndex::open(embedder, store, args.collection.clone())
        .await
        .context("failed to open vector index")?;
    let pipeline = RagPipeline::builder()
        .config(config.build()?)
        .loader(Arc::from(loader_for_path(&args.file, args.split.split_pages)))
        .splitter(Arc::new(splitter(&args.split)?))
        .index(Arc::new(index))
        .generator(AnswerGenerator::new(chat, params))
        .build()?;

    let report = pipeline.ingest(&args.file).await?;
    info!(chunks = report.chunks.len(), "document ingested");

    let outcome = pipeline.ask(&args.question).await?;
    println!("{}", outcome.answer.text);

    if let Some(spans) = spans {
        println!();
        for span in spans.spans_named("stage") {
            let stage = span.fields.get("stage").and_then(|v| v.as_str()).unwrap_or("?");
            println!("{stage:>9}  {:>8.1} ms", span.duration_us as f64 / 1000.0);
        }
    }
    Ok(())
}

pub async fn chunks(args: ChunkArgs) -> Result<()> {
    let loader = loader_for_path(&args.file, args.split.split_pages);
    let units = loader.load(&args.file).await?;
    let splitter = splitter(&args.split)?;

    for unit in &units {
        for chunk in splitter.split(unit) {
            if args.json {
                println!("{}", serde_json::to_string(&chunk)?);
            } else {
                println!("--- {} [{}] ---\n{}\n", chunk.source, chunk.index, chunk.text);
            }
        }
    }
    Ok(())
}

pub async fn embed(args: EmbedArgs, timeout: Duration) -> Result<()> {
    let client = hf_client(&args.keys, timeout)?;
    let vectors = client.feature_extraction(&[args.text.as_str()], &args.model).await?;
    let vector = vectors.into_iter().next().ok_or_else(|| anyhow!("no embedding returned"))?;
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}

pub async fn translate(args: TranslateArgs, timeout: Duration) -> Result<()> {
    let client = hf_client(&args.keys, timeout)?;
    let translation = client.translation(&args.text, &args.model).await?;
    println!("{}", translation.translation_text);
    Ok(())
}

pub async fn qa(args: QaArgs, timeout: Duration) -> Result<()> {
    let client = hf_client(&args.keys, timeout)?;
    let answer = client.question_answering(&args.question, &args.context, &args.model).await?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

pub async fn generate(args: GenerateArgs, timeout: Duration) -> Result<()> {
    if args.prompt.trim().is_empty() {
        bail!("prompt must not be empty");
    }
    let client = hf_client(&args.keys, timeout)?;
    let params = GenerationParams::builder()
        .model(args.model)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .build()?;
    let text = client.text_generation(&args.prompt, &params).await?;
    println!("{}", text.trim());
    Ok(())
}
