//! End-to-end tests for the RAG pipeline with in-process test doubles.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use common::{
    DownChatModel, EchoChatModel, FlakyEmbedder, HashEmbedder, SlowEmbedder, TableEmbedder,
    memory_index, three_page_text,
};
use ragline::{
    AnswerGenerator, CancellationToken, Chunk, ChatModel, ErrorKind, GenerationParams,
    PipelineConfig, Query, RagPipeline, Retriever, Stage, TextLoader, TextUnit, VectorIndex,
};

fn generator(model: impl ChatModel + 'static) -> AnswerGenerator {
    AnswerGenerator::new(Arc::new(model), GenerationParams::default())
}

fn pipeline(index: Arc<VectorIndex>, model: impl ChatModel + 'static) -> RagPipeline {
    RagPipeline::builder().index(index).generator(generator(model)).build().unwrap()
}

fn document() -> Vec<TextUnit> {
    vec![TextUnit::new("langchain.pdf", three_page_text())]
}

#[tokio::test]
async fn self_match_ranks_first() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 32 })).await;
    let chunks: Vec<Chunk> = [
        "Vector stores hold embeddings.",
        "Retrievers return relevant chunks.",
        "Chains combine prompts and models.",
        "Agents decide which tool to call.",
        "Loaders read documents from disk.",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| Chunk::new("notes.txt", i, *text))
    .collect();
    index.add(&chunks).await.unwrap();

    let retriever = Retriever::new(Arc::clone(&index));
    let result = retriever.retrieve(&Query::new(chunks[2].text.clone(), 1).unwrap()).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.results[0].chunk.id, chunks[2].id);
    assert!((result.results[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn empty_index_returns_empty_result() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 16 })).await;
    assert!(index.is_empty().await.unwrap());

    let retriever = Retriever::new(Arc::clone(&index));
    let result = retriever.retrieve(&Query::new("anything", 3).unwrap()).await.unwrap();
    assert!(result.is_empty());

    let outcome = pipeline(index, EchoChatModel).ask("anything?").await.unwrap();
    assert!(outcome.context.is_empty());
    assert!(outcome.answer.text.contains("anything?"));
}

#[tokio::test]
async fn generation_failure_is_reported_and_leaves_index_unchanged() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 16 })).await;
    let rag = pipeline(Arc::clone(&index), DownChatModel);
    let report = rag.ingest_units(&document()).await.unwrap();
    let before = index.len().await.unwrap();
    assert_eq!(before, report.chunks.len());

    let err = rag.ask("When to use LangChain?").await.unwrap_err();
    assert_eq!(err.stage, Stage::Generate);
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert_eq!(index.len().await.unwrap(), before);
}

#[tokio::test]
async fn top_two_nearest_in_similarity_order() {
    let mut entries: Vec<(String, Vec<f32>)> = (0..10)
        .map(|i| (format!("chunk {i}"), vec![0.0, (i + 1) as f32, 1.0]))
        .collect();
    entries[4].1 = vec![1.0, 0.1, 0.0];
    entries[7].1 = vec![1.0, 0.5, 0.0];
    entries.push(("query".to_string(), vec![1.0, 0.0, 0.0]));
    let embedder = Arc::new(TableEmbedder::new(entries));

    let index = memory_index(embedder).await;
    let chunks: Vec<Chunk> =
        (0..10).map(|i| Chunk::new("table", i, format!("chunk {i}"))).collect();
    index.add(&chunks).await.unwrap();
    assert_eq!(index.len().await.unwrap(), 10);

    let retriever = Retriever::new(Arc::clone(&index));
    let result = retriever.retrieve(&Query::new("query", 2).unwrap()).await.unwrap();
    let indices: Vec<usize> = result.chunks().iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![4, 7]);
    let scores = result.scores();
    assert!(scores[0] > scores[1]);

    let config = PipelineConfig::builder().top_k(2).build().unwrap();
    let rag = RagPipeline::builder()
        .config(config)
        .index(index)
        .generator(generator(EchoChatModel))
        .build()
        .unwrap();
    let outcome = rag.ask("query").await.unwrap();
    assert_eq!(outcome.context.texts(), vec!["chunk 4".to_string(), "chunk 7".to_string()]);
    assert!(outcome.answer.text.contains("chunk 4\n\nchunk 7"));
}

#[tokio::test]
async fn similarity_threshold_filters_results() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 32 })).await;
    let chunks: Vec<Chunk> =
        (0..5).map(|i| Chunk::new("doc", i, format!("sentence number {i}"))).collect();
    index.add(&chunks).await.unwrap();

    let config = PipelineConfig::builder().top_k(5).similarity_threshold(0.999).build().unwrap();
    let rag = RagPipeline::builder()
        .config(config)
        .index(index)
        .generator(generator(EchoChatModel))
        .build()
        .unwrap();
    let result = rag.retrieve("sentence number 3", &CancellationToken::new()).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.results[0].chunk.index, 3);
}

#[tokio::test]
async fn ingest_is_idempotent() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 16 })).await;
    let rag = pipeline(Arc::clone(&index), EchoChatModel);

    let first = rag.ingest_units(&document()).await.unwrap();
    let second = rag.ingest_units(&document()).await.unwrap();

    assert_eq!(first.unit_count, 1);
    assert_eq!(
        first.chunks.iter().map(|c| &c.id).collect::<Vec<_>>(),
        second.chunks.iter().map(|c| &c.id).collect::<Vec<_>>(),
    );
    assert_eq!(index.len().await.unwrap(), first.chunks.len());
}

#[tokio::test]
async fn failed_embedding_writes_nothing() {
    let embedder = Arc::new(FlakyEmbedder {
        inner: HashEmbedder { dimensions: 16 },
        ok_batches: 1,
        calls: AtomicUsize::new(0),
    });
    let index = memory_index(embedder).await;
    let rag = pipeline(Arc::clone(&index), EchoChatModel);

    let report = rag.ingest_units(&document()).await.unwrap();
    let stored = index.len().await.unwrap();
    assert_eq!(stored, report.chunks.len());

    let more = vec![TextUnit::new("other.pdf", "A different document about retrieval.")];
    let err = rag.ingest_units(&more).await.unwrap_err();
    assert_eq!(err.stage, Stage::Embed);
    assert_eq!(err.kind(), ErrorKind::Embedding);
    assert_eq!(index.len().await.unwrap(), stored);
}

#[tokio::test(start_paused = true)]
async fn slow_embedding_times_out() {
    let embedder = Arc::new(SlowEmbedder {
        inner: HashEmbedder { dimensions: 16 },
        delay: Duration::from_secs(5),
    });
    let index = memory_index(embedder).await;
    let config =
        PipelineConfig::builder().call_timeout(Duration::from_millis(100)).build().unwrap();
    let rag = RagPipeline::builder()
        .config(config)
        .index(Arc::clone(&index))
        .generator(generator(EchoChatModel))
        .build()
        .unwrap();

    let err = rag.ingest_units(&document()).await.unwrap_err();
    assert_eq!(err.stage, Stage::Embed);
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(index.is_empty().await.unwrap());

    let err = rag.ask("When to use LangChain?").await.unwrap_err();
    assert_eq!(err.stage, Stage::Embed);
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn cancelled_request_stops_before_generation() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 16 })).await;
    let rag = pipeline(Arc::clone(&index), EchoChatModel);
    rag.ingest_units(&document()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = rag.ask_with_cancel("When to use LangChain?", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.stage, Stage::Embed);

    let retry = rag.ingest_units(&document()).await;
    assert!(retry.is_ok(), "a fresh request is not affected by an earlier cancellation");
}

#[tokio::test]
async fn ingest_from_text_file_then_ask() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(file, "{}", three_page_text()).unwrap();

    let index = memory_index(Arc::new(HashEmbedder { dimensions: 16 })).await;
    let rag = RagPipeline::builder()
        .loader(Arc::new(TextLoader))
        .index(Arc::clone(&index))
        .generator(generator(EchoChatModel))
        .build()
        .unwrap();

    let report = rag.ingest(file.path()).await.unwrap();
    assert_eq!(report.unit_count, 1);
    assert!(!report.chunks.is_empty());

    let outcome = rag.ask("When to use LangChain?").await.unwrap();
    assert_eq!(outcome.context.len(), 2);
    assert!(outcome.answer.text.starts_with("User: When to use LangChain?"));
}

#[tokio::test]
async fn missing_document_fails_at_load() {
    let index = memory_index(Arc::new(HashEmbedder { dimensions: 16 })).await;
    let rag = pipeline(index, EchoChatModel);
    let err = rag.ingest(std::path::Path::new("/nonexistent/langchain.pdf")).await.unwrap_err();
    assert_eq!(err.stage, Stage::Load);
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[test]
fn builder_requires_index_and_generator() {
    let err = RagPipeline::builder().generator(generator(EchoChatModel)).build().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}
