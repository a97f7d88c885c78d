//! Hugging Face hosted inference.
//!
//! [`HfInferenceClient`] posts `{inputs, parameters}` to a model endpoint and
//! decodes the task-specific response. On top of it sit
//! [`HfEmbeddingProvider`] (feature extraction) and [`HfTextGenerationModel`]
//! (text generation as a [`ChatModel`]).
//!
//! This module is only available when the `huggingface` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result, Stage};
use crate::generation::{Answer, ChatModel, GenerationParams, Prompt};
use crate::http;

/// Default router URL for serverless inference.
pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Default feature-extraction model and its dimensionality.
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Default models for the other hosted tasks.
pub const DEFAULT_TRANSLATION_MODEL: &str = "Helsinki-NLP/opus-mt-en-fr";
pub const DEFAULT_QA_MODEL: &str = "deepset/roberta-base-squad2";
pub const DEFAULT_TEXT_GENERATION_MODEL: &str = "MBZUAI/LaMini-Flan-T5-783M";

const PROVIDER: &str = "HuggingFace";

/// The body every hosted task accepts.
#[derive(Debug, Serialize)]
pub struct InferenceRequest<I: Serialize> {
    pub inputs: I,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

/// Output of the translation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub translation_text: String,
}

/// Output of the question-answering task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub answer: String,
    pub score: f32,
    pub start: usize,
    pub end: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::One(t) => Some(t),
            OneOrMany::Many(v) => v.into_iter().next(),
        }
    }
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// Feature-extraction responses come pooled (`[[f32]]` for a batch) or
/// token-level (`[[[f32]]]`).
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureOutput {
    Pooled(Vec<Vec<f32>>),
    Tokens(Vec<Vec<Vec<f32>>>),
}

fn mean_pool(tokens: Vec<Vec<f32>>) -> Vec<f32> {
    let count = tokens.len();
    let Some(dim) = tokens.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut pooled = vec![0.0f32; dim];
    for token in tokens {
        for (acc, x) in pooled.iter_mut().zip(token) {
            *acc += x;
        }
    }
    pooled.iter_mut().for_each(|x| *x /= count as f32);
    pooled
}

fn task_error(stage: Stage, message: String) -> RagError {
    if stage == Stage::Embed {
        RagError::embedding(PROVIDER, message)
    } else {
        RagError::generation(PROVIDER, message)
    }
}

/// A client for hosted inference endpoints.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::huggingface::{HfInferenceClient, DEFAULT_TRANSLATION_MODEL};
///
/// let client = HfInferenceClient::from_env()?;
/// let out = client.translation("I love my country", DEFAULT_TRANSLATION_MODEL).await?;
/// println!("{}", out.translation_text);
/// ```
#[derive(Clone)]
pub struct HfInferenceClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl HfInferenceClient {
    /// Create a client. `token` may be `None` for anonymous, rate-limited access.
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_options(token, DEFAULT_BASE_URL, http::DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit base URL and request timeout.
    pub fn with_options(
        token: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http::client(timeout)?,
            token: token.filter(|t| !t.trim().is_empty()),
            base_url: base_url.into(),
            timeout,
        })
    }

    /// Create a client using the `HF_TOKEN` environment variable if set.
    pub fn from_env() -> Result<Self> {
        Self::new(std::env::var("HF_TOKEN").ok())
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{model}", self.base_url.trim_end_matches('/'))
    }

    /// Run any task: post `{inputs, parameters}` to `model` and decode the reply.
    ///
    /// `stage` decides whether failures surface as embedding or generation errors.
    pub async fn infer<I, O>(
        &self,
        model: &str,
        request: &InferenceRequest<I>,
        stage: Stage,
    ) -> Result<O>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        debug!(provider = PROVIDER, model, "inference request");

        let mut builder = self.client.post(self.endpoint(model)).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            error!(provider = PROVIDER, model, error = %e, "inference request failed");
            http::transport_error(e, stage, self.timeout, |m| task_error(stage, m))
        })?;

        if !response.status().is_success() {
            let detail = http::error_detail(response).await;
            error!(provider = PROVIDER, model, %detail, "inference API error");
            return Err(task_error(stage, detail));
        }

        response
            .json()
            .await
            .map_err(|e| task_error(stage, format!("failed to parse response from '{model}': {e}")))
    }

    /// Embed `texts` with a feature-extraction model, one vector per input.
    pub async fn feature_extraction(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>> {
        let request = InferenceRequest { inputs: texts, parameters: Value::Null };
        let output: FeatureOutput = self.infer(model, &request, Stage::Embed).await?;
        let vectors = match output {
            FeatureOutput::Pooled(v) => v,
            FeatureOutput::Tokens(v) => v.into_iter().map(mean_pool).collect(),
        };
        if vectors.len() != texts.len() {
            return Err(RagError::embedding(
                PROVIDER,
                format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }

    /// Translate `text` with a translation model.
    pub async fn translation(&self, text: &str, model: &str) -> Result<Translation> {
        let request = InferenceRequest { inputs: text, parameters: Value::Null };
        let output: OneOrMany<Translation> = self.infer(model, &request, Stage::Generate).await?;
        output.into_first().ok_or_else(|| RagError::generation(PROVIDER, "empty translation"))
    }

    /// Extract an answer to `question` from `context`.
    pub async fn question_answering(
        &self,
        question: &str,
        context: &str,
        model: &str,
    ) -> Result<QuestionAnswer> {
        let request = InferenceRequest {
            inputs: json!({ "question": question, "context": context }),
            parameters: Value::Null,
        };
        let output: OneOrMany<QuestionAnswer> = self.infer(model, &request, Stage::Generate).await?;
        output.into_first().ok_or_else(|| RagError::generation(PROVIDER, "empty answer"))
    }

    /// Generate text continuing or answering `prompt`.
    pub async fn text_generation(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = InferenceRequest {
            inputs: prompt,
            parameters: json!({
                "max_new_tokens": params.max_tokens,
                "temperature": params.temperature,
                "return_full_text": false,
            }),
        };
        let output: OneOrMany<GeneratedText> =
            self.infer(&params.model, &request, Stage::Generate).await?;
        output
            .into_first()
            .map(|g| g.generated_text)
            .ok_or_else(|| RagError::generation(PROVIDER, "empty generation"))
    }
}

/// An [`EmbeddingProvider`] over hosted feature extraction.
///
/// Vectors are mean-pooled when the model returns token embeddings and are
/// always L2-normalised.
pub struct HfEmbeddingProvider {
    client: HfInferenceClient,
    model: String,
    dimensions: usize,
}

impl HfEmbeddingProvider {
    /// Use `BAAI/bge-small-en-v1.5` (384 dimensions).
    pub fn new(client: HfInferenceClient) -> Self {
        Self {
            client,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    /// Use another model with the given output dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for HfEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");
        let mut vectors = self.client.feature_extraction(texts, &self.model).await?;
        vectors.iter_mut().for_each(|v| l2_normalize(v));
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Adapts hosted text generation to the [`ChatModel`] interface.
///
/// The prompt's messages are flattened into one text input.
pub struct HfTextGenerationModel {
    client: HfInferenceClient,
}

impl HfTextGenerationModel {
    pub fn new(client: HfInferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatModel for HfTextGenerationModel {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, prompt: &Prompt, params: &GenerationParams) -> Result<Answer> {
        let text = self.client.text_generation(&prompt.to_plain_text(), params).await?;
        Ok(Answer { text: text.trim().to_string(), model: params.model.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn token_embeddings_are_mean_pooled() {
        let pooled = mean_pool(vec![vec![1.0, 3.0], vec![3.0, 5.0]]);
        assert_eq!(pooled, vec![2.0, 4.0]);
        assert!(mean_pool(Vec::new()).is_empty());
    }

    #[test]
    fn feature_output_accepts_both_shapes() {
        let pooled: FeatureOutput = serde_json::from_str("[[0.1, 0.2]]").unwrap();
        assert!(matches!(pooled, FeatureOutput::Pooled(v) if v.len() == 1));
        let tokens: FeatureOutput = serde_json::from_str("[[[0.1, 0.2], [0.3, 0.4]]]").unwrap();
        assert!(matches!(tokens, FeatureOutput::Tokens(v) if v[0].len() == 2));
    }

    #[test]
    fn qa_output_may_be_object_or_list() {
        let body = r#"{"answer": "love", "score": 0.9, "start": 1, "end": 5}"#;
        let one: OneOrMany<QuestionAnswer> = serde_json::from_str(body).unwrap();
        assert_eq!(one.into_first().unwrap().answer, "love");
        let many: OneOrMany<QuestionAnswer> = serde_json::from_str(&format!("[{body}]")).unwrap();
        assert_eq!(many.into_first().unwrap().end, 5);
    }

    #[test]
    fn request_omits_null_parameters() {
        let request = InferenceRequest { inputs: "hi", parameters: Value::Null };
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({ "inputs": "hi" }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_maps_to_stage_error() {
        let client =
            HfInferenceClient::with_options(None, "http://127.0.0.1:9", Duration::from_secs(5))
                .unwrap();
        let err = client.translation("hello", DEFAULT_TRANSLATION_MODEL).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Generation | ErrorKind::Timeout));

        let provider = HfEmbeddingProvider::new(client);
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Embedding | ErrorKind::Timeout));
    }
}
