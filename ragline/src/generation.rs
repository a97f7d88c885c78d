//! Prompt construction and answer generation.
//!
//! [`AnswerGenerator`] fills a two-message [`PromptTemplate`] with the user's
//! question and the retrieved context, then hands the [`Prompt`] to a
//! [`ChatModel`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RagError, Result};

/// The author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// An ordered list of messages sent to a chat model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub messages: Vec<Message>,
}

impl Prompt {
    /// Flatten the prompt into plain text for completion-style models.
    pub fn to_plain_text(&self) -> String {
        self.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n\n")
    }
}

/// The free-text output of a generation model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The generated text.
    pub text: String,
    /// The model that produced it.
    pub model: String,
}

const QUESTION_PLACEHOLDER: &str = "{question}";
const CONTEXT_PLACEHOLDER: &str = "{context}";

/// A system + user message template with `{question}` and `{context}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System instruction.
    pub system: String,
    /// User message; usually contains both placeholders.
    pub user: String,
    /// String placed between context chunks.
    pub context_separator: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: "You are a helpful assistant that can answer questions about the user's data"
                .to_string(),
            user: "User: {question}\n\n{context}".to_string(),
            context_separator: "\n\n".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Render the template for `question` and `context` chunks.
    ///
    /// Placeholders are substituted in a single pass, so a question that itself
    /// contains `{context}` is left as written.
    pub fn render(&self, question: &str, context: &[String]) -> Prompt {
        let context = context.join(&self.context_separator);
        Prompt {
            messages: vec![
                Message::new(Role::System, substitute(&self.system, question, &context)),
                Message::new(Role::User, substitute(&self.user, question, &context)),
            ],
        }
    }
}

fn substitute(template: &str, question: &str, context: &str) -> String {
    let mut out = String::with_capacity(template.len() + question.len() + context.len());
    let mut rest = template;
    loop {
        let next_q = rest.find(QUESTION_PLACEHOLDER);
        let next_c = rest.find(CONTEXT_PLACEHOLDER);
        let (pos, placeholder, value) = match (next_q, next_c) {
            (Some(q), Some(c)) if q < c => (q, QUESTION_PLACEHOLDER, question),
            (Some(_), Some(c)) => (c, CONTEXT_PLACEHOLDER, context),
            (Some(q), None) => (q, QUESTION_PLACEHOLDER, question),
            (None, Some(c)) => (c, CONTEXT_PLACEHOLDER, context),
            (None, None) => break,
        };
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

/// Parameters passed to the generation model on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { model: "gpt-3.5-turbo".to_string(), temperature: 0.7, max_tokens: 100 }
    }
}

impl GenerationParams {
    /// Create a new builder for constructing [`GenerationParams`].
    pub fn builder() -> GenerationParamsBuilder {
        GenerationParamsBuilder::default()
    }
}

/// Builder for validated [`GenerationParams`].
#[derive(Debug, Clone, Default)]
pub struct GenerationParamsBuilder {
    params: GenerationParams,
}

impl GenerationParamsBuilder {
    /// Set the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.params.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = temperature;
        self
    }

    /// Set the maximum output length in tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    /// Build the [`GenerationParams`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `model` is empty
    /// - `temperature` is negative or not finite
    /// - `max_tokens == 0`
    pub fn build(self) -> Result<GenerationParams> {
        let p = &self.params;
        if p.model.trim().is_empty() {
            return Err(RagError::Config("model must not be empty".to_string()));
        }
        if !p.temperature.is_finite() || p.temperature < 0.0 {
            return Err(RagError::Config(format!(
                "temperature must be a non-negative number, got {}",
                p.temperature
            )));
        }
        if p.max_tokens == 0 {
            return Err(RagError::Config("max_tokens must be greater than zero".to_string()));
        }
        Ok(self.params)
    }
}

/// A chat-style text generation backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate a reply to `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the call fails, or
    /// [`RagError::Timeout`] if it exceeds the backend's deadline.
    async fn chat(&self, prompt: &Prompt, params: &GenerationParams) -> Result<Answer>;
}

/// Builds prompts from retrieved context and calls a [`ChatModel`].
///
/// Holds no state between calls.
/// Renders a prompt from retrieved chunks and asks a [`ChatModel`] to answer it.
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    template: PromptTemplate,
    params: GenerationParams,
}

impl AnswerGenerator {
    /// Create a generator with the default template.
    pub fn new(model: Arc<dyn ChatModel>, params: GenerationParams) -> Self {
        Self { model, template: PromptTemplate::default(), params }
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Return the generation parameters.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Return the prompt template.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Build the prompt for `question` without calling the model.
    pub fn prompt(&self, question: &str, context: &[String]) -> Prompt {
        self.template.render(question, context)
    }

    /// Answer `question` using `context` chunks.
    pub async fn generate(&self, question: &str, context: &[String]) -> Result<Answer> {
        let prompt = self.prompt(question, context);
        debug!(
            provider = self.model.name(),
            model = %self.params.model,
            context_chunks = context.len(),
            "generating answer"
        );
        let answer = self.model.chat(&prompt, &self.params).await?;
        info!(
            provider = self.model.name(),
            model = %answer.model,
            answer_len = answer.text.len(),
            "generated answer"
        );
        Ok(answer)
    }
}
