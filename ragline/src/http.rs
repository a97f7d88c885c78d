//! Shared `reqwest` plumbing for the HTTP-backed providers and stores.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{RagError, Result, Stage};

/// Default per-request timeout for hosted APIs.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a client with a request timeout.
pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a transport error: timeouts become [`RagError::Timeout`], everything
/// else goes through `other`.
pub(crate) fn transport_error(
    err: reqwest::Error,
    stage: Stage,
    timeout: Duration,
    other: impl FnOnce(String) -> RagError,
) -> RagError {
    if err.is_timeout() {
        RagError::Timeout { stage, after: timeout }
    } else {
        other(format!("request failed: {err}"))
    }
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct PlainErrorBody {
    error: String,
}

/// Read a failed response into `"<status>: <detail>"`.
///
/// Understands `{"error": {"message": ..}}` and `{"error": ".."}` bodies and
/// falls back to the raw text.
pub(crate) async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<OpenAIErrorBody>(&body)
        .map(|e| e.error.message)
        .or_else(|_| serde_json::from_str::<PlainErrorBody>(&body).map(|e| e.error))
        .unwrap_or(body);
    format!("API returned {status}: {detail}")
}
