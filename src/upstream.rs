//! Upstream chat-completion client.
//!
//! Assembles the chat message list (fixed exam-prep system instruction with
//! the per-user study context, plus the verbatim question) and opens a single
//! streamed completion request against the configured provider.
//!
//! Status classification mirrors what callers need to surface:
//! - HTTP 429 → [`UpstreamError::RateLimited`]
//! - HTTP 402 → [`UpstreamError::OutOfCredits`]
//! - other non-success → [`UpstreamError::Service`] (status and body kept for
//!   logging, never shown to the caller verbatim)
//!
//! No retries happen here — retry policy belongs to the caller.

use serde::Serialize;
use std::time::Duration;

use crate::config::{UpstreamConfig, API_KEY_ENV};
use crate::context::StudyContext;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Upstream credential missing from the relay's environment.
    #[error("{API_KEY_ENV} environment variable not set")]
    MissingCredential,

    /// Upstream returned HTTP 429.
    #[error("Rate limit exceeded. Please wait a moment and try again.")]
    RateLimited,

    /// Upstream returned HTTP 402.
    #[error("Payment required. The AI service has run out of credits.")]
    OutOfCredits,

    /// Any other non-success upstream status.
    #[error("upstream returned HTTP {status}")]
    Service { status: u16, body: String },

    /// Network-level failure talking to the upstream.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// HTTP client for upstream calls.
///
/// Connect timeout only — streamed completions can legitimately run for
/// minutes, so the response body is left unbounded and transport-level
/// timeouts take it from there.
pub fn build_client(config: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.timeout_secs))
        .build()
}

fn system_instruction(context: &StudyContext) -> String {
    format!(
        "You are an exam preparation assistant. Help the student understand \
         concepts, work through problems, and focus their revision.\n\
         Syllabus documents on file: {}.\n\
         Past exam papers on file: {}.\n\
         Answer the question directly. Then, if you can identify likely exam \
         topics or a one-line summary, append a fenced ```json code block \
         containing an object with optional keys \"important_topics\" (array \
         of strings) and \"summary\" (short string).",
        context.syllabi, context.past_papers
    )
}

/// Build the two-message chat list sent upstream.
pub fn build_messages(question: &str, context: &StudyContext) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system_instruction(context),
        },
        ChatMessage {
            role: "user".to_string(),
            content: question.to_string(),
        },
    ]
}

/// Open a streamed chat completion and return the raw response.
///
/// The response body is the provider's SSE stream, untouched; callers either
/// pass it through (relay) or feed it to the decoder (tests, tooling).
pub async fn open_stream(
    client: &reqwest::Client,
    config: &UpstreamConfig,
    messages: &[ChatMessage],
) -> Result<reqwest::Response, UpstreamError> {
    let api_key = std::env::var(API_KEY_ENV).map_err(|_| UpstreamError::MissingCredential)?;

    let body = CompletionRequest {
        model: &config.model,
        messages,
        stream: true,
    };

    let response = client
        .post(format!("{}/chat/completions", config.base_url))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => Err(UpstreamError::RateLimited),
        402 => Err(UpstreamError::OutOfCredits),
        code => {
            let body_text = response.text().await.unwrap_or_default();
            Err(UpstreamError::Service {
                status: code,
                body: body_text,
            })
        }
    }
}
