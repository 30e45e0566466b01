//! Core data types shared by the relay, the stream decoder, and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /ask-ai`. Built by the client, consumed once by the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// The question text. Tolerated as missing on the wire so the relay can
    /// answer with its own validation error instead of a decode failure.
    #[serde(default)]
    pub question: String,
    #[serde(
        default,
        rename = "userId",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
}

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry.
///
/// The in-progress assistant message is republished as a fresh snapshot for
/// every delta (see [`crate::stream::AnswerProgress`]); once the stream ends
/// it is never touched again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One predicted exam topic lifted out of a completed answer.
///
/// `likelihood` is a placeholder confidence in percent, drawn uniformly from
/// a fixed plausible range rather than claimed by the model.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedInsight {
    pub topic: String,
    pub likelihood: f64,
}
