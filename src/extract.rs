//! Trailing structured-block extraction.
//!
//! The system instruction asks the model to append a fenced ```json block
//! carrying likely exam topics and a one-line summary. Once the stream has
//! finished, the assembled answer is scanned for the first such block. The
//! block is strictly optional: a missing or unparseable block means the
//! answer is persisted as-is with an empty summary, never an error.

use rand::Rng;
use serde::Deserialize;

use crate::models::ExtractedInsight;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Placeholder likelihood range, in percent. The model is not asked for a
/// confidence, so each topic gets a uniformly drawn plausible value.
const LIKELIHOOD_LOW: f64 = 60.0;
const LIKELIHOOD_HIGH: f64 = 90.0;

/// Payload of the fenced block. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
struct InsightBlock {
    #[serde(default)]
    important_topics: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// What the extractor yields for one completed answer.
#[derive(Debug, Default)]
pub struct AnswerInsights {
    pub topics: Vec<ExtractedInsight>,
    pub summary: Option<String>,
}

impl AnswerInsights {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.summary.is_none()
    }
}

/// Scan the final answer text for a fenced insight block.
///
/// Only the first ```json fence is considered; if it fails to parse the
/// answer is treated as carrying no structured data at all.
pub fn extract_insights(answer: &str) -> AnswerInsights {
    let Some(block) = find_fenced_json(answer) else {
        return AnswerInsights::default();
    };

    let parsed: InsightBlock = match serde_json::from_str(block) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unparseable insight block");
            return AnswerInsights::default();
        }
    };

    let mut rng = rand::thread_rng();
    AnswerInsights {
        topics: parsed
            .important_topics
            .into_iter()
            .map(|topic| ExtractedInsight {
                topic,
                likelihood: rng.gen_range(LIKELIHOOD_LOW..LIKELIHOOD_HIGH),
            })
            .collect(),
        summary: parsed.summary,
    }
}

/// Return the contents of the first ```json fence, if it is closed.
fn find_fenced_json(text: &str) -> Option<&str> {
    let open = text.find(FENCE_OPEN)?;
    let body = &text[open + FENCE_OPEN.len()..];
    let close = body.find(FENCE_CLOSE)?;
    Some(body[..close].trim())
}
