//! Per-request study context for the upstream prompt.
//!
//! Before forwarding a question, the relay summarizes what the user has
//! uploaded so the model can tailor its answer. Only identifying metadata is
//! read (titles, subjects, years) — never file contents. The two summary
//! strings are recomputed per request and never persisted.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// The two context strings embedded into the system instruction.
#[derive(Debug, Clone)]
pub struct StudyContext {
    pub syllabi: String,
    pub past_papers: String,
}

impl StudyContext {
    /// Context used when the request carries no user id: nothing to report.
    pub fn anonymous() -> Self {
        Self {
            syllabi: NONE_UPLOADED.to_string(),
            past_papers: NONE_UPLOADED.to_string(),
        }
    }
}

const NONE_UPLOADED: &str = "none uploaded";

#[derive(Debug, Clone)]
struct SyllabusMeta {
    title: String,
    subject: Option<String>,
}

#[derive(Debug, Clone)]
struct PaperMeta {
    title: String,
    subject: Option<String>,
    year: Option<i64>,
}

/// Build the study context for a user from stored metadata.
///
/// An absence of uploads yields the "none uploaded" placeholder rather than
/// an error — a brand-new user asking a question is a normal case.
pub async fn build_context(pool: &SqlitePool, user_id: &str) -> Result<StudyContext> {
    let syllabus_rows = sqlx::query(
        "SELECT title, subject FROM syllabi WHERE user_id = ? ORDER BY uploaded_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let syllabi: Vec<SyllabusMeta> = syllabus_rows
        .iter()
        .map(|row| SyllabusMeta {
            title: row.get("title"),
            subject: row.get("subject"),
        })
        .collect();

    let paper_rows = sqlx::query(
        "SELECT title, subject, year FROM past_papers WHERE user_id = ? ORDER BY year DESC, uploaded_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let papers: Vec<PaperMeta> = paper_rows
        .iter()
        .map(|row| PaperMeta {
            title: row.get("title"),
            subject: row.get("subject"),
            year: row.get("year"),
        })
        .collect();

    Ok(StudyContext {
        syllabi: format_syllabi(&syllabi),
        past_papers: format_papers(&papers),
    })
}

fn format_syllabi(items: &[SyllabusMeta]) -> String {
    if items.is_empty() {
        return NONE_UPLOADED.to_string();
    }
    let listed: Vec<String> = items
        .iter()
        .map(|s| match &s.subject {
            Some(subject) => format!("{} ({})", s.title, subject),
            None => s.title.clone(),
        })
        .collect();
    format!("{} uploaded: {}", items.len(), listed.join(", "))
}

fn format_papers(items: &[PaperMeta]) -> String {
    if items.is_empty() {
        return NONE_UPLOADED.to_string();
    }
    let listed: Vec<String> = items
        .iter()
        .map(|p| {
            let mut label = p.title.clone();
            if let Some(subject) = &p.subject {
                label.push_str(&format!(", {}", subject));
            }
            if let Some(year) = p.year {
                label.push_str(&format!(" [{}]", year));
            }
            label
        })
        .collect();
    format!("{} uploaded: {}", items.len(), listed.join("; "))
}
