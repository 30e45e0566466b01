//! Best-effort persistence of completed answers and predicted topics.
//!
//! Writes are insert-only and decoupled from the answer path: callers hand a
//! finished [`AnswerRecord`] to the writer task through a queue and move on.
//! A write failure produces a [`WriteNotice`] on a separate channel (the CLI
//! prints these as transient warnings) and never touches the answer the user
//! is already looking at.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::extract::AnswerInsights;

/// One completed question/answer pair plus whatever the extractor found.
#[derive(Debug)]
pub struct AnswerRecord {
    pub user_id: Option<String>,
    pub question: String,
    pub answer: String,
    pub insights: AnswerInsights,
}

/// Human-readable, non-fatal persistence failure notice.
#[derive(Debug)]
pub struct WriteNotice {
    pub message: String,
}

/// Handle for enqueueing records to the writer task.
#[derive(Clone)]
pub struct InsightWriter {
    jobs: mpsc::Sender<AnswerRecord>,
}

impl InsightWriter {
    /// Enqueue a record. Errors (queue closed) are swallowed: persistence is
    /// strictly best-effort relative to the displayed answer.
    pub async fn submit(&self, record: AnswerRecord) {
        let _ = self.jobs.send(record).await;
    }
}

/// Spawn the writer task.
///
/// Returns the enqueue handle and the notice channel. The task exits when
/// every [`InsightWriter`] clone has been dropped.
pub fn spawn_writer(pool: SqlitePool) -> (InsightWriter, mpsc::Receiver<WriteNotice>) {
    let (jobs_tx, mut jobs_rx) = mpsc::channel::<AnswerRecord>(8);
    let (notice_tx, notice_rx) = mpsc::channel::<WriteNotice>(8);

    tokio::spawn(async move {
        while let Some(record) = jobs_rx.recv().await {
            if let Err(err) = write_record(&pool, &record).await {
                tracing::warn!(error = %err, "failed to persist answer insights");
                let _ = notice_tx
                    .send(WriteNotice {
                        message: format!("Could not save study insights: {}", err),
                    })
                    .await;
            }
        }
    });

    (InsightWriter { jobs: jobs_tx }, notice_rx)
}

/// Insert the answer row and one row per predicted topic.
async fn write_record(pool: &SqlitePool, record: &AnswerRecord) -> Result<()> {
    let now = Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO ai_answers (id, user_id, question, answer, summary, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&record.user_id)
    .bind(&record.question)
    .bind(&record.answer)
    .bind(record.insights.summary.as_deref().unwrap_or(""))
    .bind(now)
    .execute(pool)
    .await?;

    for insight in &record.insights.topics {
        sqlx::query(
            "INSERT INTO predicted_topics (id, user_id, topic, likelihood, source, created_at) VALUES (?, ?, ?, ?, 'ai', ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.user_id)
        .bind(&insight.topic)
        .bind(insight.likelihood)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedInsight;
    use std::time::Duration;

    async fn test_pool() -> SqlitePool {
        // A single connection so every handle sees the same in-memory db.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run_migrations_on(&pool).await.unwrap();
        pool
    }

    fn record_with_topics() -> AnswerRecord {
        AnswerRecord {
            user_id: Some("u1".into()),
            question: "What is entropy?".into(),
            answer: "A measure of disorder.".into(),
            insights: AnswerInsights {
                topics: vec![
                    ExtractedInsight {
                        topic: "Thermodynamics".into(),
                        likelihood: 71.5,
                    },
                    ExtractedInsight {
                        topic: "Statistical mechanics".into(),
                        likelihood: 64.0,
                    },
                ],
                summary: Some("Entropy basics".into()),
            },
        }
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn writer_inserts_answer_and_topic_rows() {
        let pool = test_pool().await;
        let (writer, _notices) = spawn_writer(pool.clone());

        writer.submit(record_with_topics()).await;

        // The write is asynchronous; poll briefly.
        for _ in 0..50 {
            if count(&pool, "SELECT COUNT(*) FROM ai_answers").await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM ai_answers").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM predicted_topics").await, 2);

        let summary: String = sqlx::query_scalar("SELECT summary FROM ai_answers")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(summary, "Entropy basics");
    }

    #[tokio::test]
    async fn answer_without_insights_gets_empty_summary() {
        let pool = test_pool().await;
        let (writer, _notices) = spawn_writer(pool.clone());

        writer
            .submit(AnswerRecord {
                user_id: None,
                question: "q".into(),
                answer: "a".into(),
                insights: AnswerInsights::default(),
            })
            .await;

        for _ in 0..50 {
            if count(&pool, "SELECT COUNT(*) FROM ai_answers").await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let summary: String = sqlx::query_scalar("SELECT summary FROM ai_answers")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(summary, "");
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM predicted_topics").await, 0);
    }

    #[tokio::test]
    async fn write_failure_surfaces_as_notice() {
        let pool = test_pool().await;
        sqlx::query("DROP TABLE ai_answers")
            .execute(&pool)
            .await
            .unwrap();

        let (writer, mut notices) = spawn_writer(pool.clone());
        writer.submit(record_with_topics()).await;

        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .expect("notice should arrive")
            .expect("channel open");
        assert!(notice.message.contains("Could not save study insights"));
    }
}
