use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an existing pool. Idempotent.
pub async fn run_migrations_on(pool: &sqlx::SqlitePool) -> Result<()> {
    // Uploaded syllabus metadata. Only identifying fields live here; the
    // relay never reads file contents.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS syllabi (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            subject TEXT,
            uploaded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Past exam paper metadata
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS past_papers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            subject TEXT,
            year INTEGER,
            uploaded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Completed answers, with the summary lifted out of the fenced block
    // (empty string when the answer carried none)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_answers (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per extracted topic
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predicted_topics (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            topic TEXT NOT NULL,
            likelihood REAL NOT NULL,
            source TEXT NOT NULL DEFAULT 'ai',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_syllabi_user_id ON syllabi(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_past_papers_user_id ON past_papers(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ai_answers_user_id ON ai_answers(user_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_predicted_topics_user_id ON predicted_topics(user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
