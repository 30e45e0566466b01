//! Credential handling, isolated in its own test binary so the environment
//! mutation cannot race the other integration tests.

use axum::http::StatusCode;
use sqlx::sqlite::SqlitePoolOptions;

use exam_relay::config::{Config, DbConfig, ServerConfig, UpstreamConfig};
use exam_relay::server::{router, AppState};

#[tokio::test]
async fn missing_api_key_surfaces_as_500_at_first_use() {
    std::env::remove_var("OPENROUTER_API_KEY");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    exam_relay::migrate::run_migrations_on(&pool).await.unwrap();

    let config = Config {
        db: DbConfig {
            path: "unused.sqlite".into(),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".into(),
        },
        upstream: UpstreamConfig::default(),
    };

    let state = AppState::new(config, pool).unwrap();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let response = reqwest::Client::new()
        .post(format!("http://{}/ask-ai", addr))
        .json(&serde_json::json!({"question": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload: serde_json::Value = response.json().await.unwrap();
    assert!(payload["error"]
        .as_str()
        .unwrap()
        .contains("OPENROUTER_API_KEY"));
}
