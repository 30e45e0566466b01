//! `exr ask` — the client side of the relay.
//!
//! Posts a question to a running relay, renders the answer progressively as
//! deltas arrive, then runs the trailing-structure extractor over the
//! finished text and hands the results to the insight writer. Persistence
//! failures are printed as warnings after the answer; they never undo it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::extract;
use crate::insights::{self, AnswerRecord};
use crate::models::AskRequest;
use crate::stream::{self, AnswerProgress};

/// Appended to the transcript whenever a question cannot be answered, so the
/// conversation never just hangs.
const APOLOGY: &str =
    "Sorry, I couldn't get an answer for that question. Please try again in a moment.";

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// CLI entry point — asks one question and prints the streamed answer.
pub async fn run_ask(config: &Config, question: &str, user_id: Option<String>) -> Result<()> {
    if question.trim().is_empty() {
        eprintln!("Error: question must not be empty");
        std::process::exit(1);
    }

    println!("You: {}", question);

    let request = AskRequest {
        question: question.to_string(),
        user_id: user_id.clone(),
    };

    let client = reqwest::Client::new();
    let url = format!("http://{}/ask-ai", config.server.bind);
    let response = match client.post(&url).json(&request).send().await {
        Ok(response) => response,
        Err(err) => {
            eprintln!("Error: relay unreachable at {}: {}", url, err);
            println!("AI: {}", APOLOGY);
            return Ok(());
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("relay returned HTTP {}", status));
        eprintln!("Error: {}", message);
        println!("AI: {}", APOLOGY);
        return Ok(());
    }

    // Ctrl-C stops the decode loop; the partial answer stays on screen.
    let cancel = CancellationToken::new();
    let cancel_on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_interrupt.cancel();
        }
    });

    print!("AI: ");
    std::io::stdout().flush().ok();

    // Subscriber that renders each published snapshot's new suffix.
    let (progress, mut updates) = AnswerProgress::channel();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        while updates.changed().await.is_ok() {
            let content = updates.borrow().content.clone();
            if content.len() > printed {
                print!("{}", &content[printed..]);
                std::io::stdout().flush().ok();
                printed = content.len();
            }
        }
    });

    let answer = stream::read_answer(response.bytes_stream(), &progress, &cancel).await;
    drop(progress);
    printer.await.ok();
    println!();

    if cancel.is_cancelled() {
        // Interrupted mid-stream: leave the partial answer on screen, but
        // only completed answers are mined for insights and persisted.
        return Ok(());
    }

    let answer = match answer {
        Ok(answer) if !answer.is_empty() => answer,
        Ok(_) => {
            println!("AI: {}", APOLOGY);
            return Ok(());
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            println!("AI: {}", APOLOGY);
            return Ok(());
        }
    };

    // Post-completion enrichment: extract insights, persist both records.
    let insights_found = extract::extract_insights(&answer);
    if !insights_found.topics.is_empty() {
        println!(
            "(predicted {} exam topic{})",
            insights_found.topics.len(),
            if insights_found.topics.len() == 1 { "" } else { "s" }
        );
    }

    let pool = db::connect(config).await.context("opening study database")?;
    let (writer, mut notices) = insights::spawn_writer(pool.clone());
    writer
        .submit(AnswerRecord {
            user_id,
            question: question.to_string(),
            answer,
            insights: insights_found,
        })
        .await;
    drop(writer);

    // The notice channel closes once the writer task has drained its queue.
    while let Some(notice) = notices.recv().await {
        eprintln!("Warning: {}", notice.message);
    }
    pool.close().await;

    Ok(())
}
