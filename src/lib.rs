//! # Exam Relay
//!
//! A streaming AI answer relay for exam-prep study tools.
//!
//! Exam Relay sits between a study client and a chat-completion provider:
//! it validates the question, folds in lightweight context about the user's
//! uploaded syllabi and past papers, forwards a single streamed completion
//! request, and pipes the event stream back. On the client side it decodes
//! the stream incrementally and, once finished, lifts predicted exam topics
//! and a summary out of the answer's trailing fenced block.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   POST /ask-ai   ┌─────────┐   streamed    ┌──────────┐
//! │ client │─────────────────▶│  relay   │──────────────▶│ provider │
//! │ (ask)  │◀─────────────────│ (serve)  │◀──────────────│  (chat)  │
//! └───┬────┘   passthrough    └────┬────┘   completion   └──────────┘
//!     │ decode + extract           │ metadata reads
//!     ▼                            ▼
//! ┌──────────────────────────────────────┐
//! │        SQLite (answers, topics,      │
//! │        syllabus/past-paper metadata) │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`server`] | Relay HTTP server |
//! | [`upstream`] | Chat-completion client and status classification |
//! | [`context`] | Per-user study context strings |
//! | [`stream`] | Incremental SSE delta decoding and assembly |
//! | [`extract`] | Trailing fenced-block extraction |
//! | [`insights`] | Best-effort answer/topic persistence |
//! | [`ask`] | Client flow for the `ask` command |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod config;
pub mod context;
pub mod db;
pub mod extract;
pub mod insights;
pub mod migrate;
pub mod models;
pub mod server;
pub mod stream;
pub mod upstream;
