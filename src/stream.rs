//! Incremental decoding of streamed completion responses.
//!
//! The upstream provider answers with an SSE-style body: one `data: <json>`
//! line per text delta, terminated by a literal `data: [DONE]` line. Chunks
//! arrive at arbitrary byte offsets — a chunk boundary can land inside a
//! multi-byte character or in the middle of a line — so [`DeltaDecoder`]
//! buffers bytes and only interprets complete, newline-terminated lines.
//!
//! A complete line that fails to parse is pushed back onto the front of the
//! buffer and retried after the next read, on the theory that it was
//! truncated and more bytes will complete it. The retry is bounded (see
//! [`MALFORMED_LINE_BUDGET`]) so a permanently malformed line cannot block
//! the lines behind it forever.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::{Message, Role};

/// Prefix marking a data line. A single optional space after the colon is
/// tolerated, per the SSE wire format.
const DATA_PREFIX: &str = "data:";

/// Literal token marking the logical end of the stream, independent of
/// transport-level closure.
const DONE_SENTINEL: &str = "[DONE]";

/// How many further reads a malformed head line survives before it is
/// dropped. A truncated line completes on the very next read, so anything
/// still failing after this many reads is garbage, not a split.
const MALFORMED_LINE_BUDGET: u32 = 3;

#[derive(Deserialize)]
struct StreamPayload {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Byte-fed decoder turning an event stream into text deltas.
///
/// Restartable only by constructing a fresh decoder against a fresh stream;
/// once [`DeltaDecoder::is_done`] reports true, further input is ignored.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    buf: Vec<u8>,
    done: bool,
    malformed_retries: u32,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk of bytes, returning the text deltas it completed,
    /// in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);
        self.drain_lines()
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();

        while !self.done {
            let Some(newline) = self.buf.iter().position(|&b| b == b'\n') else {
                // Partial line (possibly mid-character) stays buffered.
                break;
            };

            let mut line_bytes: Vec<u8> = self.buf.drain(..=newline).collect();
            line_bytes.pop(); // the '\n'
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }

            let Ok(line) = std::str::from_utf8(&line_bytes) else {
                // A complete line is final; invalid UTF-8 in it cannot be
                // repaired by waiting for more bytes.
                tracing::warn!("skipping non-UTF-8 stream line ({} bytes)", line_bytes.len());
                continue;
            };

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };

            let data = rest.trim();
            if data == DONE_SENTINEL {
                self.done = true;
                break;
            }

            match serde_json::from_str::<StreamPayload>(data) {
                Ok(payload) => {
                    self.malformed_retries = 0;
                    let content = payload
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content);
                    if let Some(content) = content {
                        deltas.push(content);
                    }
                }
                Err(err) => {
                    if self.malformed_retries >= MALFORMED_LINE_BUDGET {
                        tracing::warn!(error = %err, line = %data, "dropping malformed stream line");
                        self.malformed_retries = 0;
                        continue;
                    }
                    self.malformed_retries += 1;

                    // Push the line back and wait for the next read.
                    let mut restored = Vec::with_capacity(line.len() + 1 + self.buf.len());
                    restored.extend_from_slice(line.as_bytes());
                    restored.push(b'\n');
                    restored.append(&mut self.buf);
                    self.buf = restored;
                    break;
                }
            }
        }

        deltas
    }
}

/// Publisher side of the in-progress answer.
///
/// The assistant [`Message`] is an owned value living inside a watch channel;
/// every delta replaces it atomically with a grown snapshot, so any number of
/// subscribers can render progress without sharing mutable state.
pub struct AnswerProgress {
    tx: watch::Sender<Message>,
}

impl AnswerProgress {
    pub fn channel() -> (Self, watch::Receiver<Message>) {
        let (tx, rx) = watch::channel(Message::new(Role::Assistant, ""));
        (Self { tx }, rx)
    }

    fn append(&self, delta: &str) {
        self.tx.send_modify(|message| message.content.push_str(delta));
    }
}

/// Drive a byte stream through the decoder until the sentinel, stream end,
/// or cancellation, returning the assembled answer text.
///
/// The assembled text is exactly the concatenation of all deltas in arrival
/// order. Cancellation is a normal exit: the text assembled so far is
/// returned and the underlying stream is simply dropped.
pub async fn read_answer<S, B, E>(
    stream: S,
    progress: &AnswerProgress,
    cancel: &CancellationToken,
) -> anyhow::Result<String>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::pin!(stream);
    let mut decoder = DeltaDecoder::new();
    let mut full = String::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("answer stream cancelled");
                break;
            }
            next = stream.next() => {
                match next {
                    Some(Ok(chunk)) => {
                        for delta in decoder.feed(chunk.as_ref()) {
                            full.push_str(&delta);
                            progress.append(&delta);
                        }
                        if decoder.is_done() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        return Err(anyhow::Error::new(err).context("reading answer stream"));
                    }
                    None => break,
                }
            }
        }
    }

    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn reassembles_lines_split_across_chunks() {
        let wire = format!("{}{}data: [DONE]\n", delta_line("Hel"), delta_line("lo"));
        let bytes = wire.as_bytes();

        // Split at every possible byte offset, including mid-JSON.
        for split in 0..bytes.len() {
            let mut decoder = DeltaDecoder::new();
            let mut text = String::new();
            for delta in decoder.feed(&bytes[..split]) {
                text.push_str(&delta);
            }
            for delta in decoder.feed(&bytes[split..]) {
                text.push_str(&delta);
            }
            assert_eq!(text, "Hello", "split at {}", split);
            assert!(decoder.is_done(), "split at {}", split);
        }
    }

    #[test]
    fn byte_at_a_time_preserves_concatenation_order() {
        let wire = format!(
            "{}{}{}data: [DONE]\n",
            delta_line("a"),
            delta_line("β"),
            delta_line("c")
        );
        let mut decoder = DeltaDecoder::new();
        let mut text = String::new();
        for byte in wire.as_bytes() {
            for delta in decoder.feed(std::slice::from_ref(byte)) {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "aβc");
    }

    #[test]
    fn chunk_boundary_inside_multibyte_character() {
        let wire = delta_line("héllo");
        let bytes = wire.as_bytes();
        // 'é' is two bytes; split between them.
        let accent = wire.find('é').unwrap();

        let mut decoder = DeltaDecoder::new();
        let mut text = String::new();
        for delta in decoder.feed(&bytes[..accent + 1]) {
            text.push_str(&delta);
        }
        for delta in decoder.feed(&bytes[accent + 1..]) {
            text.push_str(&delta);
        }
        assert_eq!(text, "héllo");
    }

    #[test]
    fn stops_at_done_even_if_bytes_remain() {
        let wire = format!(
            "{}data: [DONE]\n{}",
            delta_line("keep"),
            delta_line("dropped")
        );
        let mut decoder = DeltaDecoder::new();
        let deltas = decoder.feed(wire.as_bytes());
        assert_eq!(deltas, vec!["keep".to_string()]);
        assert!(decoder.is_done());

        // Anything fed after the sentinel is ignored outright.
        assert!(decoder.feed(delta_line("more").as_bytes()).is_empty());
    }

    #[test]
    fn ignores_comments_blanks_and_other_fields() {
        let wire = format!(
            ": keep-alive\n\nevent: message\n{}data: [DONE]\n",
            delta_line("ok")
        );
        let mut decoder = DeltaDecoder::new();
        assert_eq!(decoder.feed(wire.as_bytes()), vec!["ok".to_string()]);
    }

    #[test]
    fn strips_carriage_returns() {
        let wire = delta_line("crlf").replace('\n', "\r\n") + "data: [DONE]\r\n";
        let mut decoder = DeltaDecoder::new();
        assert_eq!(decoder.feed(wire.as_bytes()), vec!["crlf".to_string()]);
        assert!(decoder.is_done());
    }

    #[test]
    fn empty_delta_objects_produce_no_text() {
        let wire = "data: {\"choices\":[{\"delta\":{}}]}\ndata: [DONE]\n";
        let mut decoder = DeltaDecoder::new();
        assert!(decoder.feed(wire.as_bytes()).is_empty());
        assert!(decoder.is_done());
    }

    #[test]
    fn malformed_line_is_dropped_after_budget_and_stream_recovers() {
        let mut decoder = DeltaDecoder::new();

        // A complete but permanently malformed line, with a good line behind it.
        let wire = format!("data: {{broken\n{}", delta_line("after"));
        assert!(decoder.feed(wire.as_bytes()).is_empty());

        // Each keep-alive read retries the pushed-back head line.
        assert!(decoder.feed(b": ka\n").is_empty());
        assert!(decoder.feed(b": ka\n").is_empty());

        // Budget exhausted: the garbage is dropped and the good delta flows.
        let deltas = decoder.feed(b": ka\n");
        assert_eq!(deltas, vec!["after".to_string()]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn pushed_back_line_is_not_duplicated_on_recovery() {
        // The malformed head must block later lines while it retries, and
        // yield each delta exactly once when it is finally discarded.
        let mut decoder = DeltaDecoder::new();
        decoder.feed(b"data: {bad}\n");
        decoder.feed(delta_line("one").as_bytes());
        decoder.feed(delta_line("two").as_bytes());
        let deltas = decoder.feed(b"\n");
        assert_eq!(deltas, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn read_answer_assembles_and_publishes_progress() {
        let wire = format!("{}{}data: [DONE]\n", delta_line("Hel"), delta_line("lo"));
        let (head, tail) = wire.as_bytes().split_at(17);
        let chunks: Vec<Result<Vec<u8>, Infallible>> =
            vec![Ok(head.to_vec()), Ok(tail.to_vec())];

        let (progress, rx) = AnswerProgress::channel();
        let cancel = CancellationToken::new();
        let full = read_answer(stream::iter(chunks), &progress, &cancel)
            .await
            .unwrap();

        assert_eq!(full, "Hello");
        assert_eq!(rx.borrow().content, "Hello");
        assert_eq!(rx.borrow().role, Role::Assistant);
    }

    #[tokio::test]
    async fn read_answer_stops_on_cancellation_with_partial_text() {
        let first = delta_line("par");
        let chunks: Vec<Result<Vec<u8>, Infallible>> = vec![Ok(first.into_bytes())];
        // The stream never ends on its own.
        let endless = stream::iter(chunks).chain(stream::pending());

        let (progress, mut rx) = AnswerProgress::channel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone();

        let handle =
            tokio::spawn(async move { read_answer(endless, &progress, &cancel).await });

        // Wait until the first delta is visible, then cancel.
        while rx.borrow().content != "par" {
            rx.changed().await.unwrap();
        }
        guard.cancel();

        let partial = handle.await.unwrap().unwrap();
        assert_eq!(partial, "par");
    }

    #[tokio::test]
    async fn read_answer_without_sentinel_ends_at_stream_close() {
        let chunks: Vec<Result<Vec<u8>, Infallible>> =
            vec![Ok(delta_line("just this").into_bytes())];
        let (progress, _rx) = AnswerProgress::channel();
        let cancel = CancellationToken::new();
        let full = read_answer(stream::iter(chunks), &progress, &cancel)
            .await
            .unwrap();
        assert_eq!(full, "just this");
    }
}
