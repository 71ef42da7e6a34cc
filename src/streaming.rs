//! Server-sent events framing for streamed chat completions.
//!
//! A resolved completion is replayed word by word as `chat.completion.chunk` events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null,..}],..}
//! data: {"choices":[{"delta":{"content":" world"},"finish_reason":null,..}],..}
//! data: {"choices":[{"delta":{},"finish_reason":"stop",..}],..}
//! data: {"usage":{..},..}
//! data: [DONE]
//! ```
//!
//! [`ChunkEmitter`] is the synchronous state machine; [`completion_event_stream`] wraps it
//! in a lazy byte stream that awaits the completion after the response headers are out,
//! paces the deltas, and aborts the transport if the completion cannot be produced.

use bytes::Bytes;
use futures_util::stream::Stream;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use crate::completion::{CompletionResult, ResponseMeta};
use crate::error::ApiError;
use crate::models::chat::{ChatCompletionChunk, ChatDelta, ChatStreamChoice, ChatUsage};

pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Started,
    EmittingDeltas,
    FinalDeltaSent,
    UsageSent,
    Terminated,
    Aborted,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Terminated | StreamState::Aborted)
    }
}

/// One SSE event of a completion stream.
#[derive(Debug, Clone)]
pub enum SseEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

impl SseEvent {
    /// Payload carried after `data: `.
    pub fn data(&self) -> serde_json::Result<String> {
        match self {
            SseEvent::Chunk(chunk) => serde_json::to_string(chunk),
            SseEvent::Done => Ok(DONE_MARKER.to_string()),
        }
    }

    /// Wire frame: `data: <payload>\n\n`.
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        Ok(Bytes::from(format!("data: {}\n\n", self.data()?)))
    }

    pub fn is_content_delta(&self) -> bool {
        match self {
            SseEvent::Chunk(chunk) => chunk
                .choices
                .as_ref()
                .and_then(|c| c.first())
                .is_some_and(|c| c.delta.content.is_some()),
            SseEvent::Done => false,
        }
    }
}

/// Split content into stream fragments.
///
/// Words are separated by single spaces; every word after the first carries its leading
/// space, so concatenating the fragments yields `content` exactly. Newlines stay inside
/// their word. An empty leading fragment is dropped.
pub fn split_fragments(content: &str) -> Vec<String> {
    content
        .split(' ')
        .enumerate()
        .filter_map(|(i, word)| match i {
            0 if word.is_empty() => None,
            0 => Some(word.to_string()),
            _ => Some(format!(" {word}")),
        })
        .collect()
}

/// Drives one completion through the SSE event sequence.
#[derive(Debug)]
pub struct ChunkEmitter {
    meta: ResponseMeta,
    id: String,
    fragments: VecDeque<String>,
    usage: ChatUsage,
    state: StreamState,
}

impl ChunkEmitter {
    pub fn new(meta: ResponseMeta, result: CompletionResult) -> Self {
        Self {
            id: meta.completion_id(),
            fragments: split_fragments(&result.content).into(),
            usage: result.usage,
            meta,
            state: StreamState::Started,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Stop emitting; no further events are produced.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.state = StreamState::Aborted;
        }
    }

    fn chunk(&self, choices: Option<Vec<ChatStreamChoice>>, usage: Option<ChatUsage>) -> SseEvent {
        SseEvent::Chunk(ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices,
            usage,
        })
    }

    fn choice(delta: ChatDelta, finish_reason: Option<&str>) -> Option<Vec<ChatStreamChoice>> {
        Some(vec![ChatStreamChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(str::to_string),
        }])
    }
}

impl Iterator for ChunkEmitter {
    type Item = SseEvent;

    fn next(&mut self) -> Option<SseEvent> {
        match self.state {
            StreamState::Started | StreamState::EmittingDeltas => {
                if let Some(fragment) = self.fragments.pop_front() {
                    self.state = StreamState::EmittingDeltas;
                    let delta = ChatDelta {
                        content: Some(fragment),
                    };
                    Some(self.chunk(Self::choice(delta, None), None))
                } else {
                    self.state = StreamState::FinalDeltaSent;
                    Some(self.chunk(Self::choice(ChatDelta::default(), Some("stop")), None))
                }
            }
            StreamState::FinalDeltaSent => {
                self.state = StreamState::UsageSent;
                Some(self.chunk(None, Some(self.usage)))
            }
            StreamState::UsageSent => {
                self.state = StreamState::Terminated;
                Some(SseEvent::Done)
            }
            StreamState::Terminated | StreamState::Aborted => None,
        }
    }
}

/// Lazy SSE body for one streamed completion.
///
/// `completion` is awaited only once the stream is first polled, i.e. after the response
/// head is sent. If it fails, the stream yields a single error and ends without `[DONE]`,
/// which makes the transport abort the response. Dropping the stream (client disconnect)
/// drops the pending completion and any pacing timer.
pub fn completion_event_stream<F>(
    meta: ResponseMeta,
    completion: F,
    pacing: Duration,
) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    F: Future<Output = Result<CompletionResult, ApiError>>,
{
    async_stream::stream! {
        let result = match completion.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(request_id = %meta.request_id, "Aborting stream: {}", err);
                yield Err(std::io::Error::other(err.to_string()));
                return;
            }
        };

        let request_id = meta.request_id.clone();
        let mut emitter = ChunkEmitter::new(meta, result);
        let mut deltas_sent = 0usize;
        while let Some(event) = emitter.next() {
            let is_delta = event.is_content_delta();
            if is_delta && deltas_sent > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            match event.to_bytes() {
                Ok(frame) => yield Ok(frame),
                Err(err) => {
                    emitter.abort();
                    tracing::error!(request_id = %request_id, "Aborting stream: {}", err);
                    yield Err(std::io::Error::other(err.to_string()));
                    return;
                }
            }
            if is_delta {
                deltas_sent += 1;
            }
        }
        tracing::debug!(request_id = %request_id, deltas = deltas_sent, "Stream terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Raises its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn meta() -> ResponseMeta {
        ResponseMeta {
            request_id: "req1".into(),
            created: 1_700_000_000,
            model: "symbi-intel-analyst-001".into(),
        }
    }

    fn result(content: &str) -> CompletionResult {
        CompletionResult {
            content: content.into(),
            usage: ChatUsage::new(7, 3),
        }
    }

    fn payloads(emitter: ChunkEmitter) -> Vec<String> {
        emitter.map(|e| e.data().unwrap()).collect()
    }

    #[test]
    fn fragments_reassemble_exactly() {
        for content in [
            "Hello world",
            "one",
            "double  space",
            " leading",
            "trailing ",
            "line one\n\nline two",
            "",
        ] {
            let joined: String = split_fragments(content).concat();
            assert_eq!(joined, content);
        }
    }

    #[test]
    fn fragments_carry_leading_space_after_first() {
        assert_eq!(split_fragments("a b c"), vec!["a", " b", " c"]);
    }

    #[test]
    fn emits_deltas_then_stop_usage_and_done() {
        let events = payloads(ChunkEmitter::new(meta(), result("Hello brave world")));
        assert_eq!(events.len(), 6);

        let parsed: Vec<Value> = events[..5]
            .iter()
            .map(|e| serde_json::from_str(e).unwrap())
            .collect();
        assert_eq!(parsed[0]["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(parsed[1]["choices"][0]["delta"]["content"], " brave");
        assert_eq!(parsed[2]["choices"][0]["delta"]["content"], " world");
        for chunk in &parsed[..3] {
            assert_eq!(chunk["object"], "chat.completion.chunk");
            assert_eq!(chunk["id"], "chatcmpl-req1");
            assert!(chunk["choices"][0]["finish_reason"].is_null());
        }

        assert_eq!(parsed[3]["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(parsed[3]["choices"][0]["finish_reason"], "stop");

        assert!(parsed[4].get("choices").is_none());
        assert_eq!(parsed[4]["usage"]["total_tokens"], 10);

        assert_eq!(events[5], "[DONE]");
    }

    #[test]
    fn single_word_yields_one_delta() {
        let mut emitter = ChunkEmitter::new(meta(), result("Acknowledged."));
        assert!(emitter.next().unwrap().is_content_delta());
        assert_eq!(emitter.state(), StreamState::EmittingDeltas);
        assert!(!emitter.next().unwrap().is_content_delta());
        assert_eq!(emitter.state(), StreamState::FinalDeltaSent);
        emitter.next().unwrap();
        assert_eq!(emitter.state(), StreamState::UsageSent);
        assert!(matches!(emitter.next(), Some(SseEvent::Done)));
        assert_eq!(emitter.state(), StreamState::Terminated);
        assert!(emitter.next().is_none());
    }

    #[test]
    fn aborted_emitter_stops() {
        let mut emitter = ChunkEmitter::new(meta(), result("a b"));
        emitter.next();
        emitter.abort();
        assert_eq!(emitter.state(), StreamState::Aborted);
        assert!(emitter.next().is_none());
    }

    #[test]
    fn frames_use_sse_data_prefix() {
        let frame = SseEvent::Done.to_bytes().unwrap();
        assert_eq!(&frame[..], b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn stream_ends_with_done_marker() {
        let stream = completion_event_stream(
            meta(),
            async { Ok(result("streamed reply here")) },
            Duration::ZERO,
        );
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 6);
        let last = frames.last().unwrap().as_ref().unwrap();
        assert_eq!(&last[..], b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn failed_completion_aborts_without_done() {
        let stream = completion_event_stream(
            meta(),
            async { Err(ApiError::Internal("boom".into())) },
            Duration::ZERO,
        );
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_err());
    }

    #[tokio::test]
    async fn pacing_does_not_change_output() {
        let paced: Vec<_> = completion_event_stream(
            meta(),
            async { Ok(result("a b c")) },
            Duration::from_millis(1),
        )
        .collect()
        .await;
        let text: String = paced
            .into_iter()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("data: [DONE]\n\n"));
        assert_eq!(text.matches("\n\n").count(), 6);
    }

    #[tokio::test]
    async fn disconnect_while_backend_pending_drops_completion() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let mut stream = Box::pin(completion_event_stream(
            meta(),
            async move {
                let _flag = flag;
                std::future::pending::<()>().await;
                Ok(result("never sent"))
            },
            Duration::ZERO,
        ));

        let waited = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
        assert!(waited.is_err(), "no frame before the backend answers");
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn disconnect_during_pacing_stops_emission() {
        let mut stream = Box::pin(completion_event_stream(
            meta(),
            async { Ok(result("first second third")) },
            Duration::from_secs(3600),
        ));

        let first = stream.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&first).unwrap().contains("\"first\""));

        let waited = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
        assert!(waited.is_err(), "second delta waits on the pacing timer");

        // Dropping releases the sleeping timer instead of waiting it out.
        drop(stream);
    }

    #[tokio::test]
    async fn stream_dropped_before_polling_never_runs_completion() {
        let started = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let started_in = started.clone();
        let stream = completion_event_stream(
            meta(),
            async move {
                let _flag = flag;
                started_in.store(true, Ordering::SeqCst);
                Ok(result("unused"))
            },
            Duration::ZERO,
        );

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!started.load(Ordering::SeqCst));
    }
}
