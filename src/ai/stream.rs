//! Streaming wire decoding shared by the HTTP providers.
//!
//! Both NDJSON (Ollama) and server-sent events (Claude) arrive as lines.
//! Chunks are split on newlines at the byte level so multi-byte characters
//! cut across chunks survive.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use serde_json::Value;

use super::FragmentStream;

/// One decoded wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFragment {
    Text(String),
    Done,
    Skip,
}

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).to_string())
    }
}

/// Decode one line of a streamed response.
///
/// Accepts an optional `data:` prefix, the `[DONE]` sentinel, and text in
/// any of the common response shapes. Lines that are not JSON are passed
/// through as text.
pub fn decode_fragment(line: &str) -> WireFragment {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
        return WireFragment::Skip;
    }

    let payload = line.strip_prefix("data:").map_or(line, str::trim);
    if payload == "[DONE]" {
        return WireFragment::Done;
    }

    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return WireFragment::Text(format!("{payload}\n"));
    };

    if let Some(text) = text_of(&value).filter(|t| !t.is_empty()) {
        return WireFragment::Text(text.to_string());
    }

    let done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
    let stopped = value.get("type").and_then(Value::as_str) == Some("message_stop");
    if done || stopped {
        WireFragment::Done
    } else {
        WireFragment::Skip
    }
}

fn text_of(value: &Value) -> Option<&str> {
    value
        .pointer("/delta/text")
        .or_else(|| value.pointer("/message/content"))
        .or_else(|| value.pointer("/choices/0/delta/content"))
        .or_else(|| value.get("response"))
        .or_else(|| value.get("text"))
        .or_else(|| value.get("content"))
        .and_then(Value::as_str)
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    lines: LineBuffer,
    ready: VecDeque<String>,
    finished: bool,
}

/// Turn a byte stream into a stream of text fragments.
pub fn fragments<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    let state =
        DecodeState { bytes: Box::pin(bytes), lines: LineBuffer::new(), ready: VecDeque::new(), finished: false };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.ready.pop_front() {
                return Some((Ok(text), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in st.lines.push(chunk.as_ref()) {
                        match decode_fragment(&line) {
                            WireFragment::Text(text) => st.ready.push_back(text),
                            WireFragment::Done => {
                                st.finished = true;
                                break;
                            }
                            WireFragment::Skip => {}
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    if let Some(WireFragment::Text(text)) = st.lines.finish().map(|l| decode_fragment(&l)) {
                        st.ready.push_back(text);
                    }
                }
            }
        }
    })
    .boxed()
}
