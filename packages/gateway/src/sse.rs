//! Decoder for chat-completions server-sent events

use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Content delta carried by one `data:` payload
///
/// Returns `None` for payloads that do not decode or carry no text.
pub fn parse_delta(payload: &str) -> Option<String> {
    let chunk: ChunkPayload = serde_json::from_str(payload).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}

/// Incremental line decoder
///
/// Bytes arrive in arbitrary slices; lines (and UTF-8 sequences) may be split
/// across them, so undecoded bytes are held until their newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` was seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes, returning every content delta completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut deltas = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(delta) = self.line(line.trim_end_matches(&['\r', '\n'][..])) {
                deltas.push(delta);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        deltas
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<String> {
        if self.done || self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.line(line.trim_end_matches('\r'))
    }

    fn line(&mut self, line: &str) -> Option<String> {
        let payload = line.strip_prefix(DATA_PREFIX)?;
        if payload.trim() == DONE_MARKER {
            self.done = true;
            return None;
        }
        let delta = parse_delta(payload);
        if delta.is_none() {
            tracing::trace!(payload = payload, "Skipping undecodable event");
        }
        delta
    }
}
