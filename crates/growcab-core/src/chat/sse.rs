//! Incremental decoder for the chat gateway's Server-Sent Events body.
//!
//! The gateway streams OpenAI-style completion chunks:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//! Network reads split this text at arbitrary byte offsets, including inside
//! multi-byte characters and inside a `data:` line.

use serde::Deserialize;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Read cycles an unparseable line may be pushed back before it is dropped.
pub const MAX_LINE_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A fragment of assistant text.
    Delta(String),
    /// The `[DONE]` sentinel was seen.
    Done,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Turns raw body chunks into [`SseEvent`]s.
pub struct SseDecoder {
    pending_bytes: Vec<u8>,
    buffer: String,
    retries: u32,
    max_retries: u32,
    done: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_max_retries(MAX_LINE_RETRIES)
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            pending_bytes: Vec::new(),
            buffer: String::new(),
            retries: 0,
            max_retries,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one body chunk and return the events it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.decode_utf8(chunk);
        self.drain_lines(false)
    }

    /// Flush at end of body. Any unterminated last line is processed too, and lines
    /// that still do not parse are dropped.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        if !self.pending_bytes.is_empty() {
            self.pending_bytes.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        if !self.buffer.is_empty() && !self.buffer.ends_with('\n') {
            self.buffer.push('\n');
        }
        self.drain_lines(true)
    }

    /// Append bytes to the text buffer, holding back an incomplete trailing
    /// character until the next chunk completes it.
    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);
        let input = std::mem::take(&mut self.pending_bytes);
        let mut rest: &[u8] = &input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // Checked by from_utf8 above
                    self.buffer.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self, final_pass: bool) -> Vec<SseEvent> {
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }

            if line.starts_with(':') || line.trim().is_empty() {
                continue;
            }
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();

            if payload == DONE_SENTINEL {
                debug!("stream sentinel received");
                self.done = true;
                self.buffer.clear();
                events.push(SseEvent::Done);
                break;
            }

            match serde_json::from_str::<CompletionChunk>(payload) {
                Ok(chunk) => {
                    self.retries = 0;
                    let content = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|content| !content.is_empty());
                    if let Some(content) = content {
                        events.push(SseEvent::Delta(content));
                    }
                }
                Err(e) if final_pass || self.retries >= self.max_retries => {
                    warn!(error = %e, line = %line, "dropping unparseable stream line");
                    self.retries = 0;
                }
                Err(_) => {
                    // Possibly incomplete: retry once more data has arrived
                    self.retries += 1;
                    line.push('\n');
                    self.buffer.insert_str(0, &line);
                    break;
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn text_of(events: &[SseEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                SseEvent::Delta(text) => Some(text.as_str()),
                SseEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn test_deltas_then_done() {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(delta_line("Hel").as_bytes());
        events.extend(decoder.feed(delta_line("lo").as_bytes()));
        events.extend(decoder.feed(b"data: [DONE]\n"));

        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hel".to_string()),
                SseEvent::Delta("lo".to_string()),
                SseEvent::Done,
            ]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn test_line_split_across_reads() {
        let line = delta_line("tomatoes");
        let (head, tail) = line.split_at(20);
        let mut decoder = SseDecoder::new();

        assert!(decoder.feed(head.as_bytes()).is_empty());
        assert_eq!(decoder.feed(tail.as_bytes()), vec![SseEvent::Delta("tomatoes".to_string())]);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let line = delta_line("罗勒 🌱");
        let bytes = line.as_bytes();
        let split = line.find('🌱').unwrap() + 2;

        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(&bytes[..split]);
        events.extend(decoder.feed(&bytes[split..]));
        assert_eq!(text_of(&events), "罗勒 🌱");
    }

    #[test]
    fn test_byte_at_a_time() {
        let body = format!("{}\n{}\ndata: [DONE]\n", delta_line("Sawi "), delta_line("Cina 小白菜"));
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for byte in body.as_bytes() {
            events.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(text_of(&events), "Sawi Cina 小白菜");
        assert_eq!(events.last(), Some(&SseEvent::Done));
    }

    #[test]
    fn test_crlf_comments_and_other_fields_are_skipped() {
        let body = format!(
            ": keep-alive\r\nevent: message\r\nid: 7\r\n\r\n{}",
            delta_line("ok").replace('\n', "\r\n")
        );
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(body.as_bytes()), vec![SseEvent::Delta("ok".to_string())]);
    }

    #[test]
    fn test_role_only_and_empty_deltas_emit_nothing() {
        let mut decoder = SseDecoder::new();
        let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
                    data: {\"choices\":[]}\n";
        assert!(decoder.feed(body.as_bytes()).is_empty());
    }

    #[test]
    fn test_nothing_after_done() {
        let mut decoder = SseDecoder::new();
        let body = format!("data: [DONE]\n{}", delta_line("late"));
        assert_eq!(decoder.feed(body.as_bytes()), vec![SseEvent::Done]);
        assert!(decoder.feed(delta_line("later").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_malformed_line_is_pushed_back_then_dropped() {
        let mut decoder = SseDecoder::with_max_retries(2);

        // Pushed back: the valid line behind it waits
        assert!(decoder.feed(b"data: {\"choices\": [\n").is_empty());
        assert!(decoder.feed(delta_line("a").as_bytes()).is_empty());
        // Retry budget exhausted: dropped and the queue drains
        let events = decoder.feed(delta_line("b").as_bytes());
        assert_eq!(text_of(&events), "ab");
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let line = delta_line("end");
        assert!(decoder.feed(line.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Delta("end".to_string())]);
    }

    #[test]
    fn test_finish_drops_pushed_back_garbage() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {broken\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = SseDecoder::new();
        let mut body = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        body.push(0xFF);
        body.extend_from_slice(b"b\"}}]}\n");
        assert_eq!(decoder.feed(&body), vec![SseEvent::Delta("a\u{FFFD}b".to_string())]);
    }
}
