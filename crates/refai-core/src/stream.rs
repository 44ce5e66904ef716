//! Reassembly of a chat-completions SSE stream into assistant text
//!
//! Bytes arrive in arbitrary chunks. They are decoded incrementally, split into
//! lines, and every `data: ` frame carrying a `choices[0].delta.content` string
//! is appended to the reply. A frame whose JSON does not parse is pushed back
//! and retried once more bytes have arrived, so a payload split across two
//! reads is recovered rather than dropped.
//!
//! The consumer never touches a conversation directly: it returns
//! [`MessageUpdate`]s for the caller to apply.

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::state::{Conversation, MessageUpdate};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Classification of one SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Blank line, comment, or a field other than `data`
    Skip,
    /// The end-of-stream sentinel
    Done,
    /// Parsed frame carrying a non-empty text delta
    Delta(String),
    /// Parsed frame without any text (role-only deltas, usage frames)
    Empty,
    /// `data:` payload that is not valid JSON
    Malformed,
}

/// Classify a single line (without its trailing newline).
pub fn parse_line(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() || line.starts_with(':') {
        return Frame::Skip;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Skip;
    };

    let json_str = payload.trim();
    if json_str == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<Value>(json_str) {
        Ok(value) => match value.pointer("/choices/0/delta/content").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Frame::Delta(text.to_string()),
            _ => Frame::Empty,
        },
        Err(_) => Frame::Malformed,
    }
}

/// Incremental UTF-8 decoder that holds back sequences split across chunks.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush an incomplete trailing sequence.
    fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// State of one streamed assistant reply
#[derive(Debug, Default)]
pub struct StreamConsumer {
    decoder: Utf8Decoder,
    text_buffer: String,
    assistant_content: String,
    has_added_assistant: bool,
    done: bool,
    dropped_frames: usize,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far.
    pub fn assistant_content(&self) -> &str {
        &self.assistant_content
    }

    pub fn into_content(self) -> String {
        self.assistant_content
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Frames still unparseable when the stream ended.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// Consume one chunk of the response body.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<MessageUpdate> {
        let decoded = self.decoder.decode(chunk);
        self.text_buffer.push_str(&decoded);

        let mut updates = Vec::new();
        if self.done {
            // Keep draining, but nothing after the sentinel counts
            self.text_buffer.clear();
            return updates;
        }

        while let Some(newline) = self.text_buffer.find('\n') {
            let line: String = self.text_buffer.drain(..=newline).collect();
            let line = line.trim_end_matches('\n');
            let line = line.strip_suffix('\r').unwrap_or(line);

            match parse_line(line) {
                Frame::Skip | Frame::Empty => {}
                Frame::Done => {
                    self.done = true;
                    self.text_buffer.clear();
                    break;
                }
                Frame::Delta(text) => updates.push(self.push_delta(&text)),
                Frame::Malformed => {
                    // Probably cut mid-payload; retry when more bytes arrive
                    debug!("Requeueing incomplete SSE frame ({} bytes)", line.len());
                    self.text_buffer.insert(0, '\n');
                    self.text_buffer.insert_str(0, line);
                    break;
                }
            }
        }

        updates
    }

    /// Process whatever is left once the body has ended.
    ///
    /// The residue may lack a trailing newline. A frame that still does not
    /// parse cannot be completed anymore and is dropped.
    pub fn finish(&mut self) -> Vec<MessageUpdate> {
        let tail = self.decoder.finish();
        self.text_buffer.push_str(&tail);
        let residue = std::mem::take(&mut self.text_buffer);

        let mut updates = Vec::new();
        if self.done || residue.trim().is_empty() {
            return updates;
        }

        for line in residue.split('\n') {
            match parse_line(line) {
                Frame::Skip | Frame::Empty => {}
                Frame::Done => {
                    self.done = true;
                    break;
                }
                Frame::Delta(text) => updates.push(self.push_delta(&text)),
                Frame::Malformed => {
                    self.dropped_frames += 1;
                    warn!(
                        "Dropping SSE frame left unterminated at stream end ({} bytes)",
                        line.len()
                    );
                }
            }
        }

        updates
    }

    fn push_delta(&mut self, text: &str) -> MessageUpdate {
        self.assistant_content.push_str(text);
        if self.has_added_assistant {
            MessageUpdate::Replaced(self.assistant_content.clone())
        } else {
            self.has_added_assistant = true;
            MessageUpdate::Started(self.assistant_content.clone())
        }
    }
}

/// Run a whole sequence of chunks through a fresh consumer, applying every
/// update to `conversation`. Returns the final assistant text.
pub fn consume<I, B>(chunks: I, conversation: &mut Conversation) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut consumer = StreamConsumer::new();
    for chunk in chunks {
        for update in consumer.feed(chunk.as_ref()) {
            conversation.apply(update);
        }
    }
    for update in consumer.finish() {
        conversation.apply(update);
    }
    consumer.into_content()
}

/// Async counterpart of [`consume`] for a fallible byte stream such as
/// `reqwest::Response::bytes_stream()`.
///
/// Updates are handed to `on_update` as they are produced. A read error ends
/// the turn; updates already emitted stay emitted.
pub async fn consume_stream<S, B, E, F>(stream: S, mut on_update: F) -> Result<String, E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    F: FnMut(MessageUpdate),
{
    futures_util::pin_mut!(stream);
    let mut consumer = StreamConsumer::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for update in consumer.feed(chunk.as_ref()) {
            on_update(update);
        }
    }
    for update in consumer.finish() {
        on_update(update);
    }
    Ok(consumer.into_content())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatRole;

    fn frame(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    fn replay(chunks: &[&[u8]]) -> (String, Conversation) {
        let mut conversation = Conversation::new();
        let content = consume(chunks.iter().copied(), &mut conversation);
        (content, conversation)
    }

    fn sample_stream() -> String {
        let mut body = String::new();
        body.push_str(": keep-alive\n\n");
        body.push_str("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
        for text in ["According to ", "Article 25, ", "a player who ", "moves illegally ", "travels. 🏀"] {
            body.push_str(&frame(text));
            body.push('\n');
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn test_traveling_split_across_reads() {
        let (content, conversation) = replay(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Trav\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"eling\"}}]}\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(content, "Traveling");
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last().unwrap().role, ChatRole::Assistant);
        assert_eq!(conversation.last().unwrap().content, "Traveling");
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let body = sample_stream();
        let bytes = body.as_bytes();
        let (whole, _) = replay(&[bytes]);
        assert_eq!(whole, "According to Article 25, a player who moves illegally travels. 🏀");

        // Every single split point, including inside the multi-byte emoji
        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            let (content, _) = replay(&[head, tail]);
            assert_eq!(content, whole, "split at byte {}", split);
        }

        // Byte-at-a-time delivery
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let (content, conversation) = replay(&singles);
        assert_eq!(content, whole);
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_split_payload_is_recovered() {
        let line = frame("Goaltending");
        let (head, tail) = line.split_at(20);

        let mut consumer = StreamConsumer::new();
        // The head has no newline yet, so nothing is attempted
        assert!(consumer.feed(head.as_bytes()).is_empty());
        let updates = consumer.feed(tail.as_bytes());
        assert_eq!(updates, vec![MessageUpdate::Started("Goaltending".to_string())]);
    }

    #[test]
    fn test_malformed_line_is_requeued_until_more_data() {
        let mut consumer = StreamConsumer::new();
        // A newline inside the payload makes the first half look like a complete line
        let updates = consumer.feed(b"data: {\"choices\":[{\"delta\":\n");
        assert!(updates.is_empty());
        let updates = consumer.feed(b"{\"content\":\"x\"}}]}\n");
        // The first half is retried and still blocks the buffer
        assert!(updates.is_empty());
        // At the end it is dropped; the second half is not a data line
        assert!(consumer.finish().is_empty());
        assert_eq!(consumer.dropped_frames(), 1);
    }

    #[test]
    fn test_done_halts_delta_application() {
        let mut body = frame("Foul");
        body.push_str("data: [DONE]\n");
        body.push_str(&frame(" ignored"));

        let (content, _) = replay(&[body.as_bytes()]);
        assert_eq!(content, "Foul");

        // Same when the trailing frame arrives in a later chunk
        let (content, _) = replay(&[frame("Foul").as_bytes(), b"data: [DONE]\n", frame(" ignored").as_bytes()]);
        assert_eq!(content, "Foul");
    }

    #[test]
    fn test_done_in_final_residue() {
        // The broken first line blocks the buffer, so everything below it is
        // only looked at in the final pass
        let body = format!("data: {{broken\n{}data: [DONE]\n{}", frame("A"), frame("B"));
        let mut consumer = StreamConsumer::new();
        assert!(consumer.feed(body.as_bytes()).is_empty());

        let updates = consumer.finish();
        assert_eq!(updates, vec![MessageUpdate::Started("A".to_string())]);
        assert!(consumer.is_done());
        assert_eq!(consumer.dropped_frames(), 1);
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let body = format!(
            ":comment\n\nevent: message\nid: 7\ndata:{}\n   \n{}",
            "{\"choices\":[{\"delta\":{\"content\":\"no space\"}}]}",
            frame("kept")
        );
        let (content, _) = replay(&[body.as_bytes()]);
        assert_eq!(content, "kept");
    }

    #[test]
    fn test_crlf_lines() {
        let body = frame("Shot clock").replace('\n', "\r\n") + "data: [DONE]\r\n";
        let (content, _) = replay(&[body.as_bytes()]);
        assert_eq!(content, "Shot clock");
    }

    #[test]
    fn test_residue_without_trailing_newline() {
        let body = frame("Backcourt");
        let (content, conversation) = replay(&[body.trim_end().as_bytes()]);
        assert_eq!(content, "Backcourt");
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_truncated_frame_at_end_is_dropped() {
        let body = frame("Timeout");
        let truncated = &body.as_bytes()[..body.len() - 6];
        let mut consumer = StreamConsumer::new();
        assert!(consumer.feed(truncated).is_empty());
        assert!(consumer.finish().is_empty());
        assert_eq!(consumer.assistant_content(), "");
        assert_eq!(consumer.dropped_frames(), 1);
    }

    #[test]
    fn test_empty_and_missing_content_add_no_message() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
                    data: {\"choices\":[]}\n\
                    data: {\"choices\":\"weird\"}\n\
                    data: [DONE]\n";
        let (content, conversation) = replay(&[body.as_bytes()]);
        assert_eq!(content, "");
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_updates_start_once_then_replace() {
        let mut consumer = StreamConsumer::new();
        let body = format!("{}{}{}", frame("a"), frame("b"), frame("c"));
        let updates = consumer.feed(body.as_bytes());
        assert_eq!(
            updates,
            vec![
                MessageUpdate::Started("a".to_string()),
                MessageUpdate::Replaced("ab".to_string()),
                MessageUpdate::Replaced("abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(""), Frame::Skip);
        assert_eq!(parse_line(": ping"), Frame::Skip);
        assert_eq!(parse_line("event: done"), Frame::Skip);
        assert_eq!(parse_line("data: [DONE]"), Frame::Done);
        assert_eq!(parse_line("data:  [DONE]  \r"), Frame::Done);
        assert_eq!(parse_line("data: {\"choices\":"), Frame::Malformed);
        assert_eq!(parse_line("data: {}"), Frame::Empty);
    }

    #[test]
    fn test_invalid_utf8_becomes_replacement() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        // First two bytes of a three-byte sequence are held back
        assert_eq!(decoder.decode(&[0xE2, 0x82]), "");
        assert_eq!(decoder.decode(&[0xAC]), "€");
        assert_eq!(decoder.decode(&[0xE2]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_consume_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Trav\"}}]}\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"eling\"}}]}\n".to_vec()),
            Ok(b"data: [DONE]\n".to_vec()),
        ];
        let mut conversation = Conversation::new();
        let content = consume_stream(futures_util::stream::iter(chunks), |u| conversation.apply(u))
            .await
            .unwrap();
        assert_eq!(content, "Traveling");
        assert_eq!(conversation.last().unwrap().content, "Traveling");
    }

    #[tokio::test]
    async fn test_consume_stream_read_error() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(frame("partial").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut updates = Vec::new();
        let result = consume_stream(futures_util::stream::iter(chunks), |u| updates.push(u)).await;
        assert!(result.is_err());
        assert_eq!(updates, vec![MessageUpdate::Started("partial".to_string())]);
    }
}
