//! Server-Sent Events (SSE) encoding and decoding.
//!
//! Pure, no-I/O SSE implementation shared by the Streamable HTTP and legacy
//! HTTP+SSE transports. Encoding and parsing never touch a socket so they can
//! be unit tested in isolation from the axum handlers that drive them.
//!
//! ## SSE Format
//!
//! ```text
//! id: event-123
//! event: message
//! data: {"jsonrpc": "2.0", ...}
//!
//! ```
//!
//! Messages are terminated by a blank line.

/// A Server-Sent Event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event ID for `Last-Event-ID` resumption.
    pub id: Option<String>,
    /// Event type. The legacy transport's bootstrap frame uses `"endpoint"`;
    /// everything else uses `"message"` or is left unset (defaults to
    /// `"message"` per the SSE spec).
    pub event: Option<String>,
    /// Event data. May be multiline; each line is emitted as its own `data:` field.
    pub data: String,
    /// Client reconnect interval in milliseconds.
    pub retry: Option<u32>,
}

impl SseEvent {
    /// Create an event carrying only data.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    /// Create an event with an id and data.
    pub fn with_id(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    pub fn builder() -> SseEventBuilder {
        SseEventBuilder::new()
    }
}

/// Builder for constructing SSE events.
#[derive(Default)]
pub struct SseEventBuilder {
    id: Option<String>,
    event: Option<String>,
    data: Option<String>,
    retry: Option<u32>,
}

impl SseEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn retry(mut self, retry_ms: u32) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// # Panics
    ///
    /// Panics if data was never set.
    pub fn build(self) -> SseEvent {
        SseEvent {
            id: self.id,
            event: self.event,
            data: self.data.expect("SseEvent requires data"),
            retry: self.retry,
        }
    }

    pub fn try_build(self) -> Option<SseEvent> {
        Some(SseEvent {
            id: self.id,
            event: self.event,
            data: self.data?,
            retry: self.retry,
        })
    }
}

/// Stateless encoder from [`SseEvent`] to wire bytes.
pub struct SseEncoder;

impl SseEncoder {
    /// Encode an event to its wire representation.
    ///
    /// ```text
    /// id: <id>
    /// event: <type>
    /// retry: <ms>
    /// data: <line1>
    /// data: <line2>
    ///
    /// ```
    pub fn encode(event: &SseEvent) -> Vec<u8> {
        let mut output = String::new();

        if let Some(ref id) = event.id {
            output.push_str("id: ");
            output.push_str(id);
            output.push('\n');
        }

        if let Some(ref event_type) = event.event {
            output.push_str("event: ");
            output.push_str(event_type);
            output.push('\n');
        }

        if let Some(retry) = event.retry {
            output.push_str("retry: ");
            output.push_str(&retry.to_string());
            output.push('\n');
        }

        for line in event.data.lines() {
            output.push_str("data: ");
            output.push_str(line);
            output.push('\n');
        }

        output.push('\n');
        output.into_bytes()
    }

    pub fn encode_string(event: &SseEvent) -> String {
        String::from_utf8(Self::encode(event)).expect("SSE encoding produces valid UTF-8")
    }

    /// Encode a comment. Comments are ignored by clients but keep the
    /// connection alive through idle-timeout proxies.
    pub fn encode_comment(comment: &str) -> Vec<u8> {
        let mut output = String::new();
        for line in comment.lines() {
            output.push_str(": ");
            output.push_str(line);
            output.push('\n');
        }
        output.push('\n');
        output.into_bytes()
    }

    /// An empty comment frame used as a keep-alive ping.
    pub fn encode_keepalive() -> Vec<u8> {
        b":\n\n".to_vec()
    }
}

/// Incremental SSE parser. Feed it arbitrarily chunked bytes; it buffers
/// partial lines/events across calls to [`feed`](SseParser::feed).
pub struct SseParser {
    buffer: String,
    current_id: Option<String>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_retry: Option<u32>,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            current_id: None,
            current_event: None,
            current_data: Vec::new(),
            current_retry: None,
        }
    }

    /// Feed newly received bytes and return any events completed by them.
    pub fn feed(&mut self, data: &[u8]) -> Vec<SseEvent> {
        let Ok(s) = std::str::from_utf8(data) else {
            return vec![];
        };
        self.buffer.push_str(s);

        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].to_string();
            self.buffer = self.buffer[newline_pos + 1..].to_string();

            if line.is_empty() {
                if let Some(event) = self.emit_event() {
                    events.push(event);
                }
            } else if line.starts_with(':') {
                // comment, ignored
            } else if let Some(colon_pos) = line.find(':') {
                let field = &line[..colon_pos];
                let value = line[colon_pos + 1..].trim_start();

                match field {
                    "id" => self.current_id = Some(value.to_string()),
                    "event" => self.current_event = Some(value.to_string()),
                    "data" => self.current_data.push(value.to_string()),
                    "retry" => {
                        if let Ok(ms) = value.parse() {
                            self.current_retry = Some(ms);
                        }
                    }
                    _ => {}
                }
            } else {
                match line.as_str() {
                    "id" => self.current_id = Some(String::new()),
                    "event" => self.current_event = Some(String::new()),
                    "data" => self.current_data.push(String::new()),
                    _ => {}
                }
            }
        }

        events
    }

    fn emit_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_id = None;
            self.current_event = None;
            self.current_retry = None;
            return None;
        }

        let data = self.current_data.join("\n");
        let event = SseEvent {
            id: self.current_id.take(),
            event: self.current_event.take(),
            data,
            retry: self.current_retry.take(),
        };
        self.current_data.clear();
        Some(event)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.current_id = None;
        self.current_event = None;
        self.current_data.clear();
        self.current_retry = None;
    }

    /// The id of the most recently parsed (in-progress or emitted) event,
    /// for reconnection via `Last-Event-ID`.
    pub fn last_event_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a monotonically-labeled, per-process-unique SSE event id.
///
/// Format is `{sequence}-{random-suffix}`; the sequence orders events within
/// a session's replay buffer, the suffix disambiguates across restarts.
pub fn generate_event_id(sequence: u64) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    format!("{sequence}-{:x}", timestamp & 0xFFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_event_message() {
        let event = SseEvent::message("Hello, world!");
        assert_eq!(event.data, "Hello, world!");
        assert!(event.id.is_none());
        assert!(event.event.is_none());
    }

    #[test]
    fn sse_event_with_id() {
        let event = SseEvent::with_id("123", "data");
        assert_eq!(event.id, Some("123".to_string()));
        assert_eq!(event.data, "data");
    }

    #[test]
    fn sse_event_builder() {
        let event = SseEvent::builder()
            .id("evt-1")
            .event("notification")
            .data(r#"{"type": "test"}"#)
            .retry(3000)
            .build();

        assert_eq!(event.id, Some("evt-1".to_string()));
        assert_eq!(event.event, Some("notification".to_string()));
        assert_eq!(event.data, r#"{"type": "test"}"#);
        assert_eq!(event.retry, Some(3000));
    }

    #[test]
    fn sse_encode_simple() {
        let event = SseEvent::message("hello");
        assert_eq!(SseEncoder::encode_string(&event), "data: hello\n\n");
    }

    #[test]
    fn sse_encode_with_id() {
        let event = SseEvent::with_id("123", "data");
        assert_eq!(SseEncoder::encode_string(&event), "id: 123\ndata: data\n\n");
    }

    #[test]
    fn sse_encode_full() {
        let event = SseEvent::builder()
            .id("evt-1")
            .event("update")
            .data("line1\nline2")
            .retry(5000)
            .build();

        assert_eq!(
            SseEncoder::encode_string(&event),
            "id: evt-1\nevent: update\nretry: 5000\ndata: line1\ndata: line2\n\n"
        );
    }

    #[test]
    fn sse_encode_comment() {
        assert_eq!(SseEncoder::encode_comment("keepalive"), b": keepalive\n\n");
    }

    #[test]
    fn sse_encode_keepalive() {
        assert_eq!(SseEncoder::encode_keepalive(), b":\n\n");
    }

    #[test]
    fn sse_parser_simple() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn sse_parser_with_id() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 123\ndata: test\n\n");
        assert_eq!(events[0].id, Some("123".to_string()));
        assert_eq!(events[0].data, "test");
    }

    #[test]
    fn sse_parser_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: line1\ndata: line2\ndata: line3\n\n");
        assert_eq!(events[0].data, "line1\nline2\nline3");
    }

    #[test]
    fn sse_parser_multiple_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: first\n\ndata: second\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "first");
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn sse_parser_incremental() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"id: 1\n").is_empty());
        assert!(parser.feed(b"data: partial\n").is_empty());
        let events = parser.feed(b"\n");
        assert_eq!(events[0].id, Some("1".to_string()));
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn sse_parser_ignores_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": this is a comment\ndata: actual data\n\n");
        assert_eq!(events[0].data, "actual data");
    }

    #[test]
    fn sse_parser_retry() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"retry: 5000\ndata: test\n\n");
        assert_eq!(events[0].retry, Some(5000));
    }

    #[test]
    fn sse_roundtrip() {
        let original = SseEvent::builder()
            .id("round-trip-1")
            .event("test")
            .data("multiline\ndata\nhere")
            .retry(1000)
            .build();

        let encoded = SseEncoder::encode(&original);
        let mut parser = SseParser::new();
        let events = parser.feed(&encoded);

        assert_eq!(events[0], original);
    }

    #[test]
    fn generate_event_id_is_sequence_prefixed_and_unique() {
        let id1 = generate_event_id(1);
        let id2 = generate_event_id(2);
        assert!(id1.starts_with("1-"));
        assert!(id2.starts_with("2-"));
        assert_ne!(id1, id2);
    }
}
