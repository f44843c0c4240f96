//! Server-side Streamable HTTP transport: a single endpoint multiplexing
//! POST (request/response, one SSE stream per call), GET (long-lived
//! server push), and DELETE (session teardown).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashSet;
use mcp_session_core::{JsonRpcMessage, RequestId, SseEncoder, SseEvent};
use tokio::sync::{mpsc, watch};

use crate::dispatcher::{InboundSender, OutboundSink, PostChannel, ReplyToken, RoutedMessage};
use crate::error::{TransportError, TransportResult};
use crate::session::SessionId;

/// Outcome of [`StreamableServerTransport::handle_post`].
pub enum PostOutcome {
    /// The POST carried only notifications/responses; caller emits a bare
    /// `202 Accepted`.
    Accepted,
    /// The POST carried at least one request; caller streams `stream` as
    /// SSE until it completes.
    Streaming(PostStream),
}

/// The per-POST SSE body: yields already-encoded SSE frames and ends itself
/// once its `PendingRequests` set empties.
pub struct PostStream {
    receiver: mpsc::Receiver<JsonRpcMessage>,
    pending: Arc<DashSet<RequestId>>,
}

impl PostStream {
    /// Pull the next encoded SSE frame, or `None` once the stream is done.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        let msg = self.receiver.recv().await?;
        let data = serde_json::to_string(&msg).unwrap_or_default();
        let event = SseEvent::builder().event("message").data(data).build();
        let frame = SseEncoder::encode(&event);
        if self.pending.is_empty() {
            self.receiver.close();
        }
        Some(frame)
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Server-side Streamable HTTP transport for one session.
pub struct StreamableServerTransport {
    session_id: SessionId,
    inbound: InboundSender,
    unsolicited_tx: watch::Sender<Option<JsonRpcMessage>>,
    unsolicited_rx: watch::Receiver<Option<JsonRpcMessage>>,
    live_gets: AtomicU32,
}

impl StreamableServerTransport {
    pub fn new(session_id: SessionId, inbound: InboundSender) -> Self {
        let (unsolicited_tx, unsolicited_rx) = watch::channel(None);
        Self {
            session_id,
            inbound,
            unsolicited_tx,
            unsolicited_rx,
            live_gets: AtomicU32::new(0),
        }
    }

    /// Open a server-push stream, yielding SSE frames for every
    /// subsequent unsolicited message until `cancelled` fires.
    ///
    /// Extra concurrent GETs are allowed (best-effort, drop-oldest
    /// semantics mean only one listener reliably sees every push). Emits a
    /// `: ` comment frame every `keep_alive` to hold proxies open while the
    /// session is otherwise quiet.
    pub async fn handle_get(
        &self,
        keep_alive: std::time::Duration,
        mut on_frame: impl FnMut(Vec<u8>) -> bool,
        cancelled: impl std::future::Future<Output = ()>,
    ) {
        self.live_gets.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.unsolicited_rx.clone();
        let mut ticker = tokio::time::interval(keep_alive);
        ticker.tick().await;
        tokio::pin!(cancelled);
        loop {
            tokio::select! {
                _ = &mut cancelled => break,
                _ = ticker.tick() => {
                    if !on_frame(SseEncoder::encode_keepalive()) {
                        break;
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(msg) = rx.borrow_and_update().clone() else { continue };
                    let data = serde_json::to_string(&msg).unwrap_or_default();
                    let event = SseEvent::builder().event("message").data(data).build();
                    if !on_frame(SseEncoder::encode(&event)) {
                        break;
                    }
                }
            }
        }
        self.live_gets.fetch_sub(1, Ordering::SeqCst);
    }

    /// Parse a POST body (single message or batch array) and enqueue every
    /// request/notification to the dispatcher's inbound channel.
    ///
    /// `body` must already be validated as well-formed UTF-8 JSON by the
    /// HTTP layer; a `null` message is a fatal protocol error per spec.
    pub fn handle_post(&self, body: &[u8]) -> TransportResult<PostOutcome> {
        let messages = parse_body(body)?;

        let pending = Arc::new(DashSet::new());
        let (tx, rx) = mpsc::channel(1);
        let post_channel = Arc::new(PostChannel {
            sender: tx,
            pending: pending.clone(),
        });

        for message in messages {
            if message.is_request() {
                let id = message.id().cloned().expect("checked by is_request");
                pending.insert(id);
                let reply_to = ReplyToken(post_channel.clone());
                let routed = RoutedMessage::reply(message, reply_to);
                let _ = self.inbound.send(routed);
            } else {
                let routed = RoutedMessage::notification(message);
                let _ = self.inbound.send(routed);
            }
        }

        if pending.is_empty() {
            return Ok(PostOutcome::Accepted);
        }

        Ok(PostOutcome::Streaming(PostStream {
            receiver: rx,
            pending,
        }))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Close every live channel; called once by the Session on delete.
    pub fn shutdown(&self) {
        let _ = self.unsolicited_tx.send(None);
    }
}

#[async_trait]
impl OutboundSink for StreamableServerTransport {
    async fn send_message(&self, msg: RoutedMessage) -> Result<(), TransportError> {
        match msg.reply_to {
            Some(reply_to) => {
                remove_pending(&reply_to.0.pending, &msg.message);
                reply_to
                    .0
                    .sender
                    .send(msg.message)
                    .await
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            }
            None => {
                // drop-oldest: a stale unconsumed push is simply overwritten.
                let _ = self.unsolicited_tx.send(Some(msg.message));
            }
        }
        Ok(())
    }
}

/// Strikes a response's request id from its POST's `PendingRequests`.
/// Called from [`OutboundSink::send_message`] against the `pending` handle
/// carried in the matching [`ReplyToken`]'s [`PostChannel`], before the
/// response reaches the channel — so by the time
/// [`PostStream::next_frame`] checks `pending.is_empty()` after receiving
/// it, the set already reflects the answer.
pub(crate) fn remove_pending(pending: &DashSet<RequestId>, msg: &JsonRpcMessage) {
    if let Some(id) = msg.id() {
        pending.remove(id);
    }
}

fn parse_body(body: &[u8]) -> TransportResult<Vec<JsonRpcMessage>> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(TransportError::ProtocolError(
            "empty request body".to_string(),
        ));
    }

    if mcp_session_core::is_batch(body) {
        let values: Vec<serde_json::Value> = serde_json::from_slice(body)
            .map_err(|e| TransportError::ProtocolError(format!("malformed batch: {e}")))?;
        values
            .into_iter()
            .map(|v| {
                if v.is_null() {
                    return Err(TransportError::ProtocolError("null message".to_string()));
                }
                serde_json::from_value(v)
                    .map_err(|e| TransportError::ProtocolError(format!("malformed message: {e}")))
            })
            .collect()
    } else {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| TransportError::ProtocolError(format!("malformed message: {e}")))?;
        if value.is_null() {
            return Err(TransportError::ProtocolError("null message".to_string()));
        }
        let message = serde_json::from_value(value)
            .map_err(|e| TransportError::ProtocolError(format!("malformed message: {e}")))?;
        Ok(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn transport() -> (StreamableServerTransport, mpsc::UnboundedReceiver<RoutedMessage>) {
        let (tx, rx) = unbounded_channel();
        let transport = StreamableServerTransport::new(SessionId::generate(), tx);
        (transport, rx)
    }

    #[test]
    fn notification_only_post_is_accepted_with_no_stream() {
        let (transport, _rx) = transport();
        let body = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        match transport.handle_post(body).unwrap() {
            PostOutcome::Accepted => {}
            PostOutcome::Streaming(_) => panic!("expected Accepted"),
        }
    }

    #[test]
    fn request_post_returns_streaming_outcome_and_enqueues_inbound() {
        let (transport, mut rx) = transport();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        match transport.handle_post(body).unwrap() {
            PostOutcome::Streaming(stream) => assert!(!stream.is_done()),
            PostOutcome::Accepted => panic!("expected Streaming"),
        }
        let routed = rx.try_recv().expect("message enqueued");
        assert!(routed.reply_to.is_some());
    }

    #[test]
    fn batch_post_enqueues_every_message() {
        let (transport, mut rx) = transport();
        let body = br#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","id":2,"method":"b"}]"#;
        let _ = transport.handle_post(body).unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn null_message_is_rejected() {
        let (transport, _rx) = transport();
        assert!(transport.handle_post(b"null").is_err());
    }

    #[tokio::test]
    async fn post_stream_completes_once_every_request_is_answered() {
        // Drives the reply through `OutboundSink::send_message`, the real
        // production path, rather than poking `pending` by hand.
        let (transport, mut rx) = transport();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let mut stream = match transport.handle_post(body).unwrap() {
            PostOutcome::Streaming(s) => s,
            PostOutcome::Accepted => panic!("expected Streaming"),
        };

        let routed = rx.try_recv().unwrap();
        let reply_to = routed.reply_to.unwrap();
        transport
            .send_message(RoutedMessage::reply(response_message(1), reply_to))
            .await
            .unwrap();

        assert!(stream.next_frame().await.is_some());
        assert!(stream.is_done());
        assert!(stream.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn batch_post_stream_stays_open_until_every_reply_lands() {
        let (transport, mut rx) = transport();
        let body = br#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","id":2,"method":"b"}]"#;
        let mut stream = match transport.handle_post(body).unwrap() {
            PostOutcome::Streaming(s) => s,
            PostOutcome::Accepted => panic!("expected Streaming"),
        };

        let first = rx.try_recv().unwrap().reply_to.unwrap();
        let second = rx.try_recv().unwrap().reply_to.unwrap();

        transport
            .send_message(RoutedMessage::reply(response_message(1), first))
            .await
            .unwrap();
        assert!(stream.next_frame().await.is_some());
        assert!(!stream.is_done(), "one reply still outstanding");

        transport
            .send_message(RoutedMessage::reply(response_message(2), second))
            .await
            .unwrap();
        assert!(stream.next_frame().await.is_some());
        assert!(stream.is_done());
        assert!(stream.next_frame().await.is_none());
    }

    fn response_message(id: i64) -> JsonRpcMessage {
        serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {}
        }))
        .unwrap()
    }
}
