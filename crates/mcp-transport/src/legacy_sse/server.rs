//! Server-side legacy HTTP+SSE transport: a long-lived `GET /sse` stream
//! paired with a separate `POST /message?sessionId=...` for client-to-server
//! traffic. Responses and server-initiated messages both travel back over
//! the GET stream as `message` events — there is no per-POST response
//! stream the way there is on the Streamable HTTP encoding.

use async_trait::async_trait;
use mcp_session_core::{JsonRpcMessage, SseEncoder, SseEvent};
use tokio::sync::watch;

use crate::dispatcher::{InboundSender, OutboundSink, RoutedMessage};
use crate::error::{TransportError, TransportResult};
use crate::session::SessionId;

/// Server-side legacy HTTP+SSE transport for one session.
pub struct LegacySseServerTransport {
    session_id: SessionId,
    message_path: String,
    inbound: InboundSender,
    outbound_tx: watch::Sender<Option<JsonRpcMessage>>,
    outbound_rx: watch::Receiver<Option<JsonRpcMessage>>,
}

impl LegacySseServerTransport {
    pub fn new(session_id: SessionId, message_path: impl Into<String>, inbound: InboundSender) -> Self {
        let (outbound_tx, outbound_rx) = watch::channel(None);
        Self {
            session_id,
            message_path: message_path.into(),
            inbound,
            outbound_tx,
            outbound_rx,
        }
    }

    /// The bootstrap `endpoint` event a fresh `GET /sse` connection must
    /// emit before anything else, pointing the client at the POST path to
    /// use for this session.
    pub fn endpoint_event(&self) -> Vec<u8> {
        let data = format!("{}?sessionId={}", self.message_path, self.session_id);
        let event = SseEvent::builder().event("endpoint").data(data).build();
        SseEncoder::encode(&event)
    }

    /// Drive the long-lived GET stream: emits the bootstrap event, then one
    /// `message` frame per outbound push, until `cancelled` fires or the
    /// session is torn down. Emits a `: ` comment frame every `keep_alive`
    /// to hold proxies open while the session is otherwise quiet.
    pub async fn handle_get(
        &self,
        keep_alive: std::time::Duration,
        mut on_frame: impl FnMut(Vec<u8>) -> bool,
        cancelled: impl std::future::Future<Output = ()>,
    ) {
        if !on_frame(self.endpoint_event()) {
            return;
        }

        let mut rx = self.outbound_rx.clone();
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
                    let Some(msg) = rx.borrow_and_update().clone() else { break };
                    let data = serde_json::to_string(&msg).unwrap_or_default();
                    let event = SseEvent::builder().event("message").data(data).build();
                    if !on_frame(SseEncoder::encode(&event)) {
                        break;
                    }
                }
            }
        }
    }

    /// Parse a `POST /message` body and enqueue it to the dispatcher. The
    /// response side is always a bare `202 Accepted`; the matching JSON-RPC
    /// response, if any, arrives later over the GET stream.
    pub fn handle_post(&self, body: &[u8]) -> TransportResult<()> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(TransportError::ProtocolError(
                "empty request body".to_string(),
            ));
        }
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| TransportError::ProtocolError(format!("malformed message: {e}")))?;
        if value.is_null() {
            return Err(TransportError::ProtocolError("null message".to_string()));
        }
        let message: JsonRpcMessage = serde_json::from_value(value)
            .map_err(|e| TransportError::ProtocolError(format!("malformed message: {e}")))?;

        // No reply-routing token on this encoding: every response rides
        // back over the GET stream rather than an inline POST response.
        let _ = self.inbound.send(RoutedMessage::notification(message));
        Ok(())
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn shutdown(&self) {
        let _ = self.outbound_tx.send(None);
    }
}

#[async_trait]
impl OutboundSink for LegacySseServerTransport {
    async fn send_message(&self, msg: RoutedMessage) -> Result<(), TransportError> {
        // The legacy encoding has no per-POST reply path; every outbound
        // message, solicited or not, rides the single GET stream.
        let _ = self.outbound_tx.send(Some(msg.message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn transport() -> (LegacySseServerTransport, tokio::sync::mpsc::UnboundedReceiver<RoutedMessage>) {
        let (tx, rx) = unbounded_channel();
        let transport = LegacySseServerTransport::new(SessionId::generate(), "/message", tx);
        (transport, rx)
    }

    #[test]
    fn endpoint_event_carries_session_id_as_query_param() {
        let (transport, _rx) = transport();
        let frame = String::from_utf8(transport.endpoint_event()).unwrap();
        assert!(frame.contains("event: endpoint"));
        assert!(frame.contains(&format!("sessionId={}", transport.session_id())));
    }

    #[test]
    fn post_enqueues_to_inbound_regardless_of_request_or_notification() {
        let (transport, mut rx) = transport();
        transport
            .handle_post(br#"{"jsonrpc":"2.0","id":1,"method":"tools/call"}"#)
            .unwrap();
        let routed = rx.try_recv().unwrap();
        assert!(routed.reply_to.is_none());
    }

    #[test]
    fn null_message_is_rejected() {
        let (transport, _rx) = transport();
        assert!(transport.handle_post(b"null").is_err());
    }

    #[tokio::test]
    async fn get_stream_emits_endpoint_then_pushed_messages() {
        let (transport, _rx) = transport();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut frames = Vec::new();

        let push = async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let response = mcp_session_core::JsonRpcResponse::success(
                mcp_session_core::RequestId::Number(1),
                serde_json::json!({}),
            );
            transport
                .send_message(RoutedMessage::notification(
                    mcp_session_core::JsonRpcMessage::Response(response),
                ))
                .await
                .unwrap();
            let _ = done_tx.send(());
        };

        let collect = transport.handle_get(
            std::time::Duration::from_secs(30),
            |frame| {
                frames.push(frame);
                frames.len() < 2
            },
            async {
                let _ = done_rx.await;
            },
        );

        tokio::join!(push, collect);
        assert_eq!(frames.len(), 2);
        assert!(String::from_utf8(frames[0].clone()).unwrap().contains("endpoint"));
        assert!(String::from_utf8(frames[1].clone()).unwrap().contains("message"));
    }
}
