//! Auto-detecting client transport: tries Streamable HTTP first and falls
//! back to the legacy HTTP+SSE pair when the server doesn't speak it.
//!
//! Detection happens once, on the first `initialize` call, and is cached
//! for the transport's lifetime — a server never switches encodings
//! mid-session.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use mcp_session_core::JsonRpcMessage;
use tokio::sync::{Mutex, OnceCell};

use crate::config::ClientConfig;
use crate::error::{TransportError, TransportResult};
use crate::legacy_sse::client::LegacySseClientTransport;
use crate::streamable::client::StreamableClientTransport;

type BoxMessageStream = Pin<Box<dyn Stream<Item = JsonRpcMessage> + Send>>;

/// Which encoding was detected on the wire, holding whatever
/// transport-specific state is needed to read the server-push stream
/// exactly once.
enum DetectedTransport {
    Streamable(Arc<StreamableClientTransport>),
    /// The legacy GET stream is already open by the time detection
    /// commits (it had to be, to read the `endpoint` event) so it is
    /// captured here rather than reopened.
    LegacySse(Arc<LegacySseClientTransport>, Mutex<Option<BoxMessageStream>>),
}

/// Wraps a client transport whose encoding is unknown until the first round
/// trip. Every call after detection delegates to whichever transport won
/// the probe; calls made before detection commits wait for it instead of
/// racing it — the "delegating reader" pattern: a reader gated on a single
/// commit signal, after which every read goes straight to the real stream.
pub struct ClientAutoDetectTransport {
    config: ClientConfig,
    endpoint_path: String,
    sse_path: String,
    detected: OnceCell<DetectedTransport>,
    /// Holds the response from the probe POST so `initialize` doesn't send
    /// the same request twice on the Streamable HTTP path.
    probe_response: Mutex<Option<JsonRpcMessage>>,
}

impl ClientAutoDetectTransport {
    pub fn new(
        config: ClientConfig,
        endpoint_path: impl Into<String>,
        sse_path: impl Into<String>,
    ) -> Self {
        Self {
            config,
            endpoint_path: endpoint_path.into(),
            sse_path: sse_path.into(),
            detected: OnceCell::new(),
            probe_response: Mutex::new(None),
        }
    }

    /// Send the `initialize` request, probing Streamable HTTP POST first
    /// and falling back to the legacy SSE pair on any non-success response
    /// or connection failure. Returns the server's response to
    /// `initialize`, and commits the detected encoding for every later
    /// call on this transport.
    pub async fn initialize(&self, request: JsonRpcMessage) -> TransportResult<JsonRpcMessage> {
        let first_call = self.detected.get().is_none();
        let detected = self
            .detected
            .get_or_try_init(|| self.probe(&request))
            .await?;

        match detected {
            DetectedTransport::Streamable(t) => {
                t.mark_initialized();
                if first_call {
                    // The probe's own POST already carried this request;
                    // reuse its response instead of sending it twice.
                    return Ok(self.probe_response.lock().await.take().ok_or_else(|| {
                        TransportError::ProtocolError("no response to initialize".to_string())
                    })?);
                }
            }
            DetectedTransport::LegacySse(..) => {}
        }
        self.send_and_await_response(&request).await
    }

    async fn probe(&self, request: &JsonRpcMessage) -> TransportResult<DetectedTransport> {
        let streamable =
            StreamableClientTransport::new(self.config.clone(), self.endpoint_path.clone())?;

        match streamable.send(std::slice::from_ref(request)).await {
            Ok(mut responses) => {
                *self.probe_response.lock().await = responses.pop();
                Ok(DetectedTransport::Streamable(Arc::new(streamable)))
            }
            Err(_) => {
                let legacy = Arc::new(LegacySseClientTransport::new(
                    self.config.clone(),
                    self.sse_path.clone(),
                )?);
                let (ready, stream) = legacy.connect().await?;
                ready.await.map_err(|_| {
                    TransportError::ProtocolError(
                        "legacy SSE endpoint event never arrived".to_string(),
                    )
                })?;
                legacy.send(request).await?;
                Ok(DetectedTransport::LegacySse(
                    legacy,
                    Mutex::new(Some(Box::pin(stream))),
                ))
            }
        }
    }

    /// Send a message using whichever transport was detected.
    pub async fn send(&self, message: &JsonRpcMessage) -> TransportResult<Vec<JsonRpcMessage>> {
        match self.detected.get() {
            Some(DetectedTransport::Streamable(t)) => t.send(std::slice::from_ref(message)).await,
            Some(DetectedTransport::LegacySse(t, _)) => {
                t.send(message).await?;
                Ok(Vec::new())
            }
            None => Err(TransportError::ProtocolError(
                "transport not yet detected; call initialize() first".to_string(),
            )),
        }
    }

    async fn send_and_await_response(
        &self,
        request: &JsonRpcMessage,
    ) -> TransportResult<JsonRpcMessage> {
        use futures::StreamExt;
        match self.detected.get() {
            Some(DetectedTransport::Streamable(t)) => {
                let mut responses = t.send(std::slice::from_ref(request)).await?;
                responses.pop().ok_or_else(|| {
                    TransportError::ProtocolError("no response to initialize".to_string())
                })
            }
            Some(DetectedTransport::LegacySse(t, stream)) => {
                t.send(request).await?;
                let mut guard = stream.lock().await;
                let s = guard.as_mut().ok_or_else(|| {
                    TransportError::ProtocolError("message stream already taken".to_string())
                })?;
                s.next().await.ok_or_else(|| {
                    TransportError::ProtocolError("GET stream closed before response".to_string())
                })
            }
            None => Err(TransportError::ProtocolError(
                "transport not yet detected".to_string(),
            )),
        }
    }

    /// Take ownership of the server-push stream. Can only be called once
    /// per transport — mirrors there being exactly one long-lived GET per
    /// session. Blocks until detection has committed.
    pub async fn take_message_stream(&self) -> TransportResult<BoxMessageStream> {
        while self.detected.get().is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        match self.detected.get().expect("checked above") {
            DetectedTransport::Streamable(t) => Ok(Box::pin(t.open_get_stream().await?)),
            DetectedTransport::LegacySse(_, stream) => stream
                .lock()
                .await
                .take()
                .ok_or_else(|| TransportError::ProtocolError("stream already taken".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_initialize_is_an_error() {
        let transport =
            ClientAutoDetectTransport::new(ClientConfig::new("http://127.0.0.1:1"), "/mcp", "/sse");
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(transport.send(&msg).await.is_err());
    }
}
