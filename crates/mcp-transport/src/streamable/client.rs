//! Client-side Streamable HTTP transport: POSTs requests to the single
//! endpoint and reads back either an immediate JSON body, an SSE stream of
//! responses, or a bare `202 Accepted`; optionally keeps a long-lived GET
//! open for server-initiated pushes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, StreamExt};
use mcp_session_core::{JsonRpcMessage, SseParser, headers};
use reqwest::{Client as HttpClient, StatusCode, header};
use tokio::sync::RwLock;

use crate::config::ClientConfig;
use crate::error::{TransportError, TransportResult};
use crate::session::SessionId;

/// Client-side Streamable HTTP transport bound to one server endpoint.
pub struct StreamableClientTransport {
    config: ClientConfig,
    http: HttpClient,
    endpoint_path: String,
    session_id: RwLock<Option<SessionId>>,
    /// `MCP-Protocol-Version` is only sent once `initialize` has
    /// succeeded; set by the caller via [`Self::mark_initialized`].
    initialized: AtomicBool,
}

impl StreamableClientTransport {
    pub fn new(config: ClientConfig, endpoint_path: impl Into<String>) -> TransportResult<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::ConfigurationError(e.to_string()))?;
        Ok(Self {
            config,
            http,
            endpoint_path: endpoint_path.into(),
            session_id: RwLock::new(None),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.session_id.read().await.clone()
    }

    fn endpoint_url(&self) -> String {
        format!("{}{}", self.config.base_url, self.endpoint_path)
    }

    async fn build_headers(&self, accept: &str) -> TransportResult<header::HeaderMap> {
        let mut map = header::HeaderMap::new();
        map.insert(
            header::ACCEPT,
            header::HeaderValue::from_str(accept)
                .map_err(|e| TransportError::ConfigurationError(e.to_string()))?,
        );

        if self.initialized.load(Ordering::SeqCst) {
            map.insert(
                headers::MCP_PROTOCOL_VERSION,
                header::HeaderValue::from_str(&self.config.protocol_version)
                    .map_err(|e| TransportError::ConfigurationError(e.to_string()))?,
            );
        }

        if let Some(session_id) = self.session_id.read().await.as_ref() {
            map.insert(
                headers::MCP_SESSION_ID,
                header::HeaderValue::from_str(session_id.as_str())
                    .map_err(|e| TransportError::ConfigurationError(e.to_string()))?,
            );
        }

        if let Some(token) = &self.config.auth_token {
            map.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::ConfigurationError(e.to_string()))?,
            );
        }

        Ok(map)
    }

    /// POST one or more messages. Returns every response the server sends
    /// back, empty when the server answered with a bare `202 Accepted`
    /// (a notification-only or fire-and-forget batch).
    pub async fn send(&self, messages: &[JsonRpcMessage]) -> TransportResult<Vec<JsonRpcMessage>> {
        let body = if messages.len() == 1 {
            serde_json::to_vec(&messages[0])
        } else {
            serde_json::to_vec(messages)
        }
        .map_err(|e| TransportError::ProtocolError(e.to_string()))?;

        let headers = self
            .build_headers("application/json, text/event-stream")
            .await?;

        let response = self
            .http
            .post(self.endpoint_url())
            .headers(headers)
            .header(header::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        self.capture_session_id(&response).await;

        if response.status() == StatusCode::ACCEPTED {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(TransportError::ProtocolError(format!(
                "POST failed: {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with(headers::CONTENT_TYPE_JSON) {
            let message: JsonRpcMessage = response
                .json()
                .await
                .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
            return Ok(vec![message]);
        }

        // text/event-stream: read every `message` frame until the server
        // closes the stream (its PendingRequests set has emptied).
        let mut parser = SseParser::new();
        let mut responses = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            for event in parser.feed(&chunk) {
                if let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&event.data) {
                    responses.push(message);
                }
            }
        }
        Ok(responses)
    }

    /// Open the long-lived `GET` stream for server-initiated pushes. Yields
    /// one message per `message` SSE frame; ends when the server closes the
    /// connection or on session teardown.
    pub async fn open_get_stream(
        &self,
    ) -> TransportResult<impl Stream<Item = JsonRpcMessage> + Send> {
        let headers = self.build_headers(headers::ACCEPT_SSE).await?;
        let response = self
            .http
            .get(self.endpoint_url())
            .headers(headers)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        self.capture_session_id(&response).await;

        if !response.status().is_success() {
            return Err(TransportError::ProtocolError(format!(
                "GET failed: {}",
                response.status()
            )));
        }

        let mut parser = SseParser::new();
        let mut byte_stream = response.bytes_stream();
        Ok(async_stream::stream! {
            while let Some(chunk) = byte_stream.next().await {
                let Ok(chunk) = chunk else { break };
                for event in parser.feed(&chunk) {
                    if let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&event.data) {
                        yield message;
                    }
                }
            }
        })
    }

    /// `DELETE` the session, per spec the client-initiated teardown path.
    pub async fn close(&self) -> TransportResult<()> {
        let Some(session_id) = self.session_id.read().await.clone() else {
            return Ok(());
        };
        let mut map = header::HeaderMap::new();
        map.insert(
            headers::MCP_SESSION_ID,
            header::HeaderValue::from_str(session_id.as_str())
                .map_err(|e| TransportError::ConfigurationError(e.to_string()))?,
        );
        let _ = self
            .http
            .delete(self.endpoint_url())
            .headers(map)
            .send()
            .await;
        Ok(())
    }

    async fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(value) = response
            .headers()
            .get(headers::MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<SessionId>().ok())
        {
            *self.session_id.write().await = Some(value);
        }
    }
}

/// Shared by both client transports: a thin wrapper so an
/// [`Arc<StreamableClientTransport>`] can be cloned cheaply across the
/// dispatch task and the caller's request path.
pub type SharedStreamableClient = Arc<StreamableClientTransport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_base_and_path() {
        let config = ClientConfig::new("http://localhost:8080");
        let transport = StreamableClientTransport::new(config, "/mcp").unwrap();
        assert_eq!(transport.endpoint_url(), "http://localhost:8080/mcp");
    }

    #[tokio::test]
    async fn protocol_version_header_only_sent_after_initialized() {
        let config = ClientConfig::new("http://localhost:8080");
        let transport = StreamableClientTransport::new(config, "/mcp").unwrap();
        let before = transport.build_headers("application/json").await.unwrap();
        assert!(!before.contains_key(headers::MCP_PROTOCOL_VERSION));

        transport.mark_initialized();
        let after = transport.build_headers("application/json").await.unwrap();
        assert!(after.contains_key(headers::MCP_PROTOCOL_VERSION));
    }
}
