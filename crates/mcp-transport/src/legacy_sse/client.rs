//! Client-side legacy HTTP+SSE transport: opens a long-lived `GET /sse`
//! stream, discovers the `POST` path from the server's bootstrap `endpoint`
//! event, and sends requests there. Responses arrive asynchronously over
//! the GET stream rather than inline in the POST response.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use mcp_session_core::{JsonRpcMessage, SseParser, headers};
use reqwest::{Client as HttpClient, header};
use tokio::sync::{RwLock, oneshot};

use crate::config::ClientConfig;
use crate::error::{TransportError, TransportResult};

/// Client-side legacy HTTP+SSE transport.
pub struct LegacySseClientTransport {
    config: ClientConfig,
    http: HttpClient,
    sse_path: String,
    /// Filled once the bootstrap `endpoint` event arrives on the GET stream.
    message_url: RwLock<Option<String>>,
}

impl LegacySseClientTransport {
    pub fn new(config: ClientConfig, sse_path: impl Into<String>) -> TransportResult<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::ConfigurationError(e.to_string()))?;
        Ok(Self {
            config,
            http,
            sse_path: sse_path.into(),
            message_url: RwLock::new(None),
        })
    }

    fn sse_url(&self) -> String {
        format!("{}{}", self.config.base_url, self.sse_path)
    }

    /// Open the GET stream. The returned `ready` receiver fires once the
    /// bootstrap `endpoint` event has been parsed and [`Self::send`] can be
    /// called; the returned stream yields every subsequent `message` event.
    pub async fn connect(
        self: &Arc<Self>,
    ) -> TransportResult<(
        oneshot::Receiver<()>,
        impl Stream<Item = JsonRpcMessage> + Send,
    )> {
        let response = self
            .http
            .get(self.sse_url())
            .header(header::ACCEPT, headers::ACCEPT_SSE)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::ProtocolError(format!(
                "GET /sse failed: {}",
                response.status()
            )));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let this = self.clone();
        let mut parser = SseParser::new();
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut ready_tx = Some(ready_tx);
            while let Some(chunk) = byte_stream.next().await {
                let Ok(chunk) = chunk else { break };
                for event in parser.feed(&chunk) {
                    match event.event.as_deref() {
                        Some("endpoint") => {
                            let url = resolve_message_url(&this.config.base_url, &event.data);
                            *this.message_url.write().await = Some(url);
                            if let Some(tx) = ready_tx.take() {
                                let _ = tx.send(());
                            }
                        }
                        _ => {
                            if let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&event.data) {
                                yield message;
                            }
                        }
                    }
                }
            }
        };

        Ok((ready_rx, stream))
    }

    /// Send a request/notification to the discovered message endpoint.
    /// Always answers `202 Accepted` on success; the matching response, if
    /// any, arrives later over the GET stream.
    pub async fn send(&self, message: &JsonRpcMessage) -> TransportResult<()> {
        let url = self
            .message_url
            .read()
            .await
            .clone()
            .ok_or_else(|| TransportError::ProtocolError("endpoint not yet discovered".into()))?;

        let mut headers_map = header::HeaderMap::new();
        if let Some(token) = &self.config.auth_token {
            headers_map.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::ConfigurationError(e.to_string()))?,
            );
        }

        let body = serde_json::to_vec(message)
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .headers(headers_map)
            .header(header::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::ProtocolError(format!(
                "POST /message failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn resolve_message_url(base_url: &str, endpoint_data: &str) -> String {
    let trimmed = endpoint_data.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        value
            .get("uri")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_string())
    } else if let Some(path) = trimmed.strip_prefix('/') {
        format!("{base_url}/{path}")
    } else {
        format!("{base_url}/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plain_path_against_base_url() {
        let url = resolve_message_url("http://localhost:8080", "/message?sessionId=abc");
        assert_eq!(url, "http://localhost:8080/message?sessionId=abc");
    }

    #[test]
    fn resolves_absolute_url_unchanged() {
        let url = resolve_message_url("http://localhost:8080", "http://other/message");
        assert_eq!(url, "http://other/message");
    }

    #[test]
    fn resolves_json_endpoint_event() {
        let url = resolve_message_url(
            "http://localhost:8080",
            r#"{"uri":"http://localhost:8080/message?sessionId=abc"}"#,
        );
        assert_eq!(url, "http://localhost:8080/message?sessionId=abc");
    }
}
