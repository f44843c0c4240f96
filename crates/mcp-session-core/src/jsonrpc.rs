//! JSON-RPC 2.0 wire types shared by both transport encodings.
//!
//! The dispatcher (external to this crate) speaks these types; the
//! transport layer only needs to parse a message far enough to find its
//! `id` and tell a request from a response, so it can route accordingly.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Marker type that serializes as the literal string `"2.0"` and rejects
/// anything else on deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid jsonrpc version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// A JSON-RPC request id: either a string or an integer, compared
/// structurally (`"1"` and `1` are distinct ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A request or notification as received on the wire: notifications omit
/// `id`, requests carry one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl JsonRpcRequest {
    /// A message with an `id` is a request expecting a response; without
    /// one it is a notification.
    pub fn is_request(&self) -> bool {
        self.id.is_some()
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(-32600, "Invalid Request")
    }

    /// Session not found on the Streamable HTTP endpoint.
    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(-32001, format!("Session not found: {session_id}"))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A response id: `None` for the rare case of a parse error whose request
/// id could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    Success { result: Value },
    Error { error: JsonRpcError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion,
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    pub id: ResponseId,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    pub fn error(id: ResponseId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id,
        }
    }

    /// The id this response replies to, used to match it against a POST's
    /// `PendingRequests` map.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.id.as_request_id()
    }
}

/// A JSON-RPC message as it actually appears on the wire: either a
/// request/notification or a response. Transports only need to tell these
/// apart and, for requests, extract the id — everything else is the
/// dispatcher's concern.
///
/// Untagged: `serde` tries `Request` first (requires `method`), falling
/// back to `Response` (requires `result` or `error`) when that field is
/// absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// `true` for a request expecting a response; `false` for a
    /// notification or an outgoing response.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(r) if r.is_request())
    }

    /// The id carried by this message, for routing purposes.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => r.id.as_ref(),
            Self::Response(r) => r.request_id(),
        }
    }
}

/// Peek the first non-whitespace byte of a body to tell a JSON-RPC batch
/// (`[...]`) apart from a single message, without consuming the buffer.
pub fn is_batch(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips() {
        let v: JsonRpcVersion = serde_json::from_str("\"2.0\"").unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"2.0\"");
    }

    #[test]
    fn version_rejects_other_strings() {
        let err: Result<JsonRpcVersion, _> = serde_json::from_str("\"1.0\"");
        assert!(err.is_err());
    }

    #[test]
    fn request_id_untagged_round_trip() {
        let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, RequestId::String("abc".into()));
        let n: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(n, RequestId::Number(42));
        assert_ne!(RequestId::String("42".into()), RequestId::Number(42));
    }

    #[test]
    fn is_batch_detects_leading_bracket_past_whitespace() {
        assert!(is_batch(b"  \n\t[{}]"));
        assert!(!is_batch(b"  {\"jsonrpc\":\"2.0\"}"));
        assert!(!is_batch(b""));
    }

    #[test]
    fn message_without_id_is_notification() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(!msg.is_request());
    }

    #[test]
    fn message_with_method_and_id_is_a_request() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.id(), Some(&RequestId::Number(1)));
    }

    #[test]
    fn message_with_result_parses_as_response() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Response(_)));
        assert_eq!(msg.id(), Some(&RequestId::Number(1)));
    }

    #[test]
    fn response_payload_is_mutually_exclusive() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        let encoded = serde_json::to_string(&ok).unwrap();
        assert!(encoded.contains("result"));
        assert!(!encoded.contains("\"error\""));
    }
}
