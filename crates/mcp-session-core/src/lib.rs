//! Pure protocol types for the MCP session-multiplexing transport core.
//!
//! This crate has no I/O: it defines the session identifier, the claim
//! derived from an authenticated principal, the JSON-RPC wire types, and a
//! no-I/O SSE encoder/parser. The engine that drives sockets, axum routers,
//! and the session registry lives in `mcp-transport`, which depends on this
//! crate for its vocabulary.

#![warn(missing_docs, rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]

mod claim;
mod jsonrpc;
mod session_id;
pub mod sse;

pub use claim::{ClaimType, UserIdClaim};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload, JsonRpcVersion, RequestId, ResponseId, is_batch,
};
pub use session_id::{InvalidSessionId, SESSION_ID_LEN, SessionId};
pub use sse::{SseEncoder, SseEvent, SseEventBuilder, SseParser, generate_event_id};

/// Header names used by both wire encodings.
pub mod headers {
    /// Session id header echoed by the client on every request after the first.
    pub const MCP_SESSION_ID: &str = "Mcp-Session-Id";

    /// Negotiated protocol version, required on every request after initialize.
    pub const MCP_PROTOCOL_VERSION: &str = "MCP-Protocol-Version";

    /// SSE resumption cursor sent by the client on reconnect.
    pub const LAST_EVENT_ID: &str = "Last-Event-ID";

    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const CONTENT_TYPE_SSE: &str = "text/event-stream";
    pub const ACCEPT_SSE: &str = "text/event-stream";
}
