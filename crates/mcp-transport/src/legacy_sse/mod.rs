//! The legacy HTTP+SSE encoding: a long-lived `GET /sse` stream paired with
//! `POST /message?sessionId=...`. Superseded by Streamable HTTP but kept for
//! clients that predate the 2025-03-26 revision of the protocol.

pub mod client;
pub mod server;
