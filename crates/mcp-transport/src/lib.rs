//! # mcp-transport
//!
//! Session-multiplexing transport engine for the Model Context Protocol:
//! the Streamable HTTP encoding and the legacy HTTP+SSE pair, each with a
//! server and client side, plus a client transport that auto-detects which
//! one a server speaks.
//!
//! ## What this crate owns
//!
//! - Parsing and framing JSON-RPC messages on and off the wire for both
//!   encodings (see [`streamable`] and [`legacy_sse`]).
//! - The [`session`] registry that multiplexes many conversations over
//!   however many HTTP connections each encoding needs, and the
//!   concurrency primitives (reference counting, idle tracking, ownership
//!   checks) that make teardown safe under concurrent requests.
//! - The [`http`] router wiring both encodings' endpoints onto axum.
//! - Origin validation and rate limiting ([`security`]) as ambient
//!   transport-layer hardening, independent of whatever authentication
//!   scheme an embedder layers on top.
//!
//! ## What this crate does not own
//!
//! The JSON-RPC method table and tool registry are an external
//! collaborator reached through the [`dispatcher`] trait boundary; this
//! crate only spawns and cancels it per session. Tool implementations,
//! the stdio transport, and the HTTP server process itself (TLS
//! termination, graceful shutdown signal handling) are all out of scope.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod client_auto_detect;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod legacy_sse;
pub mod registry;
pub mod security;
pub mod session;
pub mod streamable;

pub use client_auto_detect::ClientAutoDetectTransport;
pub use config::{ClientConfig, RetryPolicy, ServerConfig};
pub use dispatcher::{Dispatcher, InboundSender, OutboundSink, ReplyToken, RoutedMessage};
pub use error::{TransportError, TransportResult};
pub use http::router;
pub use registry::SessionRegistry;
pub use session::{Session, SessionGuard, SessionId, ServerTransportKind};
