//! The boundary between the transport engine and the external JSON-RPC
//! dispatcher / tool registry.
//!
//! The engine only pushes parsed messages onto a per-session inbound
//! channel and exposes an outbound sink; everything downstream of that
//! (method routing, tool execution) is an external collaborator this crate
//! never implements.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use mcp_session_core::{JsonRpcMessage, RequestId};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::session::SessionId;

/// Identifies the POST a response must be routed back to.
///
/// Carried alongside the message rather than mutated onto the JSON-RPC
/// payload itself, per the routing-token design: the dispatcher treats it
/// as an opaque token and hands it back unchanged on the matching response.
#[derive(Clone)]
pub struct ReplyToken(pub(crate) Arc<PostChannel>);

/// The POST-scoped outbound channel a [`ReplyToken`] addresses. Opaque to
/// the dispatcher; only the Streamable HTTP server transport constructs and
/// resolves these.
///
/// `pending` is the same `PendingRequests` set the matching `PostStream`
/// holds, so a reply can strike its id the moment it's sent rather than
/// leaving the stream to find out some other way.
pub(crate) struct PostChannel {
    pub(crate) sender: mpsc::Sender<JsonRpcMessage>,
    pub(crate) pending: Arc<DashSet<RequestId>>,
}

/// A message traveling across the dispatcher boundary in either direction.
///
/// Inbound: `reply_to` is `Some` for requests (so the dispatcher can route
/// the eventual response), `None` for notifications.
/// Outbound: the dispatcher sets `reply_to` to the same token it received
/// with the original request when replying, or leaves it `None` to push an
/// unsolicited message (routed to the session's drop-oldest channel).
pub struct RoutedMessage {
    pub message: JsonRpcMessage,
    pub reply_to: Option<ReplyToken>,
}

impl RoutedMessage {
    pub fn notification(message: JsonRpcMessage) -> Self {
        Self {
            message,
            reply_to: None,
        }
    }

    pub fn reply(message: JsonRpcMessage, reply_to: ReplyToken) -> Self {
        Self {
            message,
            reply_to: Some(reply_to),
        }
    }
}

/// A handle the dispatcher uses to send messages back into the transport
/// engine, implemented by whichever server transport kind owns the session.
#[async_trait]
pub trait OutboundSink: Send + Sync + 'static {
    /// Route a message produced by the dispatcher. Errors only if the
    /// engine can no longer deliver anything for this session (e.g. it was
    /// torn down concurrently).
    async fn send_message(&self, msg: RoutedMessage) -> Result<(), TransportError>;
}

/// The external dispatcher's contract: given a session's inbound stream and
/// an outbound sink, run for the session's lifetime.
///
/// Implementations own the JSON-RPC method table and tool registry; this
/// crate only ever holds a `dyn Dispatcher` to spawn and cancel it.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn run(
        self: Arc<Self>,
        session_id: SessionId,
        inbound: mpsc::UnboundedReceiver<RoutedMessage>,
        outbound: Arc<dyn OutboundSink>,
    );
}

/// Sender half of a session's inbound channel, held by whichever server
/// transport kind parses incoming HTTP bodies.
pub type InboundSender = mpsc::UnboundedSender<RoutedMessage>;
