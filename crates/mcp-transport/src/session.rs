//! The `Session` entity: the unit the registry tracks, independent of which
//! wire encoding backs it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use mcp_session_core::UserIdClaim;
use tokio::task::JoinHandle;

pub use mcp_session_core::SessionId;

use crate::dispatcher::RoutedMessage;
use crate::legacy_sse::server::LegacySseServerTransport;
use crate::streamable::server::StreamableServerTransport;

/// The server-side transport endpoint a session owns exclusively. Exactly
/// one of these backs every session for its whole lifetime; a session never
/// switches encodings after creation.
pub enum ServerTransportKind {
    Streamable(Arc<StreamableServerTransport>),
    LegacySse(Arc<LegacySseServerTransport>),
}

impl ServerTransportKind {
    pub fn as_outbound_sink(&self) -> Arc<dyn crate::dispatcher::OutboundSink> {
        match self {
            Self::Streamable(t) => t.clone() as Arc<dyn crate::dispatcher::OutboundSink>,
            Self::LegacySse(t) => t.clone() as Arc<dyn crate::dispatcher::OutboundSink>,
        }
    }

    pub fn shutdown(&self) {
        match self {
            Self::Streamable(t) => t.shutdown(),
            Self::LegacySse(t) => t.shutdown(),
        }
    }
}

/// A live MCP session: one client conversation multiplexed over one
/// transport endpoint, with exactly one dispatcher task running for its
/// duration.
///
/// `id`, `transport`, and `user_claim` never change after construction.
/// `ref_count` and `last_activity` are the only mutable state, both safe to
/// touch from any number of concurrent request handlers.
pub struct Session {
    id: SessionId,
    transport: ServerTransportKind,
    user_claim: Option<UserIdClaim>,
    ref_count: AtomicU32,
    /// Milliseconds since an arbitrary epoch, valid only for relative
    /// comparisons; stamped when `ref_count` returns to zero.
    last_activity_monotonic: AtomicI64,
    run_task: JoinHandle<()>,
}

impl Session {
    pub fn new(
        id: SessionId,
        transport: ServerTransportKind,
        user_claim: Option<UserIdClaim>,
        run_task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            transport,
            user_claim,
            ref_count: AtomicU32::new(0),
            last_activity_monotonic: AtomicI64::new(monotonic_millis()),
            run_task,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn transport(&self) -> &ServerTransportKind {
        &self.transport
    }

    /// Claim the session for the duration of one in-flight HTTP request.
    /// Every caller must pair this with exactly one [`Self::unreference`],
    /// including on early return or cancellation.
    pub fn reference(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Release a reference taken by [`Self::reference`]. Stamps the idle
    /// timestamp only when the count reaches zero, so a session under
    /// concurrent load never looks idle.
    pub fn unreference(&self) {
        if self.ref_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.last_activity_monotonic
                .store(monotonic_millis(), Ordering::SeqCst);
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// How long the session has been idle (`ref_count == 0`), or `None`
    /// while it is still referenced.
    pub fn idle_for(&self) -> Option<Duration> {
        if self.ref_count() != 0 {
            return None;
        }
        let stamped = self.last_activity_monotonic.load(Ordering::SeqCst);
        let elapsed = monotonic_millis().saturating_sub(stamped);
        Some(Duration::from_millis(elapsed.max(0) as u64))
    }

    /// Identity check a request's caller against the user the session was
    /// created under. `None == None` (both unauthenticated) counts as a
    /// match; differing claims, including a differing issuer, do not.
    pub fn has_same_user(&self, principal: Option<&UserIdClaim>) -> bool {
        self.user_claim.as_ref() == principal
    }

    pub fn outbound_sink(&self) -> Arc<dyn crate::dispatcher::OutboundSink> {
        self.transport.as_outbound_sink()
    }

    /// Tear the session down: abort its dispatcher task and release every
    /// transport-owned channel. Idempotent enough to call once from
    /// whichever path removes the session from the registry.
    pub fn shutdown(&self) {
        self.run_task.abort();
        self.transport.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.run_task.abort();
    }
}

/// RAII guard pairing [`Session::reference`]/[`Session::unreference`] so
/// every acquisition path — including early returns and task cancellation —
/// releases exactly once.
pub struct SessionGuard {
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn acquire(session: Arc<Session>) -> Self {
        session.reference();
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.unreference();
    }
}

/// Inbound channel receiver a freshly spawned dispatcher task consumes,
/// paired with the sender half handed to whichever transport parses HTTP
/// bodies for this session.
pub type InboundChannel = (
    crate::dispatcher::InboundSender,
    tokio::sync::mpsc::UnboundedReceiver<RoutedMessage>,
);

pub fn inbound_channel() -> InboundChannel {
    tokio::sync::mpsc::unbounded_channel()
}

fn monotonic_millis() -> i64 {
    use std::sync::OnceLock;
    static START: OnceLock<Instant> = OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    Instant::now().duration_since(start).as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::InboundSender;

    fn noop_task() -> JoinHandle<()> {
        tokio::spawn(async {})
    }

    fn streamable_transport(id: SessionId) -> ServerTransportKind {
        let (tx, _rx): (InboundSender, _) = tokio::sync::mpsc::unbounded_channel();
        ServerTransportKind::Streamable(Arc::new(StreamableServerTransport::new(id, tx)))
    }

    #[tokio::test]
    async fn reference_counting_stamps_idle_only_at_zero() {
        let id = SessionId::generate();
        let transport = streamable_transport(id.clone());
        let session = Session::new(id, transport, None, noop_task());

        session.reference();
        session.reference();
        assert!(session.idle_for().is_none());
        session.unreference();
        assert!(session.idle_for().is_none());
        session.unreference();
        assert!(session.idle_for().is_some());
    }

    #[tokio::test]
    async fn same_user_requires_full_claim_equality() {
        let id = SessionId::generate();
        let transport = streamable_transport(id.clone());
        let claim = UserIdClaim::new(
            mcp_session_core::ClaimType::Sub,
            "alice",
            Some("issuer-a".to_string()),
        );
        let session = Session::new(id, transport, Some(claim.clone()), noop_task());

        assert!(session.has_same_user(Some(&claim)));
        assert!(!session.has_same_user(None));

        let different_issuer = UserIdClaim::new(
            mcp_session_core::ClaimType::Sub,
            "alice",
            Some("issuer-b".to_string()),
        );
        assert!(!session.has_same_user(Some(&different_issuer)));
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let id = SessionId::generate();
        let transport = streamable_transport(id.clone());
        let session = Arc::new(Session::new(id, transport, None, noop_task()));

        {
            let _guard = SessionGuard::acquire(session.clone());
            assert_eq!(session.ref_count(), 1);
        }
        assert_eq!(session.ref_count(), 0);
    }
}
