//! Process-wide session registry: the concurrent map from session id to
//! [`Session`], and the only place sessions are created or torn down.

use std::sync::Arc;

use dashmap::DashMap;
use mcp_session_core::UserIdClaim;

use crate::error::{TransportError, TransportResult};
use crate::session::{Session, SessionId};

/// Concurrent session-id → [`Session`] map. `DashMap` gives O(1) average
/// lookup/insert/remove under concurrent access without a single global
/// lock, matching the registry's requirement to stay off the hot path of
/// every request.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly constructed session. A collision on `id` is a fatal
    /// invariant violation — [`SessionId::generate`] draws from 128 bits of
    /// entropy, so a collision here indicates a broken RNG or id reuse, not
    /// a race worth retrying.
    pub fn insert(&self, session: Session) -> Arc<Session> {
        let id = session.id().clone();
        let session = Arc::new(session);
        let previous = self.sessions.insert(id.clone(), session.clone());
        assert!(
            previous.is_none(),
            "session id collision on insert: {id} already registered"
        );
        session
    }

    /// Look up a session by id. Returns the JSON-RPC `-32001` error the
    /// Streamable HTTP endpoint maps to `404 Not Found` when the id is
    /// unknown.
    pub fn get(&self, id: &SessionId) -> TransportResult<Arc<Session>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::SessionNotFound(id.to_string()))
    }

    /// Look up a session and verify the caller's identity matches the one
    /// it was created under. Returns [`TransportError::SessionUserMismatch`]
    /// (mapped to a bare `403`) on a mismatch, independent of whether the
    /// session itself was found.
    pub fn get_for_user(
        &self,
        id: &SessionId,
        principal: Option<&UserIdClaim>,
    ) -> TransportResult<Arc<Session>> {
        let session = self.get(id)?;
        if session.has_same_user(principal) {
            Ok(session)
        } else {
            Err(TransportError::SessionUserMismatch)
        }
    }

    /// Remove and tear down a session. Idempotent: removing an id that is
    /// no longer present is not an error, since DELETE, dispatcher-exception
    /// teardown, and idle reaping can all race to remove the same session.
    pub fn delete(&self, id: &SessionId) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tear down every session, e.g. on process shutdown.
    pub fn shutdown_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ServerTransportKind;
    use crate::streamable::server::StreamableServerTransport;

    fn session() -> Session {
        let id = SessionId::generate();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = ServerTransportKind::Streamable(Arc::new(StreamableServerTransport::new(
            id.clone(),
            tx,
        )));
        Session::new(id, transport, None, tokio::spawn(async {}))
    }

    #[test]
    fn get_missing_session_is_session_not_found() {
        let registry = SessionRegistry::new();
        let id = SessionId::generate();
        assert!(matches!(
            registry.get(&id),
            Err(TransportError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let registry = SessionRegistry::new();
        let session = session();
        let id = session.id().clone();
        registry.insert(session);
        assert_eq!(registry.get(&id).unwrap().id(), &id);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let registry = SessionRegistry::new();
        let session = session();
        let id = session.id().clone();
        registry.insert(session);
        registry.delete(&id);
        registry.delete(&id);
        assert!(registry.get(&id).is_err());
    }

    #[tokio::test]
    #[should_panic(expected = "session id collision")]
    async fn duplicate_insert_panics() {
        let registry = SessionRegistry::new();
        let id = SessionId::generate();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let transport_a = ServerTransportKind::Streamable(Arc::new(StreamableServerTransport::new(
            id.clone(),
            tx.clone(),
        )));
        let (tx2, _rx2) = tokio::sync::mpsc::unbounded_channel();
        let transport_b =
            ServerTransportKind::Streamable(Arc::new(StreamableServerTransport::new(id.clone(), tx2)));
        registry.insert(Session::new(id.clone(), transport_a, None, tokio::spawn(async {})));
        registry.insert(Session::new(id, transport_b, None, tokio::spawn(async {})));
    }
}
