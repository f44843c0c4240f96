//! Axum router wiring the two wire encodings onto their HTTP endpoints.
//!
//! This is the only place the engine touches axum: everything below the
//! handler functions is the pure transport/session machinery in
//! [`crate::streamable`], [`crate::legacy_sse`], and [`crate::session`].
//! Embedders call [`router`] once at startup and mount the result (or merge
//! it into a larger app); to get [`axum::extract::ConnectInfo`] populated,
//! serve it with `into_make_service_with_connect_info::<SocketAddr>()`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mcp_session_core::{JsonRpcError, JsonRpcResponse, ResponseId, headers as wire_headers};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::TransportError;
use crate::legacy_sse::server::LegacySseServerTransport;
use crate::registry::SessionRegistry;
use crate::security::{AuthConfig, SecurityError, SecurityHeaders, SecurityValidator};
use crate::session::{Session, SessionGuard, SessionId, ServerTransportKind, inbound_channel};
use crate::streamable::server::{PostOutcome, StreamableServerTransport};

/// Shared state for every handler, built once by [`router`].
struct AppState {
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    config: ServerConfig,
    security: SecurityValidator,
}

impl AppState {
    fn spawn_streamable_session(
        self: &Arc<Self>,
        principal: Option<mcp_session_core::UserIdClaim>,
    ) -> Arc<Session> {
        let id = SessionId::generate();
        let (tx, rx) = inbound_channel();
        let transport = Arc::new(StreamableServerTransport::new(id.clone(), tx));
        let outbound = transport.clone() as Arc<dyn crate::dispatcher::OutboundSink>;
        let run_task = self.spawn_dispatcher(id.clone(), rx, outbound);
        let session = Session::new(
            id,
            ServerTransportKind::Streamable(transport),
            principal,
            run_task,
        );
        self.registry.insert(session)
    }

    fn spawn_legacy_session(
        self: &Arc<Self>,
        principal: Option<mcp_session_core::UserIdClaim>,
    ) -> Arc<Session> {
        let id = SessionId::generate();
        let (tx, rx) = inbound_channel();
        let transport = Arc::new(LegacySseServerTransport::new(
            id.clone(),
            self.config.message_path.clone(),
            tx,
        ));
        let outbound = transport.clone() as Arc<dyn crate::dispatcher::OutboundSink>;
        let run_task = self.spawn_dispatcher(id.clone(), rx, outbound);
        let session = Session::new(
            id,
            ServerTransportKind::LegacySse(transport),
            principal,
            run_task,
        );
        self.registry.insert(session)
    }

    fn spawn_dispatcher(
        &self,
        session_id: SessionId,
        inbound: tokio::sync::mpsc::UnboundedReceiver<crate::dispatcher::RoutedMessage>,
        outbound: Arc<dyn crate::dispatcher::OutboundSink>,
    ) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(session_id, inbound, outbound).await })
    }
}

/// Build the router for both wire encodings, using `config`'s paths.
/// `dispatcher` is run once per session, for the session's lifetime, by a
/// task this crate owns and aborts on teardown.
pub fn router(
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    config: ServerConfig,
) -> Router {
    let security = SecurityValidator::new(
        config.origin.clone(),
        AuthConfig::for_development(),
        config.rate_limit.clone(),
    );
    let endpoint_path = config.endpoint_path.clone();
    let sse_path = config.sse_path.clone();
    let message_path = config.message_path.clone();

    let state = Arc::new(AppState {
        registry,
        dispatcher,
        config,
        security,
    });

    Router::new()
        .route(
            &endpoint_path,
            post(streamable_post).get(streamable_get).delete(streamable_delete),
        )
        .route(&sse_path, get(legacy_get))
        .route(&message_path, post(legacy_post))
        .with_state(state)
}

fn collect_headers(headers: &HeaderMap) -> SecurityHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// The caller's identity for session-ownership checks. This crate does not
/// implement authentication; it derives a claim from whatever bearer token
/// is already present so sessions stay bound to the caller that created
/// them, matching [`crate::session::Session::has_same_user`].
fn principal_from_headers(headers: &HeaderMap) -> Option<mcp_session_core::UserIdClaim> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = crate::security::extract_bearer_token(auth)?;
    Some(mcp_session_core::UserIdClaim::new(
        mcp_session_core::ClaimType::Sub,
        token,
        None,
    ))
}

fn check_security(state: &AppState, headers: &HeaderMap, addr: SocketAddr) -> Result<(), Response> {
    let header_map = collect_headers(headers);
    let client_ip = crate::security::extract_client_ip(&header_map).unwrap_or(addr.ip());
    state
        .security
        .validate_request(&header_map, client_ip)
        .map_err(security_error_response)
}

fn security_error_response(err: SecurityError) -> Response {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

fn transport_error_response(err: TransportError) -> Response {
    match err {
        TransportError::SessionNotFound(id) => {
            let response = JsonRpcResponse::error(ResponseId::null(), JsonRpcError::session_not_found(&id));
            (StatusCode::NOT_FOUND, Json(response)).into_response()
        }
        TransportError::SessionUserMismatch => StatusCode::FORBIDDEN.into_response(),
        TransportError::ProtocolError(msg) => {
            tracing::warn!(error = %msg, "malformed message on transport endpoint");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        other => {
            tracing::error!(error = %other, "transport error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn session_id_header(headers: &HeaderMap) -> Option<Result<SessionId, Response>> {
    let raw = headers.get(wire_headers::MCP_SESSION_ID)?.to_str().ok()?;
    Some(
        raw.parse::<SessionId>()
            .map_err(|_| (StatusCode::BAD_REQUEST, "malformed Mcp-Session-Id").into_response()),
    )
}

async fn streamable_post(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_security(&state, &headers, addr) {
        return resp;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with(wire_headers::CONTENT_TYPE_JSON) {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let principal = principal_from_headers(&headers);

    let session = match session_id_header(&headers) {
        Some(Ok(id)) => match state.registry.get_for_user(&id, principal.as_ref()) {
            Ok(session) => session,
            Err(err) => return transport_error_response(err),
        },
        Some(Err(resp)) => return resp,
        None => state.spawn_streamable_session(principal),
    };

    let guard = SessionGuard::acquire(session.clone());
    let ServerTransportKind::Streamable(transport) = session.transport() else {
        return (StatusCode::BAD_REQUEST, "session bound to a different encoding").into_response();
    };
    let transport = transport.clone();
    let session_id = session.id().clone();

    match transport.handle_post(&body) {
        Ok(PostOutcome::Accepted) => {
            drop(guard);
            (
                StatusCode::ACCEPTED,
                [(wire_headers::MCP_SESSION_ID, session_id.as_str().to_string())],
            )
                .into_response()
        }
        Ok(PostOutcome::Streaming(mut stream)) => {
            let body_stream = async_stream::stream! {
                let _guard = guard;
                while let Some(frame) = stream.next_frame().await {
                    yield Ok::<_, std::convert::Infallible>(Bytes::from(frame));
                }
            };
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, wire_headers::CONTENT_TYPE_SSE)
                .header(header::CACHE_CONTROL, "no-cache")
                .header(wire_headers::MCP_SESSION_ID, session_id.as_str())
                .body(Body::from_stream(body_stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => transport_error_response(err),
    }
}

async fn streamable_get(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_security(&state, &headers, addr) {
        return resp;
    }
    let principal = principal_from_headers(&headers);

    let id = match session_id_header(&headers) {
        Some(Ok(id)) => id,
        Some(Err(resp)) => return resp,
        None => return (StatusCode::BAD_REQUEST, "Mcp-Session-Id required").into_response(),
    };
    let session = match state.registry.get_for_user(&id, principal.as_ref()) {
        Ok(session) => session,
        Err(err) => return transport_error_response(err),
    };
    let guard = SessionGuard::acquire(session.clone());
    let ServerTransportKind::Streamable(transport) = session.transport() else {
        return (StatusCode::BAD_REQUEST, "session bound to a different encoding").into_response();
    };
    let transport = transport.clone();
    let keep_alive = state.config.keep_alive;

    let body_stream = async_stream::stream! {
        let _guard = guard;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let pump = transport.handle_get(
            keep_alive,
            move |frame| tx.send(frame).is_ok(),
            std::future::pending::<()>(),
        );
        tokio::pin!(pump);
        loop {
            tokio::select! {
                _ = &mut pump => break,
                Some(frame) = rx.recv() => yield Ok::<_, std::convert::Infallible>(Bytes::from(frame)),
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, wire_headers::CONTENT_TYPE_SSE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn streamable_delete(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_security(&state, &headers, addr) {
        return resp;
    }
    let principal = principal_from_headers(&headers);

    let id = match session_id_header(&headers) {
        Some(Ok(id)) => id,
        Some(Err(resp)) => return resp,
        None => return (StatusCode::BAD_REQUEST, "Mcp-Session-Id required").into_response(),
    };
    match state.registry.get_for_user(&id, principal.as_ref()) {
        Ok(_) => {
            state.registry.delete(&id);
            StatusCode::OK.into_response()
        }
        Err(err) => transport_error_response(err),
    }
}

async fn legacy_get(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_security(&state, &headers, addr) {
        return resp;
    }
    let principal = principal_from_headers(&headers);
    let session = state.spawn_legacy_session(principal);
    let guard = SessionGuard::acquire(session.clone());
    let ServerTransportKind::LegacySse(transport) = session.transport() else {
        unreachable!("legacy_get always spawns a LegacySse session");
    };
    let transport = transport.clone();
    let keep_alive = state.config.keep_alive;

    let body_stream = async_stream::stream! {
        let _guard = guard;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let pump = transport.handle_get(
            keep_alive,
            move |frame| tx.send(frame).is_ok(),
            std::future::pending::<()>(),
        );
        tokio::pin!(pump);
        loop {
            tokio::select! {
                _ = &mut pump => break,
                Some(frame) = rx.recv() => yield Ok::<_, std::convert::Infallible>(Bytes::from(frame)),
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, wire_headers::CONTENT_TYPE_SSE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(serde::Deserialize)]
struct LegacyPostQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn legacy_post(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<LegacyPostQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_security(&state, &headers, addr) {
        return resp;
    }
    let Ok(id) = query.session_id.parse::<SessionId>() else {
        return (StatusCode::BAD_REQUEST, "malformed sessionId").into_response();
    };
    let principal = principal_from_headers(&headers);
    let session = match state.registry.get_for_user(&id, principal.as_ref()) {
        Ok(session) => session,
        Err(err) => return transport_error_response(err),
    };
    let _guard = SessionGuard::acquire(session.clone());
    let ServerTransportKind::LegacySse(transport) = session.transport() else {
        return (StatusCode::BAD_REQUEST, "session bound to a different encoding").into_response();
    };

    match transport.handle_post(&body) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => transport_error_response(err),
    }
}
