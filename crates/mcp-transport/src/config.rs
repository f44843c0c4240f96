//! Configuration types for the server and client sides of both wire
//! encodings, following the teacher's fluent `with_*`/`allow_*` builder
//! style.

use std::net::SocketAddr;
use std::time::Duration;

use crate::security::{OriginConfig, RateLimitConfig};

/// Server-side configuration shared by the Streamable HTTP and legacy
/// HTTP+SSE endpoints.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Single endpoint path for the Streamable HTTP transport.
    pub endpoint_path: String,
    /// Long-lived GET stream path for the legacy transport.
    pub sse_path: String,
    /// POST path for the legacy transport (the session id is carried as a query parameter).
    pub message_path: String,
    pub keep_alive: Duration,
    pub origin: OriginConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            endpoint_path: "/mcp".to_string(),
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            keep_alive: Duration::from_secs(30),
            origin: OriginConfig::default(),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    pub fn with_sse_path(mut self, path: impl Into<String>) -> Self {
        self.sse_path = path.into();
        self
    }

    pub fn with_message_path(mut self, path: impl Into<String>) -> Self {
        self.message_path = path.into();
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn allow_localhost(mut self, allow: bool) -> Self {
        self.origin.allow_localhost = allow;
        self
    }

    pub fn allow_any_origin(mut self, allow: bool) -> Self {
        self.origin.allow_any = allow;
        self
    }

    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit = None;
        self
    }
}

/// Reconnect policy for the legacy SSE client's long-lived GET stream.
/// Not used for the one-shot auto-detect probe.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    Fixed {
        interval: Duration,
        max_attempts: u32,
    },
    Exponential {
        base: Duration,
        max_delay: Duration,
        max_attempts: u32,
    },
    Never,
}

impl RetryPolicy {
    /// The delay to wait before the given reconnect attempt (1-indexed), or
    /// `None` once `max_attempts` has been exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::Fixed {
                interval,
                max_attempts,
            } => (attempt <= *max_attempts).then_some(*interval),
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if attempt > *max_attempts {
                    return None;
                }
                let scaled = base.saturating_mul(1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX));
                Some(scaled.min(*max_delay))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Client configuration common to both the Streamable HTTP and legacy SSE
/// client transports, and to the auto-detect wrapper.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub auth_token: Option<String>,
    pub user_agent: String,
    pub protocol_version: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            auth_token: None,
            user_agent: format!("mcp-transport-core-client/{}", env!("CARGO_PKG_VERSION")),
            protocol_version: "2025-06-18".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}
