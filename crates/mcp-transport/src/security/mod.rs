//! Security module for transport layer
//!
//! Ambient HTTP-layer hardening carried on both wire encodings' endpoints,
//! independent of whatever authentication scheme an embedder layers on top:
//! - **Origin validation** to prevent DNS rebinding attacks (MCP spec compliance)
//! - **Authentication framework** with Bearer tokens, API keys, and custom headers
//! - **Rate limiting** with sliding window algorithm to prevent abuse
//! - **Message size validation** to prevent DoS attacks
//!
//! ## Architecture
//!
//! ```text
//! security/
//! ├── errors.rs      # Security error types
//! ├── origin.rs      # Origin validation (DNS rebinding protection)
//! ├── auth.rs        # Authentication configuration and validation
//! ├── rate_limit.rs  # Rate limiting with sliding window algorithm
//! ├── validator.rs   # Main SecurityValidator coordinating all checks
//! └── utils.rs       # Utility functions and common operations
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_transport::security::{SecurityValidator, OriginConfig, AuthConfig, RateLimitConfig};
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a security validator with explicit configuration
//! let validator = SecurityValidator::new(
//!     OriginConfig {
//!         allowed_origins: vec!["https://app.example.com".to_string()].into_iter().collect(),
//!         allow_localhost: false,
//!         allow_any: false,
//!     },
//!     AuthConfig {
//!         require_auth: true,
//!         api_keys: vec!["your-secret-api-key".to_string()].into_iter().collect(),
//!         method: mcp_transport::security::AuthMethod::Bearer,
//!     },
//!     Some(RateLimitConfig {
//!         max_requests: 100,
//!         window: Duration::from_secs(60),
//!         enabled: true,
//!     }),
//! );
//!
//! // Validate a request
//! let mut headers = HashMap::new();
//! headers.insert("Origin".to_string(), "https://app.example.com".to_string());
//! headers.insert("Authorization".to_string(), "Bearer your-secret-api-key".to_string());
//!
//! let client_ip = "192.168.1.100".parse()?;
//! validator.validate_request(&headers, client_ip)?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod errors;
pub mod origin;
pub mod rate_limit;
pub mod utils;
pub mod validator;

// Re-export all main types for convenience
pub use auth::{AuthConfig, AuthMethod, validate_authentication};
pub use errors::SecurityError;
pub use origin::{OriginConfig, validate_origin};
pub use rate_limit::{RateLimitConfig, RateLimiter, check_rate_limit};
pub use utils::{
    HeaderValue, SecurityHeaders, create_cors_headers, create_security_headers, extract_api_key,
    extract_bearer_token, extract_client_ip, generate_secure_token, is_localhost_origin,
    is_safe_header_value, sanitize_header_value, size_limits, validate_json_size,
    validate_message_size, validate_string_size,
};
pub use validator::SecurityValidator;
