//! Session identifiers.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes backing a session id (128 bits of entropy).
const SESSION_ID_BYTES: usize = 16;

/// Decoded length of a valid session id string: 16 bytes, url-safe base64,
/// no padding, is always 22 characters.
pub const SESSION_ID_LEN: usize = 22;

/// Error returned when a string cannot be parsed as a [`SessionId`].
#[derive(Debug, thiserror::Error)]
#[error("invalid session id")]
pub struct InvalidSessionId;

/// Unique identifier for a session, multiplexed across one server-side
/// transport instance.
///
/// Encoded as 16 cryptographically random bytes, url-safe base64 without
/// padding (22 characters). The encoding is opaque to clients; they must
/// treat it as a bearer token and echo it back verbatim in the
/// `Mcp-Session-Id` header.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new session id from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SESSION_ID_LEN || URL_SAFE_NO_PAD.decode(s).is_err() {
            return Err(InvalidSessionId);
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_22_chars_and_url_safe() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        let id = SessionId::generate();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("too-short".parse::<SessionId>().is_err());
    }

    #[test]
    fn rejects_non_base64() {
        // 22 chars but contains a character outside the url-safe alphabet.
        assert!("!!!!!!!!!!!!!!!!!!!!!!".parse::<SessionId>().is_err());
    }
}
