//! The derived identity of an authenticated principal.

use serde::{Deserialize, Serialize};

/// Claim types considered when deriving a [`UserIdClaim`], in priority order.
/// The first one present on the authenticated principal wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimType {
    NameIdentifier,
    Sub,
    Upn,
}

/// The identity a session is bound to, derived from the authenticated
/// principal at session-creation time.
///
/// Equality is by tuple equality of `(type, value, issuer)` — two claims
/// from different issuers, or of different types, are never considered the
/// same user even if their value happens to match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdClaim {
    pub claim_type: ClaimType,
    pub value: String,
    pub issuer: Option<String>,
}

impl UserIdClaim {
    pub fn new(claim_type: ClaimType, value: impl Into<String>, issuer: Option<String>) -> Self {
        Self {
            claim_type,
            value: value.into(),
            issuer,
        }
    }

    /// Pick the first present claim in priority order: `NameIdentifier`,
    /// then `sub`, then `UPN`. Returns `None` if the principal is
    /// unauthenticated or carries none of these.
    pub fn derive(
        name_identifier: Option<(&str, Option<&str>)>,
        sub: Option<(&str, Option<&str>)>,
        upn: Option<(&str, Option<&str>)>,
    ) -> Option<Self> {
        if let Some((value, issuer)) = name_identifier {
            return Some(Self::new(
                ClaimType::NameIdentifier,
                value,
                issuer.map(str::to_string),
            ));
        }
        if let Some((value, issuer)) = sub {
            return Some(Self::new(ClaimType::Sub, value, issuer.map(str::to_string)));
        }
        if let Some((value, issuer)) = upn {
            return Some(Self::new(ClaimType::Upn, value, issuer.map(str::to_string)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_name_identifier_over_sub_and_upn() {
        let claim = UserIdClaim::derive(
            Some(("alice", Some("issuer-a"))),
            Some(("alice-sub", None)),
            Some(("alice@corp", None)),
        )
        .unwrap();
        assert_eq!(claim.claim_type, ClaimType::NameIdentifier);
        assert_eq!(claim.value, "alice");
    }

    #[test]
    fn falls_back_to_sub_then_upn() {
        let claim = UserIdClaim::derive(None, Some(("alice-sub", None)), Some(("alice@corp", None)))
            .unwrap();
        assert_eq!(claim.claim_type, ClaimType::Sub);

        let claim = UserIdClaim::derive(None, None, Some(("alice@corp", None))).unwrap();
        assert_eq!(claim.claim_type, ClaimType::Upn);
    }

    #[test]
    fn none_when_unauthenticated() {
        assert!(UserIdClaim::derive(None, None, None).is_none());
    }

    #[test]
    fn equality_is_full_tuple_equality() {
        let a = UserIdClaim::new(ClaimType::Sub, "alice", Some("issuer-a".to_string()));
        let b = UserIdClaim::new(ClaimType::Sub, "alice", Some("issuer-b".to_string()));
        assert_ne!(a, b, "differing issuer must not compare equal");
    }
}
