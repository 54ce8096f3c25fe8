//! Credential provider
//!
//! The calling service authenticates with a JWT issued for the device user.
//! The device cannot verify the issuer's signature (it has no key), so
//! authorization here means "the token is structurally a JWT, names a
//! subject, and has not expired". Anything else leaves the provider
//! unauthorized. Failures are never returned as errors; callers observe them
//! through [`Authenticator::is_authorized`].

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Clock skew tolerated when checking `exp`
const EXPIRY_LEEWAY_SECS: u64 = 60;

/// Black-box credential provider consumed by the coordinator
pub trait Authenticator: Send + Sync {
    /// Validate and store a token. Invalid tokens leave the provider unauthorized.
    fn authorize(&self, token: &str);

    /// Forget any stored token
    fn deauthorize(&self);

    /// Whether a usable token is stored
    fn is_authorized(&self) -> bool;

    /// The stored token, if it is still usable
    fn access_token(&self) -> Option<String>;
}

/// Claims the calling backend puts in device tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issuer (organization)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

#[derive(Debug, Clone)]
struct StoredToken {
    raw: String,
    claims: TokenClaims,
}

impl StoredToken {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .exp
            .and_then(|exp| i64::try_from(exp).ok())
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    fn is_expired(&self) -> bool {
        match self.claims.exp {
            Some(exp) => exp.saturating_add(EXPIRY_LEEWAY_SECS) < Utc::now().timestamp() as u64,
            None => false,
        }
    }
}

/// JWT-backed [`Authenticator`]
#[derive(Debug, Default)]
pub struct JwtAuthenticator {
    token: RwLock<Option<StoredToken>>,
}

impl JwtAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subject of the stored token
    pub fn subject(&self) -> Option<String> {
        self.token.read().as_ref().map(|t| t.claims.sub.clone())
    }

    /// Display name claim of the stored token
    pub fn display_name(&self) -> Option<String> {
        self.token.read().as_ref().and_then(|t| t.claims.name.clone())
    }

    /// Expiry of the stored token, when it has one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.read().as_ref().and_then(StoredToken::expires_at)
    }

    fn validate(token: &str) -> Result<TokenClaims, String> {
        let token = token.trim();
        if token.is_empty() {
            return Err("token is empty".to_string());
        }

        let header = decode_header(token).map_err(|e| format!("malformed header: {e}"))?;

        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.leeway = EXPIRY_LEEWAY_SECS;
        validation.required_spec_claims = HashSet::from(["sub".to_string()]);

        let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| format!("invalid token: {e}"))?;

        if data.claims.sub.trim().is_empty() {
            return Err("token subject is empty".to_string());
        }

        Ok(data.claims)
    }
}

impl Authenticator for JwtAuthenticator {
    fn authorize(&self, token: &str) {
        match Self::validate(token) {
            Ok(claims) => {
                info!(subject = %claims.sub, "Authorized with JWT");
                *self.token.write() = Some(StoredToken {
                    raw: token.trim().to_string(),
                    claims,
                });
            }
            Err(reason) => {
                warn!(%reason, "JWT rejected, staying unauthorized");
                *self.token.write() = None;
            }
        }
    }

    fn deauthorize(&self) {
        if self.token.write().take().is_some() {
            debug!("Deauthorized");
        }
    }

    fn is_authorized(&self) -> bool {
        self.token
            .read()
            .as_ref()
            .map(|t| !t.is_expired())
            .unwrap_or(false)
    }

    fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| t.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tracing_test::traced_test;

    fn token_with(claims: &TokenClaims) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(b"issuer-secret")).unwrap()
    }

    fn claims(sub: &str, exp: Option<u64>) -> TokenClaims {
        TokenClaims {
            sub: sub.to_string(),
            name: Some("Wilma".to_string()),
            iss: Some("example-org".to_string()),
            exp,
        }
    }

    #[test]
    fn valid_token_authorizes() {
        let auth = JwtAuthenticator::new();
        let exp = Utc::now().timestamp() as u64 + 3600;
        let token = token_with(&claims("wilma", Some(exp)));

        auth.authorize(&token);

        assert!(auth.is_authorized());
        assert_eq!(auth.subject().as_deref(), Some("wilma"));
        assert_eq!(auth.display_name().as_deref(), Some("Wilma"));
        assert_eq!(auth.access_token(), Some(token));
        assert_eq!(auth.expires_at().map(|t| t.timestamp() as u64), Some(exp));
    }

    #[test]
    fn token_without_expiry_is_accepted() {
        let auth = JwtAuthenticator::new();
        auth.authorize(&token_with(&claims("xavier", None)));
        assert!(auth.is_authorized());
        assert!(auth.expires_at().is_none());
    }

    #[test]
    fn empty_and_garbage_tokens_leave_unauthorized() {
        let auth = JwtAuthenticator::new();
        auth.authorize("");
        assert!(!auth.is_authorized());

        auth.authorize("paste-a-token-here");
        assert!(!auth.is_authorized());
        assert!(auth.access_token().is_none());
    }

    #[test]
    #[traced_test]
    fn rejection_is_logged() {
        let auth = JwtAuthenticator::new();
        auth.authorize("a.b");
        assert!(logs_contain("JWT rejected"));
    }

    #[test]
    fn far_future_expiry_stays_authorized() {
        let auth = JwtAuthenticator::new();
        let token = token_with(&claims("wilma", Some(u64::MAX)));

        auth.authorize(&token);

        assert!(auth.is_authorized());
        assert_eq!(auth.access_token(), Some(token));
        // beyond what a timestamp can represent
        assert!(auth.expires_at().is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = JwtAuthenticator::new();
        let exp = Utc::now().timestamp() as u64 - 3600;
        auth.authorize(&token_with(&claims("wilma", Some(exp))));
        assert!(!auth.is_authorized());
    }

    #[test]
    fn invalid_token_replaces_a_previous_good_one() {
        let auth = JwtAuthenticator::new();
        auth.authorize(&token_with(&claims("wilma", None)));
        assert!(auth.is_authorized());

        auth.authorize("not-a-jwt");
        assert!(!auth.is_authorized());
    }

    #[test]
    fn deauthorize_clears_state() {
        let auth = JwtAuthenticator::new();
        auth.authorize(&token_with(&claims("wilma", None)));
        auth.deauthorize();
        assert!(!auth.is_authorized());
        assert!(auth.subject().is_none());

        // second call is harmless
        auth.deauthorize();
    }
}
