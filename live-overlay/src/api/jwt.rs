//! Owner tokens.
//!
//! The account service issues HS256 tokens whose `sub` is the owner id. This
//! service only validates them; [`JwtService::generate_token`] exists for
//! tooling and tests.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

/// Lifetime of generated tokens when none is given.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Role allowed to change process-wide settings such as the log filter.
pub const ADMIN_ROLE: &str = "admin";

/// Clock skew tolerated on `exp`.
const LEEWAY_SECS: u64 = 30;

/// Claims carried by an owner token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Owner id.
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
}

impl Claims {
    pub fn owner_id(&self) -> &str {
        &self.sub
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to sign token: {0}")]
    Signing(String),
    #[error("Token expired")]
    Expired,
    #[error("Token has no owner")]
    MissingOwner,
    #[error("Token rejected: {0}")]
    Rejected(String),
}

/// Validates owner tokens against one shared secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl_secs: u64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: &str, audience: &str, ttl_secs: Option<u64>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = LEEWAY_SECS;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl_secs: ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        }
    }

    /// `None` when no secret is configured.
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        let secret = config.jwt_secret.as_deref()?;
        Some(Self::new(secret, &config.jwt_issuer, &config.jwt_audience, None))
    }

    /// Sign a token for `owner_id`.
    pub fn generate_token(&self, owner_id: &str, roles: Vec<String>) -> Result<String, JwtError> {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let claims = Claims {
            sub: owner_id.to_string(),
            roles,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: now + self.ttl_secs,
            iat: now,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Check signature, expiry, issuer and audience, and require an owner.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Rejected(e.to_string()),
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(JwtError::MissingOwner);
        }
        Ok(claims)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-32-chars-long!!";

    fn service() -> JwtService {
        JwtService::new(SECRET, "issuer", "audience", Some(3600))
    }

    fn sign(claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn claims_for(owner: &str, exp: u64) -> Claims {
        Claims {
            sub: owner.to_string(),
            roles: vec![],
            iss: "issuer".into(),
            aud: "audience".into(),
            exp,
            iat: 0,
        }
    }

    #[test]
    fn generated_token_carries_owner() {
        let jwt = service();
        let token = jwt.generate_token("alice", vec!["editor".into()]).unwrap();

        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.owner_id(), "alice");
        assert_eq!(claims.roles, vec!["editor"]);
    }

    #[test]
    fn wrong_secret_or_audience_is_rejected() {
        let token = service().generate_token("alice", vec![]).unwrap();

        let other_secret = JwtService::new("another-secret-key-32-chars-long", "issuer", "audience", None);
        assert!(matches!(
            other_secret.validate_token(&token),
            Err(JwtError::Rejected(_))
        ));

        let other_audience = JwtService::new(SECRET, "issuer", "elsewhere", None);
        assert!(matches!(
            other_audience.validate_token(&token),
            Err(JwtError::Rejected(_))
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let token = sign(&claims_for("alice", 1_000));
        assert!(matches!(service().validate_token(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn blank_owner_is_rejected() {
        let exp = u64::try_from(Utc::now().timestamp()).unwrap() + 600;
        let token = sign(&claims_for("  ", exp));
        assert!(matches!(
            service().validate_token(&token),
            Err(JwtError::MissingOwner)
        ));
    }

    #[test]
    fn tokens_without_roles_still_validate() {
        let exp = u64::try_from(Utc::now().timestamp()).unwrap() + 600;
        let payload = serde_json::json!({
            "sub": "bob",
            "iss": "issuer",
            "aud": "audience",
            "exp": exp,
            "iat": 0,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let claims = service().validate_token(&token).unwrap();
        assert_eq!(claims.owner_id(), "bob");
        assert!(claims.roles.is_empty());
    }

    #[test]
    fn unconfigured_secret_disables_service() {
        assert!(JwtService::from_config(&AuthConfig::default()).is_none());

        let config = AuthConfig {
            jwt_secret: Some("s3cret".into()),
            ..AuthConfig::default()
        };
        let jwt = JwtService::from_config(&config).unwrap();
        assert_eq!(jwt.issuer(), "live-overlay");
        assert_eq!(jwt.audience(), "live-overlay-api");
    }
}
