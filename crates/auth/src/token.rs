//! Access/refresh token issuance and validation.
//!
//! Access tokens are HS256 JWTs carrying the identity id and an expiry.
//! Refresh tokens are opaque random strings; only their SHA-256 digest is
//! ever stored.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use passport_core::IdentityId;

use crate::claims::{AccessClaims, ClaimsError, validate_claims};
use crate::principal::AuthenticatedCaller;

const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Signing material and lifetimes, fixed for the life of the process.
#[derive(Clone)]
pub struct IssuerConfig {
    secret: Vec<u8>,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl IssuerConfig {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        access_token_ttl: Duration,
        refresh_token_ttl: Duration,
    ) -> Self {
        Self {
            secret: secret.into(),
            access_token_ttl,
            refresh_token_ttl,
        }
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }
}

impl core::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

/// A signed access token and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// A freshly minted opaque refresh token and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn digest(&self) -> RefreshTokenDigest {
        RefreshTokenDigest::of(&self.value)
    }
}

/// Hex SHA-256 of a refresh token, the only form kept at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshTokenDigest(String);

impl RefreshTokenDigest {
    pub fn of(raw: &str) -> Self {
        Self(hex::encode(Sha256::digest(raw.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Access + refresh token pair handed back to the caller.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl core::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

impl TokenPair {
    pub fn new(access: AccessToken, refresh: RefreshToken) -> Self {
        Self {
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            access_token: access.value,
            refresh_token: refresh.value,
        }
    }
}

/// Stateless issuer/validator over process-wide signing material.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: &IssuerConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(&config.secret),
            decoding: DecodingKey::from_secret(&config.secret),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
        }
    }

    pub fn issue_access_token(&self, identity_id: IdentityId) -> Result<AccessToken, TokenError> {
        self.issue_access_token_at(identity_id, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        identity_id: IdentityId,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, TokenError> {
        let expires_at = now + self.access_token_ttl;
        let claims = AccessClaims {
            sub: identity_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let value = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(AccessToken { value, expires_at })
    }

    pub fn issue_refresh_token(&self) -> RefreshToken {
        self.issue_refresh_token_at(Utc::now())
    }

    pub fn issue_refresh_token_at(&self, now: DateTime<Utc>) -> RefreshToken {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        RefreshToken {
            value: URL_SAFE_NO_PAD.encode(bytes),
            expires_at: now + self.refresh_token_ttl,
        }
    }

    /// Issue a fresh access/refresh pair for `identity_id`.
    ///
    /// Returns the raw refresh token alongside the pair so the caller can
    /// store its digest.
    pub fn issue_pair(
        &self,
        identity_id: IdentityId,
    ) -> Result<(TokenPair, RefreshToken), TokenError> {
        let now = Utc::now();
        let access = self.issue_access_token_at(identity_id, now)?;
        let refresh = self.issue_refresh_token_at(now);
        Ok((TokenPair::new(access, refresh.clone()), refresh))
    }

    /// Full validation: signature and expiry.
    pub fn validate_access_token(&self, token: &str) -> Result<IdentityId, TokenError> {
        self.validate_access_token_at(token, Utc::now())
    }

    pub fn validate_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<IdentityId, TokenError> {
        let claims = self.verified_claims(token)?;
        validate_claims(&claims, now).map_err(|e| match e {
            ClaimsError::Expired => TokenError::Expired,
            ClaimsError::NotYetValid | ClaimsError::InvalidTimeWindow => TokenError::InvalidToken,
        })?;
        Ok(claims.sub)
    }

    /// Validate an access token and wrap its subject as the calling identity.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedCaller, TokenError> {
        self.validate_access_token(token)
            .map(AuthenticatedCaller::new)
    }

    /// Signature-checked subject of a possibly expired token.
    ///
    /// Only the refresh flow uses this: an expired access token is exactly
    /// what a client holds when it comes to refresh. The refresh token is the
    /// actual credential on that path.
    pub fn recover_identity_id(&self, token: &str) -> Result<IdentityId, TokenError> {
        self.verified_claims(token).map(|c| c.sub)
    }

    /// Subject of a token with **no** signature or expiry check.
    ///
    /// Must not be used for trust decisions.
    pub fn extract_identity_id(&self, token: &str) -> Result<IdentityId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;

        decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims.sub)
            .map_err(|_| TokenError::InvalidToken)
    }

    fn verified_claims(&self, token: &str) -> Result<AccessClaims, TokenError> {
        // Expiry is judged by `validate_claims` so callers can pin `now`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer_with_secret(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&IssuerConfig::new(
            secret,
            Duration::minutes(15),
            Duration::days(7),
        ))
    }

    fn issuer() -> TokenIssuer {
        issuer_with_secret("an-adequately-long-test-signing-secret")
    }

    #[test]
    fn issued_token_validates_to_its_subject() {
        let issuer = issuer();
        let id = IdentityId::new();
        let token = issuer.issue_access_token(id).unwrap();
        assert_eq!(issuer.validate_access_token(token.as_str()).unwrap(), id);
    }

    #[test]
    fn expired_token_is_rejected_but_recoverable() {
        let issuer = issuer();
        let id = IdentityId::new();
        let token = issuer
            .issue_access_token_at(id, Utc::now() - Duration::hours(2))
            .unwrap();

        assert_eq!(
            issuer.validate_access_token(token.as_str()),
            Err(TokenError::Expired)
        );
        assert_eq!(issuer.recover_identity_id(token.as_str()).unwrap(), id);
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let id = IdentityId::new();
        let token = issuer_with_secret("some-other-service-entirely-secret")
            .issue_access_token(id)
            .unwrap();

        let issuer = issuer();
        assert_eq!(
            issuer.validate_access_token(token.as_str()),
            Err(TokenError::InvalidToken)
        );
        assert_eq!(
            issuer.recover_identity_id(token.as_str()),
            Err(TokenError::InvalidToken)
        );
        // The untrusted path still reads the subject.
        assert_eq!(issuer.extract_identity_id(token.as_str()).unwrap(), id);
    }

    #[test]
    fn tampered_token_is_invalid() {
        let issuer = issuer();
        let token = issuer.issue_access_token(IdentityId::new()).unwrap();
        let mut tampered = token.as_str().to_string();
        tampered.push('x');
        assert_eq!(
            issuer.validate_access_token(&tampered),
            Err(TokenError::InvalidToken)
        );
    }

    #[test]
    fn garbage_is_invalid_everywhere() {
        let issuer = issuer();
        assert_eq!(issuer.validate_access_token("nope"), Err(TokenError::InvalidToken));
        assert_eq!(issuer.extract_identity_id("nope"), Err(TokenError::InvalidToken));
    }

    #[test]
    fn refresh_tokens_are_random_and_opaque() {
        let issuer = issuer();
        let a = issuer.issue_refresh_token();
        let b = issuer.issue_refresh_token();
        assert_ne!(a.as_str(), b.as_str());
        // 32 bytes, base64url without padding.
        assert_eq!(a.as_str().len(), 43);
        assert!(!a.as_str().contains('='));
    }

    #[test]
    fn pair_carries_both_expiries() {
        let issuer = issuer();
        let (pair, refresh) = issuer.issue_pair(IdentityId::new()).unwrap();
        assert_eq!(pair.refresh_token, refresh.as_str());
        assert!(pair.access_expires_at < pair.refresh_expires_at);
        let debug = format!("{pair:?}");
        assert!(!debug.contains(&pair.refresh_token));
        assert!(!debug.contains(&pair.access_token));
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = RefreshTokenDigest::of("opaque");
        assert_eq!(digest, RefreshTokenDigest::of("opaque"));
        assert_ne!(digest, RefreshTokenDigest::of("opaque2"));
        assert_eq!(digest.as_str().len(), 64);
    }

    #[test]
    fn authenticate_wraps_subject() {
        let issuer = issuer();
        let id = IdentityId::new();
        let token = issuer.issue_access_token(id).unwrap();
        assert_eq!(issuer.authenticate(token.as_str()).unwrap().identity_id(), id);
    }
}
