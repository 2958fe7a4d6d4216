//! `passport-auth`: identity model and credential primitives.
//!
//! This crate is intentionally decoupled from transport and storage: it knows
//! how to hash a password and sign a token, not where either ends up.

pub mod claims;
pub mod identity;
pub mod password;
pub mod principal;
pub mod token;

pub use claims::{AccessClaims, ClaimsError, validate_claims};
pub use identity::{
    Identity, IdentityCreated, IdentityEvent, Profile, ProfileChanges, ProfileField,
    ProfileUpdated, validate_password, validate_username,
};
pub use password::{CredentialError, CredentialHasher, PasswordHashRecord};
pub use principal::AuthenticatedCaller;
pub use token::{
    AccessToken, IssuerConfig, RefreshToken, RefreshTokenDigest, TokenError, TokenIssuer,
    TokenPair,
};
