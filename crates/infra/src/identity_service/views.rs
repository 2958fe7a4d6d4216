//! Plain request and response values of the identity flows.
//!
//! Secrets in requests are redacted from `Debug` output.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use passport_auth::{Identity, Profile, ProfileChanges};
use passport_core::{AggregateRoot, IdentityId};

#[derive(Clone, Deserialize)]
pub struct CreateIdentity {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub profile: Profile,
}

impl core::fmt::Debug for CreateIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CreateIdentity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The token pair a client presents to rotate it.
#[derive(Clone, Deserialize)]
pub struct RefreshTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl core::fmt::Debug for RefreshTokens {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("RefreshTokens(<redacted>)")
    }
}

/// Self-service profile update. `None` or blank values leave fields as is.
#[derive(Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub password: Option<String>,
    #[serde(flatten)]
    pub changes: ProfileChanges,
}

impl core::fmt::Debug for ProfileUpdate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProfileUpdate")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("changes", &self.changes)
            .finish()
    }
}

/// Full view of an identity, for its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDetail {
    pub id: IdentityId,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityDetail {
    fn from(identity: &Identity) -> Self {
        let profile = identity.profile();
        Self {
            id: *identity.id(),
            username: identity.username().to_string(),
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            age: profile.age,
            birth_date: profile.birth_date,
            created_at: identity.created_at(),
            updated_at: identity.updated_at(),
        }
    }
}

/// Public view of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub id: IdentityId,
    pub username: String,
    pub display_name: Option<String>,
}

impl From<&Identity> for IdentitySummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: *identity.id(),
            username: identity.username().to_string(),
            display_name: identity.profile().display_name.clone(),
        }
    }
}
