//! Identity entity: one user record, its credentials and its profile.
//!
//! Mutations queue domain events on the entity; they are only delivered once
//! the transaction that persists the entity has committed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use passport_core::{AggregateRoot, DomainError, DomainResult, IdentityId};
use passport_events::Event;

use crate::password::PasswordHashRecord;
use crate::token::RefreshTokenDigest;

const MAX_USERNAME_LEN: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Profile
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable, user-facing profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub birth_date: Option<NaiveDate>,
}

impl Profile {
    /// Trim text fields, turn blanks into `None` and check the email shape.
    pub fn normalized(self) -> DomainResult<Self> {
        let email = non_blank(self.email);
        if let Some(email) = &email {
            validate_email(email)?;
        }
        Ok(Self {
            display_name: non_blank(self.display_name),
            email,
            age: self.age,
            birth_date: self.birth_date,
        })
    }
}

/// A partial profile update. `None` and blank strings leave a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub birth_date: Option<NaiveDate>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        non_blank(self.display_name.clone()).is_none()
            && non_blank(self.email.clone()).is_none()
            && self.age.is_none()
            && self.birth_date.is_none()
    }
}

/// Field touched by a profile update, reported in [`ProfileUpdated`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    DisplayName,
    Email,
    Age,
    BirthDate,
    Password,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_email(email: &str) -> DomainResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DomainError::validation("invalid email format")),
    }
}

/// Normalize and check a username. Returns the trimmed form that is stored.
pub fn validate_username(username: &str) -> DomainResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username cannot be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(format!(
            "username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("username cannot contain whitespace"));
    }
    Ok(username.to_string())
}

pub fn validate_password(password: &str) -> DomainResult<()> {
    if password.trim().is_empty() {
        return Err(DomainError::validation("password cannot be empty"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCreated {
    pub identity_id: IdentityId,
    pub username: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub identity_id: IdentityId,
    pub changed: Vec<ProfileField>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityEvent {
    Created(IdentityCreated),
    ProfileUpdated(ProfileUpdated),
}

impl IdentityEvent {
    pub const CREATED: &'static str = "identity.created";
    pub const PROFILE_UPDATED: &'static str = "identity.profile_updated";
}

impl Event for IdentityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IdentityEvent::Created(_) => Self::CREATED,
            IdentityEvent::ProfileUpdated(_) => Self::PROFILE_UPDATED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IdentityEvent::Created(e) => e.occurred_at,
            IdentityEvent::ProfileUpdated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// One user record.
///
/// # Invariants
/// - `username` is fixed at registration.
/// - Only a PHC hash of the password is held, never the plaintext.
/// - At most one refresh token is live: storing a new digest replaces the old.
/// - A soft-deleted identity is invisible to normal lookups.
#[derive(Debug, Clone)]
pub struct Identity {
    id: IdentityId,
    username: String,
    password_hash: PasswordHashRecord,
    profile: Profile,
    refresh_token: Option<RefreshTokenDigest>,
    refresh_token_expires_at: Option<DateTime<Utc>>,
    deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    pending_events: Vec<IdentityEvent>,
}

impl AggregateRoot for Identity {
    type Id = IdentityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Identity {
    /// Build a new, not yet persisted identity and queue `identity.created`.
    ///
    /// Username uniqueness is the store's concern, not the entity's.
    pub fn register(
        id: IdentityId,
        username: &str,
        password_hash: PasswordHashRecord,
        profile: Profile,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let username = validate_username(username)?;
        let profile = profile.normalized()?;

        let mut identity = Self {
            id,
            username: username.clone(),
            password_hash,
            profile,
            refresh_token: None,
            refresh_token_expires_at: None,
            deleted: false,
            created_at: now,
            updated_at: now,
            version: 0,
            pending_events: Vec::new(),
        };
        identity.record_event(IdentityEvent::Created(IdentityCreated {
            identity_id: id,
            username,
            occurred_at: now,
        }));
        Ok(identity)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash(&self) -> &PasswordHashRecord {
        &self.password_hash
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn refresh_token(&self) -> Option<&RefreshTokenDigest> {
        self.refresh_token.as_ref()
    }

    pub fn refresh_token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.refresh_token_expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Replace the stored refresh token. The previous one stops matching.
    pub fn update_refresh_token(
        &mut self,
        digest: RefreshTokenDigest,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.refresh_token = Some(digest);
        self.refresh_token_expires_at = Some(expires_at);
        self.updated_at = now;
    }

    pub fn has_refresh_token(&self, presented: &RefreshTokenDigest) -> bool {
        self.refresh_token.as_ref() == Some(presented)
    }

    /// True when no refresh token is stored or its expiry has passed.
    pub fn is_refresh_token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.refresh_token_expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    /// Apply a partial update and return the fields that actually changed.
    ///
    /// A supplied `password_hash` always counts as a change. Queues
    /// `identity.profile_updated` when the returned list is non-empty.
    pub fn apply_profile_changes(
        &mut self,
        changes: &ProfileChanges,
        password_hash: Option<PasswordHashRecord>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<ProfileField>> {
        let display_name = non_blank(changes.display_name.clone());
        let email = non_blank(changes.email.clone());
        if let Some(email) = &email {
            validate_email(email)?;
        }

        let mut changed = Vec::new();

        if display_name.is_some() && display_name != self.profile.display_name {
            self.profile.display_name = display_name;
            changed.push(ProfileField::DisplayName);
        }
        if email.is_some() && email != self.profile.email {
            self.profile.email = email;
            changed.push(ProfileField::Email);
        }
        if changes.age.is_some() && changes.age != self.profile.age {
            self.profile.age = changes.age;
            changed.push(ProfileField::Age);
        }
        if changes.birth_date.is_some() && changes.birth_date != self.profile.birth_date {
            self.profile.birth_date = changes.birth_date;
            changed.push(ProfileField::BirthDate);
        }
        if let Some(hash) = password_hash {
            self.password_hash = hash;
            changed.push(ProfileField::Password);
        }

        if !changed.is_empty() {
            self.updated_at = now;
            self.record_event(IdentityEvent::ProfileUpdated(ProfileUpdated {
                identity_id: self.id,
                changed: changed.clone(),
                occurred_at: now,
            }));
        }

        Ok(changed)
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted = true;
        self.updated_at = now;
    }

    pub fn pending_events(&self) -> &[IdentityEvent] {
        &self.pending_events
    }

    /// Drain queued events. Called by the store when it commits a write.
    pub fn take_pending_events(&mut self) -> Vec<IdentityEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Set the version a store assigned on commit.
    pub fn set_persisted_version(&mut self, version: u64) {
        self.version = version;
    }

    fn record_event(&mut self, event: IdentityEvent) {
        self.pending_events.push(event);
    }
}
