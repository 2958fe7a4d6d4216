//! Identity lifecycle orchestration.
//!
//! Every mutating flow follows the same shape:
//!
//! ```text
//! request
//!   ↓
//! 1. Read and check current state through the repository
//!   ↓
//! 2. Hash/verify credentials on a blocking thread
//!   ↓
//! 3. Begin a transaction, stage the mutated identity
//!   ↓
//! 4. Commit under a timeout (events flushed after durability)
//!   ↓
//! response | ServiceError
//! ```
//!
//! An open transaction is rolled back on every exit path other than a
//! successful commit: explicitly on handled failures, by its destructor on
//! early returns and cancellation. Nothing here retries.

mod error;
mod views;

pub use error::ServiceError;
pub use views::{
    CreateIdentity, Credentials, IdentityDetail, IdentitySummary, ProfileUpdate, RefreshTokens,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use passport_auth::{
    AuthenticatedCaller, CredentialHasher, Identity, PasswordHashRecord, RefreshTokenDigest,
    TokenIssuer, TokenPair, validate_password, validate_username,
};
use passport_core::{AggregateRoot, IdentityId};

use crate::store::{
    CommitOutcome, CommitPolicy, IdentityStore, Transaction, TransactionError, UnitOfWork,
};

/// The identity use-case layer.
///
/// Cheap to share behind an `Arc`; flows for different identities run
/// concurrently and serialize only at the store's commit.
pub struct IdentityService<S> {
    store: S,
    hasher: Arc<CredentialHasher>,
    issuer: Arc<TokenIssuer>,
    commit_timeout: Duration,
}

impl<S> core::fmt::Debug for IdentityService<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityService")
            .field("issuer", &self.issuer)
            .field("commit_timeout", &self.commit_timeout)
            .finish_non_exhaustive()
    }
}

impl<S: IdentityStore> IdentityService<S> {
    pub fn new(
        store: S,
        hasher: CredentialHasher,
        issuer: TokenIssuer,
        commit_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hasher: Arc::new(hasher),
            issuer: Arc::new(issuer),
            commit_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Register a new identity and return its detail view.
    #[tracing::instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create(&self, request: CreateIdentity) -> Result<IdentityDetail, ServiceError> {
        let CreateIdentity {
            username,
            password,
            profile,
        } = request;

        let username = validate_username(&username)?;
        validate_password(&password)?;

        if self.store.exists_by_username(&username).await? {
            warn!("username already taken");
            return Err(ServiceError::DuplicateUsername);
        }

        let password_hash = self.hash_password(password).await?;
        let identity =
            Identity::register(IdentityId::new(), &username, password_hash, profile, Utc::now())?;
        let detail = IdentityDetail::from(&identity);

        let work = self.store.unit_of_work();
        let mut tx = work.begin().await?;
        tx.insert(identity);

        // Lost a race against a concurrent create of the same username.
        self.commit(tx, CommitPolicy::Dispatch)
            .await
            .map_err(|err| match err {
                TransactionError::Conflict(_) => ServiceError::DuplicateUsername,
                other => other.into(),
            })?;

        info!(identity_id = %detail.id, "identity created");
        Ok(detail)
    }

    /// Check credentials and issue a fresh token pair.
    ///
    /// The new refresh token replaces whatever was stored before.
    #[tracing::instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn authenticate(&self, credentials: Credentials) -> Result<TokenPair, ServiceError> {
        let Credentials { username, password } = credentials;

        let Some(mut identity) = self.store.find_by_username(username.trim()).await? else {
            warn!("authentication failed: unknown username");
            return Err(ServiceError::Unauthorized);
        };

        let record = identity.password_hash().clone();
        if !self.verify_password(password, record).await? {
            warn!(identity_id = %identity.id(), "authentication failed: password mismatch");
            return Err(ServiceError::Unauthorized);
        }

        let pair = self.rotate_tokens(&mut identity).await?;
        info!(identity_id = %identity.id(), "identity authenticated");
        Ok(pair)
    }

    /// Exchange a valid refresh token (plus the access token it was issued
    /// with) for a new pair. The presented refresh token stops working.
    ///
    /// The access token may be expired here; only its signature is checked,
    /// to learn whose refresh token is being presented.
    #[tracing::instrument(skip(self, request))]
    pub async fn refresh_token(&self, request: RefreshTokens) -> Result<TokenPair, ServiceError> {
        let identity_id = self
            .issuer
            .recover_identity_id(&request.access_token)
            .map_err(|_| {
                warn!("refresh rejected: access token not issued by us");
                ServiceError::Unauthorized
            })?;

        let Some(mut identity) = self.store.find_by_id(identity_id).await? else {
            warn!(%identity_id, "refresh rejected: identity missing");
            return Err(ServiceError::Unauthorized);
        };

        let presented = RefreshTokenDigest::of(&request.refresh_token);
        if !identity.has_refresh_token(&presented) {
            warn!(%identity_id, "refresh rejected: token mismatch");
            return Err(ServiceError::Unauthorized);
        }
        if identity.is_refresh_token_expired(Utc::now()) {
            warn!(%identity_id, "refresh rejected: token expired");
            return Err(ServiceError::Unauthorized);
        }

        let pair = self.rotate_tokens(&mut identity).await?;
        info!(%identity_id, "tokens refreshed");
        Ok(pair)
    }

    /// Self-service partial update of the caller's own identity.
    #[tracing::instrument(skip(self, caller, update), fields(identity_id = %caller.identity_id()))]
    pub async fn update_profile(
        &self,
        caller: &AuthenticatedCaller,
        update: ProfileUpdate,
    ) -> Result<IdentityDetail, ServiceError> {
        let ProfileUpdate { password, changes } = update;

        let Some(mut identity) = self.store.find_by_id(caller.identity_id()).await? else {
            return Err(ServiceError::NotFound);
        };

        let password_hash = match password.filter(|p| !p.trim().is_empty()) {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };

        let work = self.store.unit_of_work();
        let mut tx = work.begin().await?;

        let changed = match identity.apply_profile_changes(&changes, password_hash, Utc::now()) {
            Ok(changed) => changed,
            Err(err) => {
                tx.rollback().await;
                return Err(err.into());
            }
        };

        if changed.is_empty() {
            tx.rollback().await;
            return Ok(IdentityDetail::from(&identity));
        }

        let detail = IdentityDetail::from(&identity);
        tx.update(identity);
        self.commit(tx, CommitPolicy::Dispatch).await?;

        info!(?changed, "profile updated");
        Ok(detail)
    }

    /// Public summary of an identity.
    #[tracing::instrument(skip(self))]
    pub async fn get_one(&self, id: IdentityId) -> Result<IdentitySummary, ServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .map(|identity| IdentitySummary::from(&identity))
            .ok_or(ServiceError::NotFound)
    }

    /// Detail view of the identity an access token was issued to.
    ///
    /// The token must be valid and unexpired.
    #[tracing::instrument(skip(self, access_token))]
    pub async fn get_info(&self, access_token: &str) -> Result<IdentityDetail, ServiceError> {
        let identity_id = self.issuer.validate_access_token(access_token)?;
        self.store
            .find_by_id(identity_id)
            .await?
            .map(|identity| IdentityDetail::from(&identity))
            .ok_or(ServiceError::NotFound)
    }

    /// Resolve an access token to the caller it proves.
    pub fn authenticate_caller(
        &self,
        access_token: &str,
    ) -> Result<AuthenticatedCaller, ServiceError> {
        Ok(self.issuer.authenticate(access_token)?)
    }

    /// Issue a new pair and persist its refresh digest on `identity`.
    async fn rotate_tokens(&self, identity: &mut Identity) -> Result<TokenPair, ServiceError> {
        let (pair, refresh) = self.issuer.issue_pair(*identity.id())?;
        identity.update_refresh_token(refresh.digest(), refresh.expires_at(), Utc::now());

        let work = self.store.unit_of_work();
        let mut tx = work.begin().await?;
        tx.update(identity.clone());
        self.commit(tx, CommitPolicy::Silent).await?;

        Ok(pair)
    }

    async fn commit<T: Transaction>(
        &self,
        tx: T,
        policy: CommitPolicy,
    ) -> Result<CommitOutcome, TransactionError> {
        // An elapsed timeout drops the commit future, and with it the
        // transaction, before anything was applied.
        match tokio::time::timeout(self.commit_timeout, tx.commit(policy)).await {
            Ok(result) => result,
            Err(_) => Err(TransactionError::TimedOut),
        }
    }

    async fn hash_password(&self, password: String) -> Result<PasswordHashRecord, ServiceError> {
        let hasher = Arc::clone(&self.hasher);
        let record = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| {
                tracing::error!(cause = %err, "hashing task failed");
                ServiceError::Fatal("credential processing aborted".to_string())
            })??;
        Ok(record)
    }

    async fn verify_password(
        &self,
        password: String,
        record: PasswordHashRecord,
    ) -> Result<bool, ServiceError> {
        let hasher = Arc::clone(&self.hasher);
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &record))
            .await
            .map_err(|err| {
                tracing::error!(cause = %err, "verification task failed");
                ServiceError::Fatal("credential processing aborted".to_string())
            })??;
        Ok(matches)
    }
}
