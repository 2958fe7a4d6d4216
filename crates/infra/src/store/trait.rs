use async_trait::async_trait;
use thiserror::Error;

use passport_auth::Identity;
use passport_core::IdentityId;

use super::unit_of_work::UnitOfWork;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backing store could not serve the request.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed lookups over identity records.
///
/// Soft-deleted identities are invisible to every method here.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, RepositoryError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError>;
}

/// A repository that can also open transactions against itself.
pub trait IdentityStore: IdentityRepository {
    type Work: UnitOfWork;

    /// A fresh unit of work, scoped to one logical request.
    fn unit_of_work(&self) -> Self::Work;
}
