//! Infrastructure layer: identity storage, transactions, configuration and
//! the identity lifecycle service that composes them.

pub mod config;
pub mod identity_service;
pub mod store;

pub use config::{ConfigError, HashingSettings, Settings, StoreSettings, TokenSettings};
pub use identity_service::{
    CreateIdentity, Credentials, IdentityDetail, IdentityService, IdentitySummary, ProfileUpdate,
    RefreshTokens, ServiceError,
};
pub use store::{
    CommitOutcome, CommitPolicy, IdentityRepository, IdentityStore, InMemoryIdentityStore,
    InMemoryTransaction, InMemoryUnitOfWork, RepositoryError, Transaction, TransactionError,
    UnitOfWork,
};
