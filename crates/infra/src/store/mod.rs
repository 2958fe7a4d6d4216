//! Identity storage boundary.
//!
//! Reads go through [`IdentityRepository`]. Writes are staged on a
//! [`Transaction`] opened from a request-scoped [`UnitOfWork`], so every
//! mutation happens inside the caller's transaction.

pub mod in_memory;
pub mod r#trait;
pub mod unit_of_work;

pub use in_memory::{InMemoryIdentityStore, InMemoryTransaction, InMemoryUnitOfWork};
pub use r#trait::{IdentityRepository, IdentityStore, RepositoryError};
pub use unit_of_work::{CommitOutcome, CommitPolicy, Transaction, TransactionError, UnitOfWork};
