//! Transaction boundary around identity writes.

use async_trait::async_trait;
use thiserror::Error;

use passport_auth::Identity;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// `begin` was called while a transaction is already open on the same
    /// unit of work. This is a programming error.
    #[error("a transaction is already open on this unit of work")]
    Nested,

    /// A staged write lost an optimistic concurrency or uniqueness check.
    #[error("commit conflict: {0}")]
    Conflict(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("commit timed out")]
    TimedOut,
}

/// What happens to queued domain events once the store confirms a commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Hand queued events to the dispatcher after the write is durable.
    Dispatch,
    /// Persist only. Queued events are dropped without notifying anyone.
    Silent,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    /// Records written.
    pub records: usize,
    /// Events handed to the dispatcher (zero under [`CommitPolicy::Silent`]).
    pub events: usize,
    /// Handler deliveries that failed after the commit.
    pub failed_deliveries: usize,
}

/// Request-scoped transaction factory. At most one transaction may be open on
/// a unit of work at a time.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Transaction: Transaction;

    async fn begin(&self) -> Result<Self::Transaction, TransactionError>;
}

/// An open transaction.
///
/// Writes are staged in memory and reach the store only on [`commit`]. A
/// transaction dropped without commit is rolled back: staged writes and their
/// queued events are discarded, and the unit of work is released.
///
/// [`commit`]: Transaction::commit
#[async_trait]
pub trait Transaction: Send {
    /// Stage a new identity. Fails at commit if the id or username is taken.
    fn insert(&mut self, identity: Identity);

    /// Stage a write of an identity loaded earlier. Fails at commit if the
    /// stored version moved on since it was loaded.
    fn update(&mut self, identity: Identity);

    /// Apply every staged write atomically, then flush events per `policy`.
    async fn commit(self, policy: CommitPolicy) -> Result<CommitOutcome, TransactionError>;

    async fn rollback(self);
}
