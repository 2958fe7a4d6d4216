use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use passport_auth::{Identity, IdentityEvent};
use passport_core::{AggregateRoot, EventId, ExpectedVersion, IdentityId};
use passport_events::{EventDispatcher, EventEnvelope};

use super::r#trait::{IdentityRepository, IdentityStore, RepositoryError};
use super::unit_of_work::{CommitOutcome, CommitPolicy, Transaction, TransactionError, UnitOfWork};

const AGGREGATE_TYPE: &str = "identity";

#[derive(Debug, Default)]
struct Inner {
    identities: RwLock<HashMap<IdentityId, Identity>>,
    fail_next_commit: AtomicBool,
    commit_delay: Mutex<Option<Duration>>,
}

/// In-memory identity store.
///
/// Intended for tests/dev. Commits are atomic under a single write lock and
/// checked with optimistic versioning, so it behaves like a serializable
/// store for the purposes of the lifecycle flows.
#[derive(Debug, Clone)]
pub struct InMemoryIdentityStore {
    inner: Arc<Inner>,
    dispatcher: Arc<EventDispatcher<IdentityEvent>>,
}

impl InMemoryIdentityStore {
    pub fn new(dispatcher: Arc<EventDispatcher<IdentityEvent>>) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            dispatcher,
        }
    }

    /// Make the next commit fail with a store error before writing anything.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::Release);
    }

    /// Make the next commit wait `delay` before writing anything.
    pub fn delay_next_commit(&self, delay: Duration) {
        if let Ok(mut slot) = self.inner.commit_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Soft-delete an identity outside of any flow. Returns false if absent.
    pub fn soft_delete(&self, id: IdentityId) -> bool {
        let Ok(mut map) = self.inner.identities.write() else {
            return false;
        };
        match map.get_mut(&id) {
            Some(identity) => {
                identity.mark_deleted(chrono::Utc::now());
                true
            }
            None => false,
        }
    }

    /// Stored record by id, soft-deleted ones included.
    pub fn snapshot(&self, id: IdentityId) -> Option<Identity> {
        self.inner
            .identities
            .read()
            .ok()
            .and_then(|map| map.get(&id).cloned())
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.inner.identities.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<T>(
        &self,
        f: impl FnOnce(&HashMap<IdentityId, Identity>) -> T,
    ) -> Result<T, RepositoryError> {
        let map = self
            .inner
            .identities
            .read()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&map))
    }

    fn take_commit_delay(&self) -> Option<Duration> {
        self.inner.commit_delay.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Validate and apply staged writes in one critical section.
    fn apply(
        &self,
        staged: Vec<Staged>,
    ) -> Result<Vec<EventEnvelope<IdentityEvent>>, TransactionError> {
        if self.inner.fail_next_commit.swap(false, Ordering::AcqRel) {
            return Err(TransactionError::Store("injected commit failure".to_string()));
        }

        let mut map = self
            .inner
            .identities
            .write()
            .map_err(|_| TransactionError::Store("lock poisoned".to_string()))?;

        // Check everything before touching anything.
        let mut claimed = HashSet::new();
        for s in &staged {
            let current = map.get(s.identity.id()).map(|i| i.version());
            s.expected
                .check(current)
                .map_err(|e| TransactionError::Conflict(e.to_string()))?;

            if s.expected == ExpectedVersion::New {
                let username = s.identity.username();
                let taken = map
                    .values()
                    .any(|i| !i.is_deleted() && i.username() == username);
                if taken || !claimed.insert(username.to_string()) {
                    return Err(TransactionError::Conflict(format!(
                        "username '{username}' is already taken"
                    )));
                }
            }
        }

        let mut envelopes = Vec::new();
        for Staged { mut identity, .. } in staged {
            let version = identity.version() + 1;
            identity.set_persisted_version(version);
            let id = *identity.id();

            for event in identity.take_pending_events() {
                envelopes.push(EventEnvelope::new(
                    EventId::new(),
                    id,
                    AGGREGATE_TYPE,
                    version,
                    event,
                ));
            }

            map.insert(id, identity);
        }

        Ok(envelopes)
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityStore {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, RepositoryError> {
        self.lookup(|map| map.get(&id).filter(|i| !i.is_deleted()).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError> {
        self.lookup(|map| {
            map.values()
                .find(|i| !i.is_deleted() && i.username() == username)
                .cloned()
        })
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError> {
        self.lookup(|map| {
            map.values()
                .any(|i| !i.is_deleted() && i.username() == username)
        })
    }
}

impl IdentityStore for InMemoryIdentityStore {
    type Work = InMemoryUnitOfWork;

    fn unit_of_work(&self) -> Self::Work {
        InMemoryUnitOfWork {
            store: self.clone(),
            open: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    store: InMemoryIdentityStore,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, TransactionError> {
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransactionError::Nested);
        }

        tracing::debug!("transaction started");
        Ok(InMemoryTransaction {
            store: self.store.clone(),
            open: Arc::clone(&self.open),
            staged: Vec::new(),
            finished: false,
        })
    }
}

#[derive(Debug)]
struct Staged {
    identity: Identity,
    expected: ExpectedVersion,
}

#[derive(Debug)]
pub struct InMemoryTransaction {
    store: InMemoryIdentityStore,
    open: Arc<AtomicBool>,
    staged: Vec<Staged>,
    finished: bool,
}

impl InMemoryTransaction {
    fn finish(&mut self) {
        self.finished = true;
        self.open.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    fn insert(&mut self, identity: Identity) {
        self.staged.push(Staged {
            identity,
            expected: ExpectedVersion::New,
        });
    }

    fn update(&mut self, identity: Identity) {
        let expected = ExpectedVersion::Exact(identity.version());
        self.staged.push(Staged { identity, expected });
    }

    async fn commit(mut self, policy: CommitPolicy) -> Result<CommitOutcome, TransactionError> {
        if let Some(delay) = self.store.take_commit_delay() {
            tokio::time::sleep(delay).await;
        }

        let staged = std::mem::take(&mut self.staged);
        let records = staged.len();
        let envelopes = self.store.apply(staged)?;
        self.finish();
        tracing::debug!(records, events = envelopes.len(), "transaction committed");

        let outcome = match policy {
            CommitPolicy::Dispatch => {
                let failed_deliveries = match self.store.dispatcher.dispatch(&envelopes) {
                    Ok(_) => 0,
                    Err(err) => {
                        tracing::warn!(
                            failures = err.failures.len(),
                            "post-commit event dispatch incomplete"
                        );
                        err.failures.len()
                    }
                };
                CommitOutcome {
                    records,
                    events: envelopes.len(),
                    failed_deliveries,
                }
            }
            CommitPolicy::Silent => {
                if !envelopes.is_empty() {
                    tracing::debug!(events = envelopes.len(), "silent commit dropped queued events");
                }
                CommitOutcome {
                    records,
                    events: 0,
                    failed_deliveries: 0,
                }
            }
        };

        Ok(outcome)
    }

    async fn rollback(mut self) {
        let discarded = self.staged.len();
        self.staged.clear();
        self.finish();
        tracing::debug!(discarded, "transaction rolled back");
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.open.store(false, Ordering::Release);
            tracing::debug!(
                discarded = self.staged.len(),
                "transaction dropped before commit, rolled back"
            );
        }
    }
}
