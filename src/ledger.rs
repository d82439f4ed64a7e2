//! Request deduplication ledger.
//!
//! At most one operation per [`LedgerKey`] is in flight at a time. A caller
//! arriving while one is pending joins it and receives the same outcome;
//! the slot is released when the operation finishes, fails or times out.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::EntityId;

/// Identity of a deduplicated operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LedgerKey {
    Properties,
    Persons,
    Connections,
    Links,
    AllData,
    PropertyDetails(EntityId),
    PersonDetails(EntityId),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKey::Properties => f.write_str("properties"),
            LedgerKey::Persons => f.write_str("persons"),
            LedgerKey::Connections => f.write_str("connections"),
            LedgerKey::Links => f.write_str("links"),
            LedgerKey::AllData => f.write_str("allData"),
            LedgerKey::PropertyDetails(id) => write!(f, "propertyDetails:{id}"),
            LedgerKey::PersonDetails(id) => write!(f, "personDetails:{id}"),
        }
    }
}

/// Handle every waiter on one operation polls
pub type Pending<T> = Shared<BoxFuture<'static, StoreResult<T>>>;

struct Slot<T> {
    generation: u64,
    handle: Pending<T>,
}

struct Registry<T> {
    slots: HashMap<LedgerKey, Slot<T>>,
    next_generation: u64,
}

/// Registry of in-flight operations producing `T`
pub struct Ledger<T> {
    registry: Arc<Mutex<Registry<T>>>,
    timeout: Duration,
}

impl<T> Ledger<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Operations still running after `timeout` release their slot and fail with `Timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                slots: HashMap::new(),
                next_generation: 0,
            })),
            timeout,
        }
    }

    /// Join the pending operation for `key`, or start `work` as a new one.
    ///
    /// `work` is spawned onto the runtime, so it runs to completion even if
    /// every waiter drops its handle. It is never polled when a join happens.
    pub fn begin<F>(&self, key: LedgerKey, work: F) -> Pending<T>
    where
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let mut registry = self.registry.lock();
        if let Some(slot) = registry.slots.get(&key) {
            debug!(key = %key, "Joining in-flight request");
            return slot.handle.clone();
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;

        let shared_registry = Arc::clone(&self.registry);
        let timeout = self.timeout;
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(key = %task_key, timeout_ms = timeout.as_millis() as u64, "Request timed out, releasing slot");
                    Err(StoreError::Timeout {
                        key: task_key.to_string(),
                    })
                }
            };
            release(&shared_registry, &task_key, generation);
            outcome
        });

        let abort_key = key.to_string();
        let handle = async move {
            task.await.unwrap_or_else(|err| {
                warn!(key = %abort_key, error = %err, "Request task aborted");
                Err(StoreError::Aborted { key: abort_key })
            })
        }
        .boxed()
        .shared();

        registry.slots.insert(
            key,
            Slot {
                generation,
                handle: handle.clone(),
            },
        );
        handle
    }

    pub fn is_pending(&self, key: &LedgerKey) -> bool {
        self.registry.lock().slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every registration. Running operations finish, but new callers start fresh ones.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        if !registry.slots.is_empty() {
            debug!(count = registry.slots.len(), "Clearing in-flight registrations");
        }
        registry.slots.clear();
    }
}

/// Drop the slot for `key` unless it has since been replaced by a newer operation
fn release<T>(registry: &Mutex<Registry<T>>, key: &LedgerKey, generation: u64) {
    let mut registry = registry.lock();
    if registry
        .slots
        .get(key)
        .is_some_and(|slot| slot.generation == generation)
    {
        registry.slots.remove(key);
    }
}
