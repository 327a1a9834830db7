//! Request-scoped transactions with CAS commit and bounded retry.

use crate::error::{MetadataError, MetadataResult};
use crate::keys::Key;
use crate::service::{MetadataService, UpdateRecord, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Total attempts [`update_repository`] makes before surfacing a retryable
/// commit failure to the caller.
pub const MAX_TX_ATTEMPTS: u32 = 2;

#[derive(Default)]
struct TxState {
    prepared: BTreeMap<String, UpdateRecord>,
    committed: bool,
}

/// A buffered write set committed atomically against per-key expected-value
/// preconditions.
///
/// Each `update` records the store's current value as the precondition;
/// repeated updates to the same key overwrite the buffered value but keep
/// the precondition from the pre-transaction snapshot. Nothing in the buffer
/// is observable by readers until `commit` succeeds.
pub struct Transaction {
    id: Uuid,
    store: Arc<dyn MetadataService>,
    state: Mutex<TxState>,
}

impl Transaction {
    /// Begin a transaction against a repository-scoped metadata service.
    pub fn begin(store: Arc<dyn MetadataService>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            store,
            state: Mutex::new(TxState::default()),
        })
    }

    /// The transaction id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Buffer a write (`None` deletes), recording the current store value as
    /// the commit precondition unless one was already recorded for this key.
    pub async fn update(&self, key: &Key, value: Option<Value>) -> MetadataResult<()> {
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.committed {
                return Err(MetadataError::TransactionCommitted(self.id));
            }
        }

        let key_str = key.to_string();
        let current = self.store.get(&key_str).await?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.committed {
            return Err(MetadataError::TransactionCommitted(self.id));
        }
        tracing::debug!(
            tx = %self.id,
            key = %key_str,
            value = ?value,
            current = ?current,
            "transaction update"
        );
        match state.prepared.get_mut(&key_str) {
            Some(record) => {
                // Keep the precondition from the first read of this key.
                record.actual = value;
            }
            None => {
                state.prepared.insert(
                    key_str,
                    UpdateRecord {
                        actual: value,
                        expected: current,
                    },
                );
            }
        }
        Ok(())
    }

    /// Commit the buffered write set as one batch put. On success the
    /// transaction is finished and further updates or commits fail; on
    /// [`MetadataError::TransactionRetry`] the caller may retry from the
    /// beginning.
    pub async fn commit(&self) -> MetadataResult<()> {
        let prepared = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.committed {
                return Err(MetadataError::TransactionCommitted(self.id));
            }
            state.prepared.clone()
        };

        self.store.batch_put(prepared).await?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.committed = true;
        tracing::debug!(tx = %self.id, keys = state.prepared.len(), "transaction committed");
        Ok(())
    }

    /// Discard the buffered write set. Forbidden after commit.
    pub fn rollback(&self) -> MetadataResult<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.committed {
            return Err(MetadataError::TransactionCommitted(self.id));
        }
        state.prepared.clear();
        Ok(())
    }
}

/// Run `f` inside a transaction and commit, re-running `f` from scratch on a
/// retryable commit failure up to [`MAX_TX_ATTEMPTS`] attempts. The last
/// error is returned when attempts are exhausted.
pub async fn update_repository<T, E, F, Fut>(store: Arc<dyn MetadataService>, f: F) -> Result<T, E>
where
    E: From<MetadataError>,
    F: Fn(Arc<Transaction>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let tx = Transaction::begin(store.clone());
        let out = f(tx.clone()).await?;
        match tx.commit().await {
            Ok(()) => return Ok(out),
            Err(MetadataError::TransactionRetry) if attempt < MAX_TX_ATTEMPTS => {
                tracing::debug!(tx = %tx.id(), attempt, "retrying contended transaction");
                attempt += 1;
            }
            Err(err) => return Err(E::from(err)),
        }
    }
}
