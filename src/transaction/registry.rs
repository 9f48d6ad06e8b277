//! In-flight transaction table shared by every caller of one connection.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        MutexGuard,
        atomic::{AtomicU32, Ordering},
    },
};

use super::{Transaction, TransactionId, TransactionStatus};

/// Transactions keyed by id, plus the id counter that feeds them.
///
/// Lookups clone the stored transaction so no lock is held across an await.
#[derive(Debug)]
pub struct TransactionRegistry {
    next_id: AtomicU32,
    entries: Mutex<HashMap<TransactionId, Transaction>>,
}

impl Default for TransactionRegistry {
    fn default() -> Self { Self::new() }
}

impl TransactionRegistry {
    /// Create an empty registry whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TransactionId, Transaction>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocate the next id and insert a new transaction under it.
    pub fn create(&self) -> TransactionId {
        let id = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.insert(Transaction::new(id));
        id
    }

    /// Insert `tx`, replacing any transaction with the same id.
    pub fn insert(&self, tx: Transaction) { self.lock().insert(tx.id(), tx); }

    /// Return a snapshot of the transaction with `id`.
    #[must_use]
    pub fn find(&self, id: TransactionId) -> Option<Transaction> { self.lock().get(&id).cloned() }

    /// Run `f` against the stored transaction, if present.
    pub fn update<T>(&self, id: TransactionId, f: impl FnOnce(&mut Transaction) -> T) -> Option<T> {
        self.lock().get_mut(&id).map(f)
    }

    /// Remove and return the transaction with `id`.
    pub fn remove(&self, id: TransactionId) -> Option<Transaction> { self.lock().remove(&id) }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: TransactionId) -> bool { self.lock().contains_key(&id) }

    /// Every registered id in ascending order.
    #[must_use]
    pub fn all_ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids whose response has arrived, in ascending order.
    #[must_use]
    pub fn completed_ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self
            .lock()
            .values()
            .filter(|tx| tx.status() == TransactionStatus::Done)
            .map(Transaction::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered transactions.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().len() }

    /// Whether no transactions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    /// Drop every registered transaction. The id counter keeps counting.
    pub fn clear(&self) { self.lock().clear(); }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::transaction::Response;

    #[fixture]
    fn registry() -> TransactionRegistry {
        TransactionRegistry::new()
    }

    #[rstest]
    fn ids_start_at_one_and_never_repeat(registry: TransactionRegistry) {
        let first = registry.create();
        let second = registry.create();
        registry.remove(first);
        registry.clear();
        let third = registry.create();

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert_eq!(third.get(), 3);
    }

    #[rstest]
    fn update_is_visible_to_later_finds(registry: TransactionRegistry) {
        let id = registry.create();
        registry
            .update(id, |tx| tx.set_field("action", "sale"))
            .expect("present")
            .expect("new");

        let stored = registry.find(id).expect("registered");
        assert_eq!(stored.fields(), [("action".to_owned(), "sale".to_owned())]);
        assert!(registry.update(TransactionId::new(99), |_| ()).is_none());
    }

    #[rstest]
    fn completed_ids_only_lists_done(registry: TransactionRegistry) {
        let pending = registry.create();
        let done = registry.create();
        registry.update(done, |tx| tx.complete(Response::parse(Bytes::from_static(b"code=AUTH"))));

        assert_eq!(registry.all_ids(), vec![pending, done]);
        assert_eq!(registry.completed_ids(), vec![done]);
        assert_eq!(registry.len(), 2);
    }

    #[rstest]
    fn concurrent_creates_yield_distinct_ids() {
        let registry = Arc::new(TransactionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&registry);
                thread::spawn(move || (0..25).map(|_| shared.create()).collect::<Vec<_>>())
            })
            .collect();
        let mut ids: Vec<_> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("thread"))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 200);
        assert_eq!(registry.len(), 200);
    }
}
