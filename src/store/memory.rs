//! In-memory store.

use super::{Store, StoreError, Transaction};
use crate::core::{HistoryEntry, LabelRecord, LabelRef, NewHistoryEntry};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Tables {
    labels: HashMap<LabelRef, LabelRecord>,
    history: HashMap<LabelRef, Vec<HistoryEntry>>,
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<LabelRef, Arc<RowLock<()>>>>,
    next_history_id: AtomicI64,
}

impl Shared {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("label tables lock poisoned".into()))
    }

    fn row_lock(&self, label: &LabelRef) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::Backend("row lock table poisoned".into()))?;
        Ok(locks.entry(label.clone()).or_default().clone())
    }

    /// Forget row locks nobody holds or waits for.
    fn prune_row_locks(&self, labels: impl IntoIterator<Item = LabelRef>) {
        let Ok(mut locks) = self.row_locks.lock() else {
            return;
        };
        for label in labels {
            if locks.get(&label).is_some_and(|row| Arc::strong_count(row) == 1) {
                locks.remove(&label);
            }
        }
    }
}

/// A store that keeps everything in process memory.
///
/// Cloning is cheap and clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_history_id: AtomicI64::new(1),
            }),
        }
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.shared.row_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    /// Start a transaction with its concrete type.
    pub fn transaction(&self) -> MemoryTransaction {
        MemoryTransaction {
            shared: Arc::clone(&self.shared),
            locks: HashMap::new(),
            labels: HashMap::new(),
            history: Vec::new(),
        }
    }
}

fn current_state(history: Option<&Vec<HistoryEntry>>) -> Option<&str> {
    history?.last()?.new_state.as_deref()
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(self.transaction()))
    }

    async fn label(&self, label: &LabelRef) -> Result<Option<LabelRecord>, StoreError> {
        Ok(self.shared.tables()?.labels.get(label).cloned())
    }

    async fn history(&self, label: &LabelRef) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .shared
            .tables()?
            .history
            .get(label)
            .cloned()
            .unwrap_or_default())
    }

    async fn labels_in_state(
        &self,
        state_machine: &str,
        state: &str,
    ) -> Result<Vec<LabelRecord>, StoreError> {
        let tables = self.shared.tables()?;
        let mut records: Vec<LabelRecord> = tables
            .labels
            .values()
            .filter(|record| record.label.state_machine == state_machine && !record.deleted)
            .filter(|record| current_state(tables.history.get(&record.label)) == Some(state))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.label.name.cmp(&b.label.name));
        Ok(records)
    }

    async fn label_names(&self, state_machine: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.shared.tables()?;
        let mut names: Vec<String> = tables
            .labels
            .values()
            .filter(|record| record.label.state_machine == state_machine && !record.deleted)
            .map(|record| record.label.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Transaction over a [`MemoryStore`].
///
/// Writes are staged locally and applied atomically on commit. Row locks
/// are released when the transaction is dropped.
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    locks: HashMap<LabelRef, OwnedMutexGuard<()>>,
    labels: HashMap<LabelRef, LabelRecord>,
    history: Vec<HistoryEntry>,
}

impl MemoryTransaction {
    fn ensure_locked(&self, label: &LabelRef) -> Result<(), StoreError> {
        if self.locks.contains_key(label) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(label.clone()))
        }
    }

    fn read_label(&self, label: &LabelRef) -> Result<Option<LabelRecord>, StoreError> {
        if let Some(staged) = self.labels.get(label) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.shared.tables()?.labels.get(label).cloned())
    }

    fn release_locks(&mut self) {
        if self.locks.is_empty() {
            return;
        }
        let released: Vec<LabelRef> = self.locks.drain().map(|(label, _guard)| label).collect();
        self.shared.prune_row_locks(released);
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn lock_label(&mut self, label: &LabelRef) -> Result<Option<LabelRecord>, StoreError> {
        if !self.locks.contains_key(label) {
            let row = self.shared.row_lock(label)?;
            let guard = row.lock_owned().await;
            self.locks.insert(label.clone(), guard);
        }
        self.read_label(label)
    }

    async fn save_label(&mut self, record: LabelRecord) -> Result<(), StoreError> {
        self.ensure_locked(&record.label)?;
        self.labels.insert(record.label.clone(), record);
        Ok(())
    }

    async fn history(&mut self, label: &LabelRef) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut entries = self
            .shared
            .tables()?
            .history
            .get(label)
            .cloned()
            .unwrap_or_default();
        entries.extend(
            self.history
                .iter()
                .filter(|entry| &entry.label == label)
                .cloned(),
        );
        Ok(entries)
    }

    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        self.ensure_locked(&entry.label)?;
        let id = self.shared.next_history_id.fetch_add(1, Ordering::SeqCst);
        let entry = entry.into_entry(id, Utc::now());
        self.history.push(entry.clone());
        Ok(entry)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let txn = &mut *self;
        {
            let mut tables = txn.shared.tables()?;
            tables.labels.extend(txn.labels.drain());
            for entry in txn.history.drain(..) {
                tables
                    .history
                    .entry(entry.label.clone())
                    .or_default()
                    .push(entry);
            }
        }

        txn.release_locks();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.release_locks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn alice() -> LabelRef {
        LabelRef::new("alice", "flow")
    }

    async fn seed(store: &MemoryStore, label: &LabelRef, state: &str) {
        let mut txn = store.begin().await.unwrap();
        txn.lock_label(label).await.unwrap();
        txn.save_label(LabelRecord::new(label.clone(), json!({})))
            .await
            .unwrap();
        txn.append_history(NewHistoryEntry::creation(label, state))
            .await
            .unwrap();
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        seed(&store, &alice(), "start").await;

        assert!(store.label(&alice()).await.unwrap().is_some());
        assert_eq!(store.history(&alice()).await.unwrap().len(), 1);
        assert_eq!(store.label_names("flow").await.unwrap(), vec!["alice"]);
        assert_eq!(store.labels_in_state("flow", "start").await.unwrap().len(), 1);
        assert!(store.labels_in_state("flow", "end").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uncommitted_writes_are_private() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.lock_label(&alice()).await.unwrap();
        txn.save_label(LabelRecord::new(alice(), json!({"a": 1})))
            .await
            .unwrap();

        assert!(txn.lock_label(&alice()).await.unwrap().is_some());
        assert!(store.label(&alice()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropping_a_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut txn = store.begin().await.unwrap();
            txn.lock_label(&alice()).await.unwrap();
            txn.save_label(LabelRecord::new(alice(), json!({})))
                .await
                .unwrap();
        }

        assert!(store.label(&alice()).await.unwrap().is_none());
        let mut txn = store.begin().await.unwrap();
        assert!(txn.lock_label(&alice()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_require_the_row_lock() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();

        let result = txn
            .append_history(NewHistoryEntry::creation(&alice(), "start"))
            .await;
        assert_eq!(result, Err(StoreError::NotLocked(alice())));
    }

    #[tokio::test]
    async fn row_lock_blocks_other_transactions() {
        let store = MemoryStore::new();
        seed(&store, &alice(), "start").await;

        let mut first = store.begin().await.unwrap();
        first.lock_label(&alice()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), second.lock_label(&alice())).await;
        assert!(blocked.is_err());

        first
            .append_history(NewHistoryEntry::transition(&alice(), "start", "end"))
            .await
            .unwrap();
        first.commit().await.unwrap();

        let record = second.lock_label(&alice()).await.unwrap();
        assert!(record.is_some());
        let history = second.history(&alice()).await.unwrap();
        assert_eq!(history.last().and_then(|e| e.new_state.as_deref()), Some("end"));
    }

    #[tokio::test]
    async fn different_labels_lock_independently() {
        let store = MemoryStore::new();
        let bob = LabelRef::new("bob", "flow");

        let mut first = store.begin().await.unwrap();
        first.lock_label(&alice()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let locked = tokio::time::timeout(Duration::from_millis(50), second.lock_label(&bob)).await;
        assert!(locked.is_ok());
    }

    #[tokio::test]
    async fn released_row_locks_are_forgotten() {
        let store = MemoryStore::new();
        let ghost = LabelRef::new("ghost", "flow");

        let mut txn = store.transaction();
        assert!(txn.lock_label(&ghost).await.unwrap().is_none());
        assert_eq!(store.row_lock_count(), 1);
        Box::new(txn).commit().await.unwrap();
        assert_eq!(store.row_lock_count(), 0);

        let mut txn = store.transaction();
        txn.lock_label(&ghost).await.unwrap();
        Box::new(txn).rollback().await.unwrap();
        assert_eq!(store.row_lock_count(), 0);

        {
            let mut txn = store.transaction();
            txn.lock_label(&alice()).await.unwrap();
        }
        assert_eq!(store.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn waiting_transactions_keep_the_row_lock() {
        let store = MemoryStore::new();
        let mut first = store.transaction();
        first.lock_label(&alice()).await.unwrap();

        let waiting = tokio::spawn({
            let store = store.clone();
            async move {
                let mut second = store.transaction();
                second.lock_label(&alice()).await.unwrap();
                second
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        Box::new(first).commit().await.unwrap();
        let second = waiting.await.unwrap();
        assert_eq!(store.row_lock_count(), 1);

        drop(second);
        assert_eq!(store.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn history_ids_increase() {
        let store = MemoryStore::new();
        seed(&store, &alice(), "start").await;

        let mut txn = store.begin().await.unwrap();
        txn.lock_label(&alice()).await.unwrap();
        let entry = txn
            .append_history(NewHistoryEntry::transition(&alice(), "start", "end"))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let history = store.history(&alice()).await.unwrap();
        assert!(history[0].id < entry.id);
    }

    #[tokio::test]
    async fn deleted_labels_are_not_listed() {
        let store = MemoryStore::new();
        seed(&store, &alice(), "start").await;

        let mut txn = store.begin().await.unwrap();
        let mut record = txn.lock_label(&alice()).await.unwrap().unwrap();
        record.deleted = true;
        txn.save_label(record).await.unwrap();
        txn.commit().await.unwrap();

        assert!(store.label_names("flow").await.unwrap().is_empty());
        assert!(store.labels_in_state("flow", "start").await.unwrap().is_empty());
    }
}
