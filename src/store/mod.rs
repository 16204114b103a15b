//! Persistence for labels and their history.
//!
//! All writes happen inside a [`Transaction`]. Locking a label takes an
//! exclusive row lock that is held until the transaction commits or rolls
//! back, which serialises every state change of that label. Dropping a
//! transaction without committing rolls it back.

mod memory;

pub use memory::{MemoryStore, MemoryTransaction};

use crate::core::{HistoryEntry, LabelRecord, LabelRef, NewHistoryEntry};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Label {0} must be locked before it is written")]
    NotLocked(LabelRef),

    #[error("Store backend failed: {0}")]
    Backend(String),
}

/// Read access outside transactions, plus the transaction factory.
///
/// Reads here see committed data only and take no locks.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    async fn label(&self, label: &LabelRef) -> Result<Option<LabelRecord>, StoreError>;

    async fn history(&self, label: &LabelRef) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Live labels of the machine whose current state is `state`.
    async fn labels_in_state(
        &self,
        state_machine: &str,
        state: &str,
    ) -> Result<Vec<LabelRecord>, StoreError>;

    /// Names of the machine's live labels, sorted.
    async fn label_names(&self, state_machine: &str) -> Result<Vec<String>, StoreError>;
}

/// A unit of work against the store.
///
/// Reads inside a transaction see its own uncommitted writes.
#[async_trait]
pub trait Transaction: Send {
    /// Take the label's row lock, waiting for any other holder, and return
    /// the label if it exists. A lock on a missing label reserves its name.
    /// Locking a label this transaction already holds does not wait.
    async fn lock_label(&mut self, label: &LabelRef) -> Result<Option<LabelRecord>, StoreError>;

    /// Insert or replace a label. The label must be locked.
    async fn save_label(&mut self, record: LabelRecord) -> Result<(), StoreError>;

    async fn history(&mut self, label: &LabelRef) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Append an entry. The label must be locked.
    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
