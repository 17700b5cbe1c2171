//! Transaction store.
//!
//! # Responsibilities
//! - Single source of truth for transaction status
//! - Enforce the transition graph atomically per record
//! - Write a transition and its history entry as one operation
//! - Keep status history append-only
//! - Optionally mirror everything into a JSON snapshot for restarts
//!
//! # Snapshot
//! Every mutation captures the state under a generation number and hands
//! the write to the blocking pool: serialize to `<path>.tmp`, then rename
//! over `<path>`. A write older than the one already on disk is dropped.
//! A failed snapshot write is logged; the in-memory state stays
//! authoritative for the running process.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

use crate::transaction::model::{
    StatusHistoryEntry, StatusUpdate, Transaction, TransactionFilters, TransactionStatus,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("duplicate transaction: {0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence seam for transactions and their history.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create_transaction(&self, tx: &Transaction) -> RepositoryResult<()>;

    /// Create `tx` together with its first history entry. Neither is
    /// stored if the other cannot be.
    async fn create_with_history(
        &self,
        tx: &Transaction,
        entry: &StatusHistoryEntry,
    ) -> RepositoryResult<()>;

    /// Apply `update` if it is an allowed edge from the current status.
    /// Returns the updated record.
    async fn update_transaction_status(
        &self,
        id: Uuid,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transaction>;

    /// Apply `update` and append its history entry in one step.
    async fn record_transition(
        &self,
        id: Uuid,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transaction>;

    async fn add_status_history(&self, entry: &StatusHistoryEntry) -> RepositoryResult<()>;

    async fn get_transaction_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn get_transaction_by_tx_id(&self, tx_id: &str) -> RepositoryResult<Transaction>;

    /// Matching records, newest first, after `offset`, at most `limit`.
    async fn query_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> RepositoryResult<Vec<Transaction>>;

    /// History of one transaction in chronological order.
    async fn get_status_history(&self, id: Uuid) -> RepositoryResult<Vec<StatusHistoryEntry>>;
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    transactions: Vec<Transaction>,
    history: Vec<StatusHistoryEntry>,
}

/// Snapshot file plus the ordering state for its writes.
struct SnapshotWriter {
    path: PathBuf,
    /// Generation of the latest capture.
    captured: Mutex<u64>,
    /// Generation currently on disk.
    written: Arc<Mutex<u64>>,
}

impl SnapshotWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            captured: Mutex::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }
}

/// Concurrent in-memory store with optional snapshot persistence.
#[derive(Default)]
pub struct InMemoryRepository {
    transactions: DashMap<Uuid, Transaction>,
    by_tx_id: DashMap<String, Uuid>,
    history: DashMap<Uuid, Vec<StatusHistoryEntry>>,
    snapshot: Option<SnapshotWriter>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a snapshot file, loading it if it exists.
    pub fn with_snapshot(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let repo = Self {
            snapshot: Some(SnapshotWriter::new(path.clone())),
            ..Self::default()
        };

        if path.exists() {
            let file = File::open(&path).map_err(|e| storage_error(&path, e))?;
            let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| storage_error(&path, e))?;

            for tx in snapshot.transactions {
                if !tx.tx_id.is_empty() {
                    repo.by_tx_id.insert(tx.tx_id.clone(), tx.id);
                }
                repo.transactions.insert(tx.id, tx);
            }
            for entry in snapshot.history {
                repo.history.entry(entry.transaction_id).or_default().push(entry);
            }

            tracing::info!(
                path = %path.display(),
                transactions = repo.transactions.len(),
                "Loaded transaction snapshot"
            );
        }

        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn insert_record(
        &self,
        tx: &Transaction,
        first_entry: Option<&StatusHistoryEntry>,
    ) -> RepositoryResult<()> {
        match self.transactions.entry(tx.id) {
            Entry::Occupied(_) => return Err(RepositoryError::Duplicate(tx.id.to_string())),
            Entry::Vacant(slot) => {
                if let Some(entry) = first_entry {
                    self.history.entry(tx.id).or_default().push(entry.clone());
                }
                slot.insert(tx.clone());
            }
        }
        if !tx.tx_id.is_empty() {
            self.by_tx_id.insert(tx.tx_id.clone(), tx.id);
        }
        Ok(())
    }

    /// Mutate the record and, when `with_history` is set, append the entry
    /// while the record is still locked.
    fn apply_update(
        &self,
        id: Uuid,
        update: &StatusUpdate,
        with_history: bool,
    ) -> RepositoryResult<Transaction> {
        let updated = {
            let mut record = self
                .transactions
                .get_mut(&id)
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

            if !record.status.can_transition_to(update.status) {
                return Err(RepositoryError::InvalidTransition {
                    id,
                    from: record.status,
                    to: update.status,
                });
            }

            record.status = update.status;
            if let Some(tx_id) = &update.tx_id {
                record.tx_id = tx_id.clone();
            }
            if update.block_number.is_some() {
                record.block_number = update.block_number;
            }
            if update.error_message.is_some() {
                record.error_message = update.error_message.clone();
            }
            if update.status.is_terminal() {
                record.completed_at = Some(Utc::now());
            }

            if with_history {
                self.history.entry(id).or_default().push(StatusHistoryEntry::new(
                    id,
                    update.status,
                    update.details.clone(),
                ));
            }
            record.clone()
        };

        if !updated.tx_id.is_empty() {
            self.by_tx_id.insert(updated.tx_id.clone(), id);
        }
        Ok(updated)
    }

    async fn persist(&self) {
        let Some(writer) = &self.snapshot else {
            return;
        };

        // History first: a transition pushes its entry before releasing the
        // record, so the captured history never runs ahead of the records.
        let (generation, snapshot) = {
            let mut captured = writer.captured.lock().unwrap_or_else(PoisonError::into_inner);
            *captured += 1;

            let mut history: Vec<StatusHistoryEntry> = self
                .history
                .iter()
                .flat_map(|r| r.value().clone())
                .collect();
            history.sort_by_key(|e| e.timestamp);
            let transactions = self.transactions.iter().map(|r| r.value().clone()).collect();
            (*captured, Snapshot { transactions, history })
        };

        let path = writer.path.clone();
        let written = Arc::clone(&writer.written);
        let task = tokio::task::spawn_blocking(move || {
            let mut on_disk = written.lock().unwrap_or_else(PoisonError::into_inner);
            if generation <= *on_disk {
                return Ok(());
            }
            write_snapshot(&path, &snapshot)?;
            *on_disk = generation;
            Ok::<_, std::io::Error>(())
        });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(path = %writer.path.display(), error = %e, "Failed to write transaction snapshot");
            }
            Err(e) => {
                tracing::error!(path = %writer.path.display(), error = %e, "Snapshot writer task failed");
            }
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer(&mut writer, snapshot)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()?;

    std::fs::rename(&tmp, path)
}

fn storage_error(path: &Path, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Storage(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl TransactionRepository for InMemoryRepository {
    async fn create_transaction(&self, tx: &Transaction) -> RepositoryResult<()> {
        self.insert_record(tx, None)?;
        self.persist().await;
        Ok(())
    }

    async fn create_with_history(
        &self,
        tx: &Transaction,
        entry: &StatusHistoryEntry,
    ) -> RepositoryResult<()> {
        if entry.transaction_id != tx.id {
            return Err(RepositoryError::NotFound(entry.transaction_id.to_string()));
        }
        self.insert_record(tx, Some(entry))?;
        self.persist().await;
        Ok(())
    }

    async fn update_transaction_status(
        &self,
        id: Uuid,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transaction> {
        let updated = self.apply_update(id, update, false)?;
        self.persist().await;
        Ok(updated)
    }

    async fn record_transition(
        &self,
        id: Uuid,
        update: &StatusUpdate,
    ) -> RepositoryResult<Transaction> {
        let updated = self.apply_update(id, update, true)?;
        self.persist().await;
        Ok(updated)
    }

    async fn add_status_history(&self, entry: &StatusHistoryEntry) -> RepositoryResult<()> {
        if !self.transactions.contains_key(&entry.transaction_id) {
            return Err(RepositoryError::NotFound(entry.transaction_id.to_string()));
        }
        self.history
            .entry(entry.transaction_id)
            .or_default()
            .push(entry.clone());
        self.persist().await;
        Ok(())
    }

    async fn get_transaction_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.transactions
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get_transaction_by_tx_id(&self, tx_id: &str) -> RepositoryResult<Transaction> {
        let id = self
            .by_tx_id
            .get(tx_id)
            .map(|r| *r.value())
            .ok_or_else(|| RepositoryError::NotFound(tx_id.to_string()))?;
        self.get_transaction_by_id(id).await
    }

    async fn query_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> RepositoryResult<Vec<Transaction>> {
        let mut matches: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|r| filters.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        matches.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(a.id.cmp(&b.id)));

        Ok(matches
            .into_iter()
            .skip(filters.offset)
            .take(filters.limit)
            .collect())
    }

    async fn get_status_history(&self, id: Uuid) -> RepositoryResult<Vec<StatusHistoryEntry>> {
        if !self.transactions.contains_key(&id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(self
            .history
            .get(&id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}
