//! Durable `JournalStore` backed by two append-style JSONL files
//! (`operations.jsonl`, `transactions.jsonl`) under a directory, rewritten
//! atomically (write-temp-then-rename) on every mutation and `fsync`'d
//! before returning, so a record observed as `committed` by a caller is
//! never lost to a crash (spec §13.1 durability decision).

use super::{
    Inverse, JournalStore, OperationKind, OperationRecord, OperationStatus, Transaction,
    TransactionStatus,
};
use crate::error::{AngelaError, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct State {
    next_operation_id: u64,
    next_transaction_id: u64,
    operations: HashMap<u64, OperationRecord>,
    transactions: HashMap<u64, Transaction>,
}

pub struct JsonlJournalStore {
    dir: PathBuf,
    state: Mutex<State>,
}

impl JsonlJournalStore {
    /// Open (creating if absent) a journal rooted at `dir`, replaying any
    /// existing records so the store survives process restarts.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let state = Self::load(&dir)?;
        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    fn operations_path(dir: &Path) -> PathBuf {
        dir.join("operations.jsonl")
    }

    fn transactions_path(dir: &Path) -> PathBuf {
        dir.join("transactions.jsonl")
    }

    fn load(dir: &Path) -> Result<State> {
        let mut operations = HashMap::new();
        let mut transactions = HashMap::new();
        let mut next_operation_id = 1u64;
        let mut next_transaction_id = 1u64;

        let op_path = Self::operations_path(dir);
        if op_path.exists() {
            for line in fs::read_to_string(&op_path)?.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: OperationRecord = serde_json::from_str(line)?;
                next_operation_id = next_operation_id.max(record.id + 1);
                operations.insert(record.id, record);
            }
        }

        let txn_path = Self::transactions_path(dir);
        if txn_path.exists() {
            for line in fs::read_to_string(&txn_path)?.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let txn: Transaction = serde_json::from_str(line)?;
                next_transaction_id = next_transaction_id.max(txn.id + 1);
                transactions.insert(txn.id, txn);
            }
        }

        Ok(State {
            next_operation_id,
            next_transaction_id,
            operations,
            transactions,
        })
    }

    fn flush_operations(&self, state: &State) -> Result<()> {
        let mut ids: Vec<_> = state.operations.keys().copied().collect();
        ids.sort_unstable();
        let tmp = self.dir.join("operations.jsonl.tmp");
        let mut file = File::create(&tmp)?;
        for id in ids {
            writeln!(file, "{}", serde_json::to_string(&state.operations[&id])?)?;
        }
        file.sync_all()?;
        fs::rename(&tmp, Self::operations_path(&self.dir))?;
        Ok(())
    }

    fn flush_transactions(&self, state: &State) -> Result<()> {
        let mut ids: Vec<_> = state.transactions.keys().copied().collect();
        ids.sort_unstable();
        let tmp = self.dir.join("transactions.jsonl.tmp");
        let mut file = File::create(&tmp)?;
        for id in ids {
            writeln!(file, "{}", serde_json::to_string(&state.transactions[&id])?)?;
        }
        file.sync_all()?;
        fs::rename(&tmp, Self::transactions_path(&self.dir))?;
        Ok(())
    }
}

impl JournalStore for JsonlJournalStore {
    fn begin(&self, description: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_transaction_id;
        state.next_transaction_id += 1;

        state.transactions.insert(
            id,
            Transaction {
                id,
                description: description.to_string(),
                started_at: Utc::now(),
                status: TransactionStatus::Open,
                operation_ids: Vec::new(),
            },
        );
        self.flush_transactions(&state)?;
        tracing::debug!(transaction_id = id, %description, "transaction opened");
        Ok(id)
    }

    fn add_operation(
        &self,
        transaction_id: Option<u64>,
        kind: OperationKind,
        description: &str,
        forward_params: Value,
        inverse: Inverse,
    ) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_operation_id;
        state.next_operation_id += 1;

        let can_rollback = inverse.is_reversible();
        state.operations.insert(
            id,
            OperationRecord {
                id,
                transaction_id,
                kind,
                timestamp: Utc::now(),
                description: description.to_string(),
                forward_params,
                inverse,
                can_rollback,
                status: OperationStatus::Pending,
            },
        );

        if let Some(txn_id) = transaction_id {
            let txn = state
                .transactions
                .get_mut(&txn_id)
                .ok_or_else(|| AngelaError::NotFound(format!("transaction {txn_id}")))?;
            txn.operation_ids.push(id);
        }

        self.flush_operations(&state)?;
        if transaction_id.is_some() {
            self.flush_transactions(&state)?;
        }
        tracing::debug!(operation_id = id, ?transaction_id, "operation journaled");
        Ok(id)
    }

    fn commit_operation(&self, operation_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .operations
            .get_mut(&operation_id)
            .ok_or_else(|| AngelaError::NotFound(format!("operation {operation_id}")))?;
        record.status = OperationStatus::Committed;
        self.flush_operations(&state)
    }

    fn fail_operation(&self, operation_id: u64, error: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .operations
            .get_mut(&operation_id)
            .ok_or_else(|| AngelaError::NotFound(format!("operation {operation_id}")))?;
        record.status = OperationStatus::Failed;
        tracing::warn!(operation_id, %error, "operation failed");
        self.flush_operations(&state)
    }

    fn rollback_operation(&self, operation_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .operations
            .get_mut(&operation_id)
            .ok_or_else(|| AngelaError::NotFound(format!("operation {operation_id}")))?;
        record.status = OperationStatus::RolledBack;
        self.flush_operations(&state)
    }

    fn close_transaction(&self, transaction_id: u64, status: TransactionStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let txn = state
            .transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| AngelaError::NotFound(format!("transaction {transaction_id}")))?;
        txn.status = status;
        self.flush_transactions(&state)
    }

    fn lookup_operation(&self, operation_id: u64) -> Result<OperationRecord> {
        let state = self.state.lock().unwrap();
        state
            .operations
            .get(&operation_id)
            .cloned()
            .ok_or_else(|| AngelaError::NotFound(format!("operation {operation_id}")))
    }

    fn lookup_transaction(&self, transaction_id: u64) -> Result<Transaction> {
        let state = self.state.lock().unwrap();
        state
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| AngelaError::NotFound(format!("transaction {transaction_id}")))
    }

    fn recent_operations(&self, limit: usize) -> Result<Vec<OperationRecord>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<_> = state.operations.values().cloned().collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        records.truncate(limit);
        Ok(records)
    }

    fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let state = self.state.lock().unwrap();
        let mut txns: Vec<_> = state.transactions.values().cloned().collect();
        txns.sort_by(|a, b| b.id.cmp(&a.id));
        txns.truncate(limit);
        Ok(txns)
    }

    fn transaction_operations_desc(&self, transaction_id: u64) -> Result<Vec<OperationRecord>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<_> = state
            .operations
            .values()
            .filter(|r| r.transaction_id == Some(transaction_id) && r.status == OperationStatus::Committed)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Inverse;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonlJournalStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonlJournalStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn begin_and_add_operation_links_transaction() {
        let (_dir, store) = store();
        let txn_id = store.begin("test plan").unwrap();
        let op_id = store
            .add_operation(
                Some(txn_id),
                OperationKind::CreateFile,
                "create x.txt",
                serde_json::json!({"path": "x.txt"}),
                Inverse::backup("/tmp/backup/x.txt"),
            )
            .unwrap();

        let txn = store.lookup_transaction(txn_id).unwrap();
        assert_eq!(txn.operation_ids, vec![op_id]);

        let record = store.lookup_operation(op_id).unwrap();
        assert_eq!(record.status, OperationStatus::Pending);
        assert!(record.can_rollback);
    }

    #[test]
    fn commit_then_reload_survives_restart() {
        let dir = TempDir::new().unwrap();
        let op_id = {
            let store = JsonlJournalStore::open(dir.path()).unwrap();
            let txn_id = store.begin("plan").unwrap();
            let id = store
                .add_operation(
                    Some(txn_id),
                    OperationKind::CreateFile,
                    "create",
                    Value::Null,
                    Inverse::none(),
                )
                .unwrap();
            store.commit_operation(id).unwrap();
            store.close_transaction(txn_id, TransactionStatus::Committed).unwrap();
            id
        };

        let reopened = JsonlJournalStore::open(dir.path()).unwrap();
        let record = reopened.lookup_operation(op_id).unwrap();
        assert_eq!(record.status, OperationStatus::Committed);
    }

    #[test]
    fn transaction_operations_desc_orders_by_id_descending() {
        let (_dir, store) = store();
        let txn_id = store.begin("plan").unwrap();
        let mut ids = Vec::new();
        for i in 0..3 {
            let id = store
                .add_operation(
                    Some(txn_id),
                    OperationKind::CreateFile,
                    &format!("op {i}"),
                    Value::Null,
                    Inverse::none(),
                )
                .unwrap();
            store.commit_operation(id).unwrap();
            ids.push(id);
        }

        let ordered = store.transaction_operations_desc(txn_id).unwrap();
        let ordered_ids: Vec<_> = ordered.iter().map(|r| r.id).collect();
        ids.reverse();
        assert_eq!(ordered_ids, ids);
    }

    #[test]
    fn lookup_missing_operation_errors() {
        let (_dir, store) = store();
        assert!(store.lookup_operation(999).is_err());
    }
}
