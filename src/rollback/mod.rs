//! Rollback manager: reverses committed operations, singly or as a whole
//! transaction, in strict reverse order (spec §4.6).

use crate::error::{AngelaError, Result};
use crate::filesystem::BackupManager;
use crate::journal::{JournalStore, OperationKind, OperationRecord, OperationStatus};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of rolling back one operation.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub operation_id: u64,
    pub rolled_back: bool,
    pub detail: String,
}

/// Outcome of rolling back a whole transaction: one entry per operation,
/// in the order rollback attempted them (descending id).
#[derive(Debug, Clone)]
pub struct TransactionRollbackOutcome {
    pub transaction_id: u64,
    pub operations: Vec<RollbackOutcome>,
}

impl TransactionRollbackOutcome {
    pub fn fully_rolled_back(&self) -> bool {
        self.operations.iter().all(|o| o.rolled_back)
    }
}

pub struct RollbackManager {
    journal: Arc<dyn JournalStore>,
    backups: BackupManager,
}

impl RollbackManager {
    pub fn new(journal: Arc<dyn JournalStore>, backups: BackupManager) -> Self {
        Self { journal, backups }
    }

    /// Roll back a single committed operation. Non-reversible operations
    /// (no backup, no inverse command) are refused rather than silently
    /// skipped.
    pub fn rollback_operation(&self, operation_id: u64) -> Result<RollbackOutcome> {
        let record = self.journal.lookup_operation(operation_id)?;
        self.apply_inverse(&record)?;
        self.journal.rollback_operation(operation_id)?;
        info!(operation_id, "rolled back operation");
        Ok(RollbackOutcome {
            operation_id,
            rolled_back: true,
            detail: record.description,
        })
    }

    /// Roll back every committed operation in a transaction, in strict
    /// descending-id order (spec §4.6 "strict reverse order"). Every
    /// committed record gets an attempt regardless of earlier failures in
    /// the same pass (best-effort cleanup); the transaction closes as
    /// `rolled_back`, `partially_rolled_back`, or `failed` depending on how
    /// many inverses actually succeeded.
    pub fn rollback_transaction(&self, transaction_id: u64) -> Result<TransactionRollbackOutcome> {
        let operations = self.journal.transaction_operations_desc(transaction_id)?;
        let mut outcomes = Vec::with_capacity(operations.len());

        // Best-effort: every committed record gets an attempt, even after an
        // earlier one in this same pass failed to reverse (spec §4.6 "attempt
        // inverse of each in turn" / scenario 4's partial-rollback example).
        for record in &operations {
            if record.status != OperationStatus::Committed {
                continue;
            }

            match self.apply_inverse(record) {
                Ok(()) => {
                    self.journal.rollback_operation(record.id)?;
                    outcomes.push(RollbackOutcome {
                        operation_id: record.id,
                        rolled_back: true,
                        detail: record.description.clone(),
                    });
                }
                Err(e) => {
                    warn!(operation_id = record.id, error = %e, "operation could not be reversed");
                    outcomes.push(RollbackOutcome {
                        operation_id: record.id,
                        rolled_back: false,
                        detail: e.to_string(),
                    });
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.rolled_back).count();
        let failed = outcomes.len() - succeeded;
        let final_status = if failed == 0 {
            crate::journal::TransactionStatus::RolledBack
        } else if succeeded == 0 {
            crate::journal::TransactionStatus::Failed
        } else {
            crate::journal::TransactionStatus::PartiallyRolledBack
        };

        self.journal.close_transaction(transaction_id, final_status)?;
        if final_status == crate::journal::TransactionStatus::RolledBack {
            self.backups.cleanup_transaction(transaction_id)?;
        }

        Ok(TransactionRollbackOutcome {
            transaction_id,
            operations: outcomes,
        })
    }

    /// Roll back the most recently committed operation (or, if
    /// `transaction` is true, the most recent transaction).
    pub fn rollback_last_operation(&self) -> Result<RollbackOutcome> {
        let recent = self.journal.recent_operations(1)?;
        let record = recent
            .into_iter()
            .next()
            .ok_or_else(|| AngelaError::NotFound("no operations recorded".to_string()))?;
        self.rollback_operation(record.id)
    }

    pub fn rollback_last_transaction(&self) -> Result<TransactionRollbackOutcome> {
        let recent = self.journal.recent_transactions(1)?;
        let transaction = recent
            .into_iter()
            .next()
            .ok_or_else(|| AngelaError::NotFound("no transactions recorded".to_string()))?;
        self.rollback_transaction(transaction.id)
    }

    /// Apply a record's inverse without touching the journal. Used by
    /// both single-operation and transaction rollback so the journal
    /// status transition always happens after the filesystem/command
    /// effect actually lands.
    fn apply_inverse(&self, record: &OperationRecord) -> Result<()> {
        if record.status != OperationStatus::Committed {
            return Err(AngelaError::RollbackError(format!(
                "operation {} is not in a rollback-eligible state",
                record.id
            )));
        }

        if !record.can_rollback || !record.inverse.is_reversible() {
            return Err(AngelaError::RollbackError(format!(
                "operation {} has no recorded inverse",
                record.id
            )));
        }

        if let Some(command) = &record.inverse.inverse_command {
            return Err(AngelaError::RollbackError(format!(
                "operation {} requires running its inverse command manually: {command}",
                record.id
            )));
        }

        let backup_path = record.inverse.backup_path.as_deref().map(Path::new);

        // §4.4's inverse table, one arm per forward operation:
        match record.kind {
            // create_file: delete the created file; restore the backup
            // first if this call overwrote something.
            OperationKind::CreateFile => {
                let path = forward_path(record, "path")?;
                restore_or_delete(&self.backups, backup_path, &path)?;
            }
            // write_file / delete_file: both always carry a backup of the
            // prior content.
            OperationKind::WriteFile | OperationKind::DeleteFile => {
                let path = forward_path(record, "path")?;
                let bp = backup_path.ok_or_else(|| {
                    AngelaError::RollbackError(format!(
                        "operation {} is missing its required backup",
                        record.id
                    ))
                })?;
                self.backups.restore_file(bp, &path)?;
            }
            // create_directory: rmdir, only if still empty.
            OperationKind::CreateDir => {
                let path = forward_path(record, "path")?;
                remove_empty_dir(&path)?;
            }
            // delete_directory: always carries a recursive backup tree.
            OperationKind::DeleteDir => {
                let path = forward_path(record, "path")?;
                let bp = backup_path.ok_or_else(|| {
                    AngelaError::RollbackError(format!(
                        "operation {} is missing its required directory backup",
                        record.id
                    ))
                })?;
                self.backups.restore_directory(bp, &path)?;
            }
            // copy_file: delete dst; restore the backup first if this call
            // overwrote an existing dst.
            OperationKind::CopyFile => {
                let dst = forward_path(record, "dst")?;
                restore_or_delete(&self.backups, backup_path, &dst)?;
            }
            // move_file: move dst back to src; restore a backed-up dst
            // afterwards if this call overwrote an existing dst.
            OperationKind::MoveFile => {
                let src = forward_path(record, "src")?;
                let dst = forward_path(record, "dst")?;
                if dst.exists() {
                    if let Some(parent) = src.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::rename(&dst, &src)?;
                }
                if let Some(bp) = backup_path {
                    if bp.exists() {
                        self.backups.restore_file(bp, &dst)?;
                    }
                }
            }
            OperationKind::ShellCommand => {
                return Err(AngelaError::RollbackError(
                    "shell commands are only reversible via an explicit inverse command"
                        .to_string(),
                ))
            }
        }

        Ok(())
    }
}

fn delete_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_empty_dir(path: &Path) -> Result<()> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Shared shape for `create_file`/`copy_file`: restore the backed-up
/// previous content if one was recorded, otherwise just delete whatever
/// the forward call created.
fn restore_or_delete(
    backups: &BackupManager,
    backup_path: Option<&Path>,
    dest: &Path,
) -> Result<()> {
    match backup_path {
        Some(bp) if bp.exists() => backups.restore_file(bp, dest),
        _ => delete_if_present(dest),
    }
}

/// Read a path out of a record's forward params by key.
fn forward_path(record: &OperationRecord, key: &str) -> Result<std::path::PathBuf> {
    record
        .forward_params
        .get(key)
        .and_then(|v| v.as_str())
        .map(std::path::PathBuf::from)
        .ok_or_else(|| {
            AngelaError::RollbackError(format!(
                "operation {} is missing a `{key}` forward param",
                record.id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FilesystemExecutor, FsOperation};
    use crate::journal::store::JsonlJournalStore;
    use crate::safety::SafetyClassifier;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, TempDir, Arc<dyn JournalStore>, FilesystemExecutor, RollbackManager) {
        let work = TempDir::new().unwrap();
        let journal_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();
        let journal: Arc<dyn JournalStore> =
            Arc::new(JsonlJournalStore::open(journal_dir.path()).unwrap());
        let fs_exec = FilesystemExecutor::new(
            Arc::new(SafetyClassifier::new(false)),
            BackupManager::new(backup_dir.path()),
            journal.clone(),
        );
        let rollback = RollbackManager::new(journal.clone(), BackupManager::new(backup_dir.path()));
        (work, journal_dir, backup_dir, journal, fs_exec, rollback)
    }

    #[test]
    fn rollback_write_restores_previous_content() {
        let (work, _jd, _bd, _journal, fs_exec, rollback) = setup();
        let path = work.path().join("note.txt");
        fs::write(&path, "original").unwrap();

        let op_id = fs_exec
            .perform(
                FsOperation::WriteFile {
                    path: path.clone(),
                    content: b"changed".to_vec(),
                },
                None,
            )
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "changed");

        rollback.rollback_operation(op_id).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn rollback_create_file_without_overwrite_deletes_it() {
        let (work, _jd, _bd, _journal, fs_exec, rollback) = setup();
        let path = work.path().join("new.txt");

        let op_id = fs_exec
            .perform(
                FsOperation::CreateFile {
                    path: path.clone(),
                    content: b"fresh".to_vec(),
                    overwrite: false,
                },
                None,
            )
            .unwrap();
        assert!(path.exists());

        rollback.rollback_operation(op_id).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn rollback_move_file_without_overwrite_moves_dst_back_to_src() {
        let (work, _jd, _bd, _journal, fs_exec, rollback) = setup();
        let src = work.path().join("a.txt");
        let dst = work.path().join("b.txt");
        fs::write(&src, "content").unwrap();

        let op_id = fs_exec
            .perform(
                FsOperation::MoveFile {
                    src: src.clone(),
                    dst: dst.clone(),
                    overwrite: false,
                },
                None,
            )
            .unwrap();
        assert!(!src.exists());
        assert!(dst.exists());

        rollback.rollback_operation(op_id).unwrap();
        assert!(src.exists(), "src must be restored by rollback");
        assert!(!dst.exists(), "dst must be gone after rollback");
        assert_eq!(fs::read_to_string(&src).unwrap(), "content");
    }

    #[test]
    fn rollback_copy_file_without_overwrite_deletes_dst_only() {
        let (work, _jd, _bd, _journal, fs_exec, rollback) = setup();
        let src = work.path().join("a.txt");
        let dst = work.path().join("b.txt");
        fs::write(&src, "content").unwrap();

        let op_id = fs_exec
            .perform(
                FsOperation::CopyFile {
                    src: src.clone(),
                    dst: dst.clone(),
                    overwrite: false,
                },
                None,
            )
            .unwrap();
        assert!(dst.exists());

        rollback.rollback_operation(op_id).unwrap();
        assert!(src.exists(), "src is untouched by copy_file's inverse");
        assert!(!dst.exists());
    }

    #[test]
    fn rollback_create_directory_removes_empty_dir() {
        let (work, _jd, _bd, _journal, fs_exec, rollback) = setup();
        let dir = work.path().join("newdir");

        let op_id = fs_exec
            .perform(
                FsOperation::CreateDirectory {
                    path: dir.clone(),
                    parents: false,
                },
                None,
            )
            .unwrap();
        assert!(dir.exists());

        rollback.rollback_operation(op_id).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn transaction_rollback_reverses_every_operation() {
        let (work, _jd, _bd, journal, fs_exec, rollback) = setup();
        let txn = journal.begin("batch edit").unwrap();

        let a = work.path().join("a.txt");
        let b = work.path().join("b.txt");
        fs::write(&a, "A0").unwrap();
        fs::write(&b, "B0").unwrap();

        fs_exec
            .perform(
                FsOperation::WriteFile {
                    path: a.clone(),
                    content: b"A1".to_vec(),
                },
                Some(txn),
            )
            .unwrap();
        fs_exec
            .perform(
                FsOperation::WriteFile {
                    path: b.clone(),
                    content: b"B1".to_vec(),
                },
                Some(txn),
            )
            .unwrap();

        let outcome = rollback.rollback_transaction(txn).unwrap();
        assert!(outcome.fully_rolled_back());
        assert_eq!(fs::read_to_string(&a).unwrap(), "A0");
        assert_eq!(fs::read_to_string(&b).unwrap(), "B0");
    }

    #[test]
    fn transaction_rollback_is_best_effort_around_irreversible_steps() {
        // Mirrors spec §8 scenario 4: s1 create_file(a), s2 shell_command
        // with no inverse, s3 never committed. Rolling back the
        // transaction must still revert s1 even though s2 (the newer,
        // descending-order-first record) cannot be reversed.
        let (work, _jd, _bd, journal, fs_exec, rollback) = setup();
        let txn = journal.begin("mixed plan").unwrap();

        let a = work.path().join("a.txt");
        fs_exec
            .perform(
                FsOperation::CreateFile {
                    path: a.clone(),
                    content: b"A".to_vec(),
                    overwrite: false,
                },
                Some(txn),
            )
            .unwrap();

        let shell_op = journal
            .add_operation(
                Some(txn),
                OperationKind::ShellCommand,
                "ran a shell command",
                serde_json::json!({"command": "echo hi"}),
                crate::journal::Inverse::none(),
            )
            .unwrap();
        journal.commit_operation(shell_op).unwrap();

        let outcome = rollback.rollback_transaction(txn).unwrap();
        assert!(!outcome.fully_rolled_back());
        assert!(!a.exists(), "create_file must still be reverted");

        let succeeded = outcome.operations.iter().filter(|o| o.rolled_back).count();
        let failed = outcome.operations.len() - succeeded;
        assert_eq!(succeeded, 1);
        assert_eq!(failed, 1);

        let txn_record = journal.lookup_transaction(txn).unwrap();
        assert_eq!(
            txn_record.status,
            crate::journal::TransactionStatus::PartiallyRolledBack
        );
    }

    #[test]
    fn transaction_rollback_reports_failed_when_nothing_reverses() {
        let (_work, _jd, _bd, journal, _fs_exec, rollback) = setup();
        let txn = journal.begin("irreversible only").unwrap();

        let shell_op = journal
            .add_operation(
                Some(txn),
                OperationKind::ShellCommand,
                "ran a shell command",
                serde_json::json!({"command": "echo hi"}),
                crate::journal::Inverse::none(),
            )
            .unwrap();
        journal.commit_operation(shell_op).unwrap();

        let outcome = rollback.rollback_transaction(txn).unwrap();
        assert!(outcome.operations.iter().all(|o| !o.rolled_back));

        let txn_record = journal.lookup_transaction(txn).unwrap();
        assert_eq!(txn_record.status, crate::journal::TransactionStatus::Failed);
    }

    #[test]
    fn rollback_refuses_non_reversible_operation() {
        let (_work, journal_dir, _bd, journal, _fs_exec, rollback) = setup();
        let _ = journal_dir;
        let op_id = journal
            .add_operation(
                None,
                OperationKind::ShellCommand,
                "ran a shell command",
                serde_json::json!({"command": "echo hi"}),
                crate::journal::Inverse::none(),
            )
            .unwrap();
        journal.commit_operation(op_id).unwrap();

        let result = rollback.rollback_operation(op_id);
        assert!(matches!(result, Err(AngelaError::RollbackError(_))));
    }
}
