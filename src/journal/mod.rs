//! Operation and transaction journal: the durable record of every side
//! effect the core has performed, and the substrate rollback reads from.

pub mod store;

pub use store::JsonlJournalStore;

use crate::error::Result;
use crate::safety::FsOperationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a single operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Committed,
    RolledBack,
    Failed,
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Open,
    Committed,
    RolledBack,
    PartiallyRolledBack,
    Failed,
}

/// What kind of side effect an operation record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateFile,
    WriteFile,
    DeleteFile,
    CreateDir,
    DeleteDir,
    CopyFile,
    MoveFile,
    ShellCommand,
}

impl From<FsOperationKind> for OperationKind {
    fn from(kind: FsOperationKind) -> Self {
        match kind {
            FsOperationKind::CreateFile => OperationKind::CreateFile,
            FsOperationKind::WriteFile => OperationKind::WriteFile,
            FsOperationKind::ReadFile => OperationKind::WriteFile,
            FsOperationKind::DeleteFile => OperationKind::DeleteFile,
            FsOperationKind::CreateDirectory => OperationKind::CreateDir,
            FsOperationKind::DeleteDirectory => OperationKind::DeleteDir,
            FsOperationKind::CopyFile => OperationKind::CopyFile,
            FsOperationKind::MoveFile => OperationKind::MoveFile,
        }
    }
}

/// Reference to the inverse of a committed operation: a backup path
/// and/or an explicit inverse command, plus a flag for operations whose
/// inverse is structural (delete-the-created-entity, rmdir, move-back)
/// and therefore reversible even with no backup recorded at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inverse {
    pub backup_path: Option<String>,
    /// For shell commands, an explicit inverse command supplied at
    /// journaling time (spec §4.6 "Non-reversible effects").
    pub inverse_command: Option<String>,
    /// True when §4.4's inverse table defines an inverse for this
    /// operation kind that needs no backup at all (e.g. `create_file`'s
    /// "delete the created file", `create_directory`'s `rmdir`,
    /// `move_file`'s "move dst back to src").
    #[serde(default)]
    pub structural: bool,
}

impl Inverse {
    /// No inverse exists at all (e.g. a shell command with no caller-supplied
    /// inverse command).
    pub fn none() -> Self {
        Self {
            backup_path: None,
            inverse_command: None,
            structural: false,
        }
    }

    /// Reversible via a saved backup copy.
    pub fn backup(path: impl Into<String>) -> Self {
        Self {
            backup_path: Some(path.into()),
            inverse_command: None,
            structural: true,
        }
    }

    /// Reversible purely structurally — no backup was needed.
    pub fn structural_only() -> Self {
        Self {
            backup_path: None,
            inverse_command: None,
            structural: true,
        }
    }

    /// Reversible via an explicit shell command supplied by the caller.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            backup_path: None,
            inverse_command: Some(command.into()),
            structural: false,
        }
    }

    pub fn is_reversible(&self) -> bool {
        self.structural || self.backup_path.is_some() || self.inverse_command.is_some()
    }
}

/// A single journal entry (spec §3 "Operation record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: u64,
    pub transaction_id: Option<u64>,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub forward_params: Value,
    pub inverse: Inverse,
    pub can_rollback: bool,
    pub status: OperationStatus,
}

/// An ordered group of operation records sharing a transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub operation_ids: Vec<u64>,
}

/// Durable store for operations and transactions. Implementations MUST
/// serialize writes (§5 "the journal is the only truly shared mutable
/// resource") and MUST NOT report an operation `committed` until the
/// write backing it is flushed to disk (§13.1).
pub trait JournalStore: Send + Sync {
    fn begin(&self, description: &str) -> Result<u64>;

    fn add_operation(
        &self,
        transaction_id: Option<u64>,
        kind: OperationKind,
        description: &str,
        forward_params: Value,
        inverse: Inverse,
    ) -> Result<u64>;

    fn commit_operation(&self, operation_id: u64) -> Result<()>;
    fn fail_operation(&self, operation_id: u64, error: &str) -> Result<()>;
    fn rollback_operation(&self, operation_id: u64) -> Result<()>;

    fn close_transaction(&self, transaction_id: u64, status: TransactionStatus) -> Result<()>;

    fn lookup_operation(&self, operation_id: u64) -> Result<OperationRecord>;
    fn lookup_transaction(&self, transaction_id: u64) -> Result<Transaction>;

    fn recent_operations(&self, limit: usize) -> Result<Vec<OperationRecord>>;
    fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>>;

    /// All committed operations belonging to a transaction, ordered by
    /// `id` descending (the order rollback applies inverses in).
    fn transaction_operations_desc(&self, transaction_id: u64) -> Result<Vec<OperationRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_reversibility() {
        assert!(!Inverse::none().is_reversible());
        assert!(Inverse::backup("/tmp/x").is_reversible());
        assert!(Inverse::command("rm x").is_reversible());
        assert!(Inverse::structural_only().is_reversible());
    }

    #[test]
    fn fs_kind_maps_to_operation_kind() {
        assert_eq!(
            OperationKind::from(FsOperationKind::CreateFile),
            OperationKind::CreateFile
        );
        assert_eq!(
            OperationKind::from(FsOperationKind::DeleteDirectory),
            OperationKind::DeleteDir
        );
    }
}
