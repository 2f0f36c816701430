//! Filesystem executor: journaled, reversible create/write/delete/move/copy
//! operations (spec §4.4).

pub mod backup;

pub use backup::BackupManager;

use crate::error::{AngelaError, Result};
use crate::journal::{Inverse, JournalStore, OperationKind};
use crate::safety::{FsOperationKind, SafetyClassifier};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One filesystem mutation the executor knows how to perform and invert.
/// `Serialize`/`Deserialize` let a plan's `file_op` step carry one of these
/// as its JSON-encoded `command` (spec §4.5 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsOperation {
    CreateFile {
        path: PathBuf,
        content: Vec<u8>,
        overwrite: bool,
    },
    WriteFile {
        path: PathBuf,
        content: Vec<u8>,
    },
    DeleteFile {
        path: PathBuf,
    },
    CreateDirectory {
        path: PathBuf,
        parents: bool,
    },
    DeleteDirectory {
        path: PathBuf,
    },
    CopyFile {
        src: PathBuf,
        dst: PathBuf,
        overwrite: bool,
    },
    MoveFile {
        src: PathBuf,
        dst: PathBuf,
        overwrite: bool,
    },
}

impl FsOperation {
    fn kind(&self) -> FsOperationKind {
        match self {
            FsOperation::CreateFile { .. } => FsOperationKind::CreateFile,
            FsOperation::WriteFile { .. } => FsOperationKind::WriteFile,
            FsOperation::DeleteFile { .. } => FsOperationKind::DeleteFile,
            FsOperation::CreateDirectory { .. } => FsOperationKind::CreateDirectory,
            FsOperation::DeleteDirectory { .. } => FsOperationKind::DeleteDirectory,
            FsOperation::CopyFile { .. } => FsOperationKind::CopyFile,
            FsOperation::MoveFile { .. } => FsOperationKind::MoveFile,
        }
    }

    fn primary_path(&self) -> &Path {
        match self {
            FsOperation::CreateFile { path, .. }
            | FsOperation::WriteFile { path, .. }
            | FsOperation::DeleteFile { path }
            | FsOperation::CreateDirectory { path, .. }
            | FsOperation::DeleteDirectory { path } => path,
            FsOperation::CopyFile { src, .. } | FsOperation::MoveFile { src, .. } => src,
        }
    }

    fn other_path(&self) -> Option<&Path> {
        match self {
            FsOperation::CopyFile { dst, .. } | FsOperation::MoveFile { dst, .. } => Some(dst),
            _ => None,
        }
    }

    fn description(&self) -> String {
        match self {
            FsOperation::CreateFile { path, .. } => format!("create file {}", path.display()),
            FsOperation::WriteFile { path, .. } => format!("write file {}", path.display()),
            FsOperation::DeleteFile { path } => format!("delete file {}", path.display()),
            FsOperation::CreateDirectory { path, .. } => {
                format!("create directory {}", path.display())
            }
            FsOperation::DeleteDirectory { path } => {
                format!("delete directory {}", path.display())
            }
            FsOperation::CopyFile { src, dst, .. } => {
                format!("copy {} to {}", src.display(), dst.display())
            }
            FsOperation::MoveFile { src, dst, .. } => {
                format!("move {} to {}", src.display(), dst.display())
            }
        }
    }
}

/// Performs the seven filesystem operations, backing up pre-state before
/// mutating and recording a journal entry for every attempt (committed on
/// success, failed on error).
#[derive(Clone)]
pub struct FilesystemExecutor {
    classifier: Arc<SafetyClassifier>,
    backups: BackupManager,
    journal: Arc<dyn JournalStore>,
}

impl FilesystemExecutor {
    pub fn new(
        classifier: Arc<SafetyClassifier>,
        backups: BackupManager,
        journal: Arc<dyn JournalStore>,
    ) -> Self {
        Self {
            classifier,
            backups,
            journal,
        }
    }

    /// Validate, back up, perform, and journal one operation. Returns the
    /// committed operation's journal id.
    pub fn perform(&self, op: FsOperation, transaction_id: Option<u64>) -> Result<u64> {
        self.classifier
            .validate_fs_operation(op.kind(), op.primary_path(), op.other_path())
            .map_err(AngelaError::Refusal)?;

        let backup_id = uuid::Uuid::new_v4().to_string();
        let (inverse, forward_params) = self.prepare(&op, transaction_id, &backup_id)?;

        let operation_id = self.journal.add_operation(
            transaction_id,
            OperationKind::from(op.kind()),
            &op.description(),
            forward_params,
            inverse,
        )?;

        match self.apply(&op) {
            Ok(()) => {
                self.journal.commit_operation(operation_id)?;
                Ok(operation_id)
            }
            Err(e) => {
                self.journal.fail_operation(operation_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// Capture pre-state (per the §4.4 table) and build the inverse and
    /// forward-params that will be journaled, before any mutation happens.
    fn prepare(
        &self,
        op: &FsOperation,
        transaction_id: Option<u64>,
        backup_id: &str,
    ) -> Result<(Inverse, serde_json::Value)> {
        match op {
            FsOperation::CreateFile {
                path,
                content,
                overwrite,
            } => {
                if path.exists() && !overwrite {
                    return Err(AngelaError::PreconditionFailed(format!(
                        "{} already exists",
                        path.display()
                    )));
                }
                let inverse = if *overwrite && path.exists() {
                    let backup = self.backups.backup_file(transaction_id, backup_id, path)?;
                    Inverse::backup(backup.to_string_lossy().into_owned())
                } else {
                    // Nothing existed at `path` before; its inverse is
                    // simply deleting the file this call creates.
                    Inverse::structural_only()
                };
                Ok((
                    inverse,
                    json!({"path": path, "content_len": content.len(), "overwrite": overwrite}),
                ))
            }
            FsOperation::WriteFile { path, content } => {
                if !path.exists() {
                    return Err(AngelaError::PreconditionFailed(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
                let backup = self.backups.backup_file(transaction_id, backup_id, path)?;
                Ok((
                    Inverse::backup(backup.to_string_lossy().into_owned()),
                    json!({"path": path, "content_len": content.len()}),
                ))
            }
            FsOperation::DeleteFile { path } => {
                if !path.exists() {
                    return Err(AngelaError::PreconditionFailed(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
                let backup = self.backups.backup_file(transaction_id, backup_id, path)?;
                Ok((
                    Inverse::backup(backup.to_string_lossy().into_owned()),
                    json!({"path": path}),
                ))
            }
            FsOperation::CreateDirectory { path, parents } => Ok((
                // Always reversible via `rmdir` (best-effort — only
                // succeeds if the directory is still empty at rollback
                // time, per §4.4's inverse table).
                Inverse::structural_only(),
                json!({"path": path, "parents": parents}),
            )),
            FsOperation::DeleteDirectory { path } => {
                if !path.exists() {
                    return Err(AngelaError::PreconditionFailed(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
                let backup = self
                    .backups
                    .backup_directory(transaction_id, backup_id, path)?;
                Ok((
                    Inverse::backup(backup.to_string_lossy().into_owned()),
                    json!({"path": path}),
                ))
            }
            FsOperation::CopyFile { src, dst, overwrite } => {
                if !src.exists() {
                    return Err(AngelaError::PreconditionFailed(format!(
                        "{} does not exist",
                        src.display()
                    )));
                }
                let inverse = if *overwrite && dst.exists() {
                    let backup = self.backups.backup_file(transaction_id, backup_id, dst)?;
                    Inverse::backup(backup.to_string_lossy().into_owned())
                } else {
                    // Inverse is "delete dst", which needs no backup.
                    Inverse::structural_only()
                };
                Ok((inverse, json!({"src": src, "dst": dst, "overwrite": overwrite})))
            }
            FsOperation::MoveFile { src, dst, overwrite } => {
                if !src.exists() {
                    return Err(AngelaError::PreconditionFailed(format!(
                        "{} does not exist",
                        src.display()
                    )));
                }
                let inverse = if *overwrite && dst.exists() {
                    let backup = self.backups.backup_file(transaction_id, backup_id, dst)?;
                    Inverse::backup(backup.to_string_lossy().into_owned())
                } else {
                    // Inverse is "move dst back to src", which needs no
                    // backup of its own.
                    Inverse::structural_only()
                };
                Ok((inverse, json!({"src": src, "dst": dst, "overwrite": overwrite})))
            }
        }
    }

    /// Perform the forward mutation. Best-effort atomic: writes land in a
    /// temp file renamed into place where the OS supports it.
    fn apply(&self, op: &FsOperation) -> Result<()> {
        match op {
            FsOperation::CreateFile { path, content, .. }
            | FsOperation::WriteFile { path, content } => write_atomic(path, content),
            FsOperation::DeleteFile { path } => {
                fs::remove_file(path)?;
                Ok(())
            }
            FsOperation::CreateDirectory { path, parents } => {
                if *parents {
                    fs::create_dir_all(path)?;
                } else {
                    fs::create_dir(path)?;
                }
                Ok(())
            }
            FsOperation::DeleteDirectory { path } => {
                fs::remove_dir_all(path)?;
                Ok(())
            }
            FsOperation::CopyFile { src, dst, .. } => {
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(src, dst)?;
                Ok(())
            }
            FsOperation::MoveFile { src, dst, .. } => {
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(src, dst)?;
                Ok(())
            }
        }
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.angela-tmp"));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
