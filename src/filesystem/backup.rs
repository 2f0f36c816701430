//! Content-addressed backup tree: pre-operation snapshots the filesystem
//! executor restores from on rollback. Organized as
//! `<backup_dir>/<transaction_id|"untracked">/<operation_id>/<hash>_<name>`
//! (spec §6 "Journal persisted state").

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn operation_dir(&self, transaction_id: Option<u64>, backup_id: &str) -> PathBuf {
        let txn_segment = transaction_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "untracked".to_string());
        self.root.join(txn_segment).join(backup_id)
    }

    /// Snapshot a single file's current content, naming the backup by the
    /// content hash so repeated backups of the same path under the same
    /// operation never collide. `backup_id` scopes the snapshot to one
    /// in-flight operation (a freshly generated uuid, since the journal's
    /// numeric operation id isn't known until after pre-state is captured).
    pub fn backup_file(
        &self,
        transaction_id: Option<u64>,
        backup_id: &str,
        path: &Path,
    ) -> Result<PathBuf> {
        let dir = self.operation_dir(transaction_id, backup_id);
        fs::create_dir_all(&dir)?;

        let content = fs::read(path)?;
        let hash = hex::encode(Sha256::digest(&content));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let backup_path = dir.join(format!("{hash}_{name}"));
        fs::write(&backup_path, &content)?;
        Ok(backup_path)
    }

    /// Recursively snapshot a directory tree under its own backup
    /// sub-directory (not content-addressed internally, since restoring
    /// must reproduce the original tree layout exactly).
    pub fn backup_directory(
        &self,
        transaction_id: Option<u64>,
        backup_id: &str,
        path: &Path,
    ) -> Result<PathBuf> {
        let dir = self.operation_dir(transaction_id, backup_id);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dir".to_string());
        let backup_path = dir.join(name);
        copy_dir_recursive(path, &backup_path)?;
        Ok(backup_path)
    }

    pub fn restore_file(&self, backup_path: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(backup_path, dest)?;
        Ok(())
    }

    pub fn restore_directory(&self, backup_path: &Path, dest: &Path) -> Result<()> {
        copy_dir_recursive(backup_path, dest)
    }

    /// Discard every backup taken for a transaction. Callers must only
    /// invoke this after the referencing records have transitioned to
    /// `rolled_back` or the transaction has been explicitly discarded
    /// (spec §5 "shared-resource policy").
    pub fn cleanup_transaction(&self, transaction_id: u64) -> Result<()> {
        let dir = self.root.join(transaction_id.to_string());
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else {
            fs::copy(entry.path(), &dst_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_and_restore_file_round_trips_content() {
        let root = TempDir::new().unwrap();
        let manager = BackupManager::new(root.path());

        let src_dir = TempDir::new().unwrap();
        let src_file = src_dir.path().join("note.txt");
        fs::write(&src_file, b"hello").unwrap();

        let backup_path = manager.backup_file(Some(1), "op-10", &src_file).unwrap();
        assert!(backup_path.exists());

        fs::write(&src_file, b"mutated").unwrap();
        manager.restore_file(&backup_path, &src_file).unwrap();
        assert_eq!(fs::read_to_string(&src_file).unwrap(), "hello");
    }

    #[test]
    fn backup_directory_preserves_tree() {
        let root = TempDir::new().unwrap();
        let manager = BackupManager::new(root.path());

        let src_dir = TempDir::new().unwrap();
        let nested = src_dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a.txt"), b"a").unwrap();

        let backup_path = manager
            .backup_directory(Some(2), "op-20", src_dir.path())
            .unwrap();
        assert!(backup_path.join("sub").join("a.txt").exists());
    }

    #[test]
    fn cleanup_transaction_removes_its_tree() {
        let root = TempDir::new().unwrap();
        let manager = BackupManager::new(root.path());
        let src_dir = TempDir::new().unwrap();
        let src_file = src_dir.path().join("note.txt");
        fs::write(&src_file, b"hello").unwrap();

        manager.backup_file(Some(3), "op-30", &src_file).unwrap();
        manager.cleanup_transaction(3).unwrap();
        assert!(!root.path().join("3").exists());
    }
}
