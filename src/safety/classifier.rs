use super::impact::{classify_operations, extract_affected_paths, most_dangerous, tokenize, OperationTag};
use super::patterns::{first_refusal, requires_privilege, SYSTEM_DIRS};
use super::{Classification, FsOperationKind, Impact, RiskLevel};
use std::path::{Path, PathBuf};

/// Assigns a risk level, refusal verdict, and impact analysis to a
/// proposed command. Never executes anything and never touches the
/// filesystem beyond existence/permission checks needed for impact
/// resolution. Deterministic: the same command and environment always
/// classify identically.
pub struct SafetyClassifier {
    privileged: bool,
}

impl SafetyClassifier {
    pub fn new(privileged: bool) -> Self {
        Self { privileged }
    }

    /// Detect whether the current process runs with elevated privilege.
    /// Unix-only concept; non-Unix targets are treated as unprivileged.
    #[cfg(unix)]
    pub fn detect_privileged() -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    pub fn detect_privileged() -> bool {
        false
    }

    /// Classify a shell command given the working directory it would
    /// run in.
    pub fn classify(&self, command: &str, cwd: &Path) -> Classification {
        let trimmed = command.trim();

        if trimmed.is_empty() {
            return Classification {
                risk: RiskLevel::Critical,
                reason: "empty command".to_string(),
                impact: Impact::empty(),
                refusal: Some("empty command".to_string()),
                structural_issue: false,
            };
        }

        if let Some(message) = first_refusal(trimmed) {
            return Classification {
                risk: RiskLevel::Critical,
                reason: message.to_string(),
                impact: self.impact_for(trimmed, cwd),
                refusal: Some(message.to_string()),
                structural_issue: false,
            };
        }

        if !self.privileged && requires_privilege(trimmed) {
            let message =
                "This command requires superuser privileges, which Angela doesn't have.";
            return Classification {
                risk: RiskLevel::High,
                reason: message.to_string(),
                impact: self.impact_for(trimmed, cwd),
                refusal: Some(message.to_string()),
                structural_issue: false,
            };
        }

        let structural_issue = tokenize(trimmed).is_none();
        let impact = self.impact_for(trimmed, cwd);
        let (mut risk, reason) = score_risk(trimmed, &impact);

        if structural_issue && risk < RiskLevel::Medium {
            risk = RiskLevel::Medium;
        }

        Classification {
            risk,
            reason,
            impact,
            refusal: None,
            structural_issue,
        }
    }

    fn impact_for(&self, command: &str, cwd: &Path) -> Impact {
        let operations = classify_operations(command);
        let affected_paths = extract_affected_paths(command, cwd);
        let destructive = operations.iter().any(|op| op.is_destructive());
        let creates_files = operations.contains(&OperationTag::Create);
        let modifies_files =
            operations.contains(&OperationTag::Modify) || operations.contains(&OperationTag::Write);

        Impact {
            operations,
            destructive,
            creates_files,
            modifies_files,
            affected_paths,
        }
    }

    /// Precondition checks for a filesystem operation, invoked before the
    /// filesystem executor performs it. Mirrors `validate_operation`'s
    /// per-kind dispatch: existence, system-directory protection, and
    /// read/write permission on the relevant paths.
    pub fn validate_fs_operation(
        &self,
        kind: FsOperationKind,
        path: &Path,
        other: Option<&Path>,
    ) -> Result<(), String> {
        match kind {
            FsOperationKind::CreateFile | FsOperationKind::WriteFile => {
                check_file_permission(path, true)
            }
            FsOperationKind::ReadFile => check_file_permission(path, false),
            FsOperationKind::DeleteFile => {
                if is_under_system_dir(path) {
                    return Err(format!(
                        "Deleting system files is not allowed: {}",
                        path.display()
                    ));
                }
                check_file_permission(path, true)
            }
            FsOperationKind::CreateDirectory => {
                if path.exists() {
                    return Err(format!("Path already exists: {}", path.display()));
                }
                check_file_permission(path.parent().unwrap_or(Path::new(".")), true)
            }
            FsOperationKind::DeleteDirectory => {
                if is_under_system_dir(path) {
                    return Err(format!(
                        "Deleting system directories is not allowed: {}",
                        path.display()
                    ));
                }
                check_file_permission(path, true)
            }
            FsOperationKind::CopyFile => {
                if !path.exists() {
                    return Err(format!("Source file does not exist: {}", path.display()));
                }
                let dst = other.ok_or_else(|| "destination path required".to_string())?;
                check_file_permission(dst.parent().unwrap_or(Path::new(".")), true)
            }
            FsOperationKind::MoveFile => {
                if !path.exists() {
                    return Err(format!("Source file does not exist: {}", path.display()));
                }
                check_file_permission(path, true)?;
                let dst = other.ok_or_else(|| "destination path required".to_string())?;
                check_file_permission(dst.parent().unwrap_or(Path::new(".")), true)
            }
        }
    }
}

fn is_under_system_dir(path: &Path) -> bool {
    let s = path.to_string_lossy();
    SYSTEM_DIRS.iter().any(|dir| s.starts_with(dir))
}

fn check_file_permission(path: &Path, require_write: bool) -> Result<(), String> {
    if !path.exists() {
        if require_write {
            let parent = path.parent().unwrap_or(Path::new("."));
            if !parent.exists() {
                return Err(format!("Parent directory {} does not exist", parent.display()));
            }
        }
        return Ok(());
    }

    let metadata = path
        .metadata()
        .map_err(|e| format!("permission check failed: {e}"))?;

    if require_write && metadata.permissions().readonly() {
        return Err(format!("No write permission for {}", path.display()));
    }

    Ok(())
}

/// Risk-scoring heuristics applied to a non-refused command (spec §4.1).
fn score_risk(command: &str, impact: &Impact) -> (RiskLevel, String) {
    let dominant = most_dangerous(&impact.operations);

    match dominant {
        OperationTag::Read | OperationTag::Unknown => (
            RiskLevel::Safe,
            "read-only introspection command".to_string(),
        ),
        OperationTag::Create | OperationTag::Copy => (
            RiskLevel::Low,
            "creates new files or directories in user paths".to_string(),
        ),
        OperationTag::Modify | OperationTag::Move => (
            RiskLevel::Medium,
            "modifies existing user files".to_string(),
        ),
        OperationTag::Network | OperationTag::Privilege | OperationTag::Execute => {
            if command.contains("install") || command.contains("apt") || command.contains("yum") {
                (
                    RiskLevel::High,
                    "installs packages or modifies system configuration".to_string(),
                )
            } else {
                (RiskLevel::Medium, "runs an external or networked command".to_string())
            }
        }
        OperationTag::Delete => {
            if impact.affected_paths.len() > 1 || command.contains('*') {
                (
                    RiskLevel::Critical,
                    "mass deletion across multiple paths".to_string(),
                )
            } else {
                (RiskLevel::High, "deletes an existing file".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cwd() -> PathBuf {
        PathBuf::from("/home/user")
    }

    #[test]
    fn classify_is_deterministic() {
        let classifier = SafetyClassifier::new(false);
        let a = classifier.classify("ls -la /tmp", &cwd());
        let b = classifier.classify("ls -la /tmp", &cwd());
        assert_eq!(a.risk, b.risk);
        assert_eq!(a.refusal, b.refusal);
    }

    #[test]
    fn safe_read_command() {
        let classifier = SafetyClassifier::new(false);
        let result = classifier.classify("ls -la /tmp", &cwd());
        assert_eq!(result.risk, RiskLevel::Safe);
        assert!(!result.is_refused());
    }

    #[test]
    fn critical_refusal() {
        let classifier = SafetyClassifier::new(false);
        let result = classifier.classify("rm -rf /", &cwd());
        assert!(result.is_refused());
        assert_eq!(
            result.reason,
            "Removing critical system directories is not allowed"
        );
    }

    #[test]
    fn empty_command_refused() {
        let classifier = SafetyClassifier::new(false);
        let result = classifier.classify("", &cwd());
        assert_eq!(result.refusal.as_deref(), Some("empty command"));
    }

    #[test]
    fn unprivileged_sudo_refused() {
        let classifier = SafetyClassifier::new(false);
        let result = classifier.classify("sudo apt update", &cwd());
        assert!(result.is_refused());
    }

    #[test]
    fn privileged_process_allows_sudo_classification() {
        let classifier = SafetyClassifier::new(true);
        let result = classifier.classify("sudo apt update", &cwd());
        assert!(!result.is_refused());
    }

    #[test]
    fn unbalanced_quotes_escalate_to_at_least_medium() {
        let classifier = SafetyClassifier::new(false);
        let result = classifier.classify(r#"echo "unterminated"#, &cwd());
        assert!(result.structural_issue);
        assert!(result.risk >= RiskLevel::Medium);
    }

    #[test]
    fn delete_single_file_is_high() {
        let classifier = SafetyClassifier::new(false);
        let result = classifier.classify("rm report.txt", &cwd());
        assert_eq!(result.risk, RiskLevel::High);
    }
}
