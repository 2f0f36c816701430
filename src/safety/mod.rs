//! Safety classification: risk scoring, refusal, and impact analysis for
//! a proposed command or filesystem operation.

pub mod classifier;
pub mod impact;
pub mod patterns;

pub use classifier::SafetyClassifier;
pub use impact::OperationTag;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ordered risk classification. Ordering is significant: policy
/// thresholds (`auto_execute`, rollback eligibility checks) compare
/// levels directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Impact analysis attached to every classified command (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impact {
    pub operations: Vec<OperationTag>,
    pub destructive: bool,
    pub creates_files: bool,
    pub modifies_files: bool,
    pub affected_paths: Vec<PathBuf>,
}

impl Impact {
    pub fn empty() -> Self {
        Self {
            operations: vec![OperationTag::Unknown],
            destructive: false,
            creates_files: false,
            modifies_files: false,
            affected_paths: Vec::new(),
        }
    }
}

/// Result of classifying a single command: risk level, the reason for
/// that level, its impact analysis, and an optional refusal message.
/// `refusal.is_some()` means the command must never execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub risk: RiskLevel,
    pub reason: String,
    pub impact: Impact,
    pub refusal: Option<String>,
    /// Set when the command could not be parsed (unbalanced quotes);
    /// risk is escalated by one level, never below `Medium`, per the
    /// classifier's structural-issue contract.
    pub structural_issue: bool,
}

impl Classification {
    pub fn is_refused(&self) -> bool {
        self.refusal.is_some()
    }
}

/// High-level filesystem operation kind, used both by the safety
/// classifier's precondition checks and as the journal's `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsOperationKind {
    CreateFile,
    WriteFile,
    ReadFile,
    DeleteFile,
    CreateDirectory,
    DeleteDirectory,
    CopyFile,
    MoveFile,
}

impl std::fmt::Display for FsOperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FsOperationKind::CreateFile => "create_file",
            FsOperationKind::WriteFile => "write_file",
            FsOperationKind::ReadFile => "read_file",
            FsOperationKind::DeleteFile => "delete_file",
            FsOperationKind::CreateDirectory => "create_directory",
            FsOperationKind::DeleteDirectory => "delete_directory",
            FsOperationKind::CopyFile => "copy_file",
            FsOperationKind::MoveFile => "move_file",
        };
        write!(f, "{s}")
    }
}
