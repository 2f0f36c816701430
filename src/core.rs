//! Capability composition: wires the safety classifier, journal,
//! filesystem and command executors, confirmation gate, orchestrator, and
//! rollback manager into the single object `main.rs` drives.

use crate::confirmation::{ConfirmPrompt, ConfirmationGate, Decision, InvocationFlags, PromptContext};
use crate::config::Preferences;
use crate::error::{AngelaError, Result};
use crate::executor::{CommandExecutor, ExecOptions, ExecOutcome};
use crate::filesystem::{BackupManager, FilesystemExecutor};
use crate::journal::store::JsonlJournalStore;
use crate::journal::JournalStore;
use crate::orchestrator::{PlanOrchestrator, PlanOutcome};
use crate::plan::{AdvancedPlan, Plan};
use crate::rollback::{RollbackManager, RollbackOutcome, TransactionRollbackOutcome};
use crate::safety::SafetyClassifier;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The composition root: one instance per process, built once from
/// `Preferences` at startup.
pub struct Core {
    pub classifier: Arc<SafetyClassifier>,
    pub journal: Arc<dyn JournalStore>,
    pub filesystem: Arc<FilesystemExecutor>,
    pub executor: Arc<CommandExecutor>,
    pub orchestrator: PlanOrchestrator,
    pub rollback: Arc<RollbackManager>,
    gate: ConfirmationGate,
    prompt: ConfirmPrompt,
    pub preferences: Preferences,
}

impl Core {
    pub fn new(preferences: Preferences) -> Result<Self> {
        let privileged = SafetyClassifier::detect_privileged();
        let classifier = Arc::new(SafetyClassifier::new(privileged));

        let journal: Arc<dyn JournalStore> =
            Arc::new(JsonlJournalStore::open(preferences.journal_path())?);

        let backups = BackupManager::new(preferences.backup_path());
        let filesystem = Arc::new(FilesystemExecutor::new(
            classifier.clone(),
            backups,
            journal.clone(),
        ));

        let grace = Duration::from_millis(preferences.command_timeout_grace_ms);
        let executor = Arc::new(CommandExecutor::new(classifier.clone(), grace));

        let rollback = Arc::new(RollbackManager::new(
            journal.clone(),
            BackupManager::new(preferences.backup_path()),
        ));

        let orchestrator = PlanOrchestrator::new(
            classifier.clone(),
            executor.clone(),
            filesystem.clone(),
            journal.clone(),
            rollback.clone(),
        );

        Ok(Self {
            classifier,
            journal,
            filesystem,
            executor,
            orchestrator,
            rollback,
            gate: ConfirmationGate::new(),
            prompt: ConfirmPrompt::new(),
            preferences,
        })
    }

    /// Classify, gate, and (if approved) run a single ad-hoc command —
    /// the handler behind `angela request`.
    pub async fn run_command(
        &self,
        command: &str,
        cwd: &PathBuf,
        flags: InvocationFlags,
    ) -> Result<Option<crate::executor::ExecutionResult>> {
        let classification = self.classifier.classify(command, cwd);
        let decision = self
            .gate
            .decide(&classification, command, &self.preferences, flags);

        match decision {
            Decision::Deny => Err(AngelaError::Refusal(
                classification
                    .refusal
                    .unwrap_or_else(|| "command denied by policy".to_string()),
            )),
            Decision::PresentOnly => {
                print_preview(command, &classification);
                Ok(None)
            }
            Decision::Allow => self.execute(command, cwd).await,
            Decision::Prompt => {
                let impact_summary = format!("{:?}", classification.impact.operations);
                let ctx = PromptContext {
                    command,
                    risk: classification.risk,
                    reason: &classification.reason,
                    impact_summary: &impact_summary,
                    preview: None,
                    explanation: None,
                    confidence: None,
                };
                if self.prompt.confirm(&ctx)? {
                    self.execute(command, cwd).await
                } else {
                    Err(AngelaError::ConfirmationDenied(command.to_string()))
                }
            }
        }
    }

    async fn execute(
        &self,
        command: &str,
        cwd: &PathBuf,
    ) -> Result<Option<crate::executor::ExecutionResult>> {
        let opts = ExecOptions {
            cwd: Some(cwd.clone()),
            timeout: Some(Duration::from_secs(self.preferences.default_timeout_secs)),
            ..Default::default()
        };

        let operation_id = self.journal.add_operation(
            None,
            crate::journal::OperationKind::ShellCommand,
            &format!("run `{command}`"),
            serde_json::json!({"command": command}),
            crate::journal::Inverse::none(),
        )?;

        match self.executor.execute(command, opts).await {
            Ok(ExecOutcome::Completed(result)) => {
                if result.success() {
                    self.journal.commit_operation(operation_id)?;
                } else {
                    self.journal
                        .fail_operation(operation_id, "non-zero exit status")?;
                }
                Ok(Some(result))
            }
            Ok(ExecOutcome::RecommendManualRun { command, reason }) => {
                self.journal.fail_operation(operation_id, &reason)?;
                Err(AngelaError::ExecutionFailure {
                    message: format!("`{command}` must be run interactively: {reason}"),
                    exit_code: None,
                })
            }
            Err(e) => {
                self.journal.fail_operation(operation_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    pub async fn run_plan(
        &self,
        plan: &Plan,
        cwd: &PathBuf,
        flags: InvocationFlags,
        cancel: watch::Receiver<bool>,
    ) -> Result<PlanOutcome> {
        self.orchestrator
            .run_plan(plan, cwd, &self.preferences, flags, cancel)
            .await
    }

    /// Run a plan whose steps carry their own type tag and condition
    /// expression (spec §3 "Advanced plan").
    pub async fn run_advanced_plan(
        &self,
        plan: &AdvancedPlan,
        cwd: &PathBuf,
        flags: InvocationFlags,
        cancel: watch::Receiver<bool>,
    ) -> Result<PlanOutcome> {
        self.orchestrator
            .run_advanced_plan(plan, cwd, &self.preferences, flags, cancel)
            .await
    }

    pub fn rollback_operation(&self, operation_id: u64) -> Result<RollbackOutcome> {
        self.rollback.rollback_operation(operation_id)
    }

    pub fn rollback_transaction(&self, transaction_id: u64) -> Result<TransactionRollbackOutcome> {
        self.rollback.rollback_transaction(transaction_id)
    }

    pub fn rollback_last_operation(&self) -> Result<RollbackOutcome> {
        self.rollback.rollback_last_operation()
    }

    pub fn rollback_last_transaction(&self) -> Result<TransactionRollbackOutcome> {
        self.rollback.rollback_last_transaction()
    }
}

fn print_preview(command: &str, classification: &crate::safety::Classification) {
    use colored::*;
    eprintln!("{} {}", "[dry-run]".cyan().bold(), command);
    eprintln!("  risk: {} - {}", classification.risk, classification.reason);
}
