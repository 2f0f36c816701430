//! Plan orchestrator: runs a `Plan` (or `AdvancedPlan`) layer by layer,
//! skipping steps whose condition expression evaluates false, executing
//! risk ≤ MEDIUM pre-approved steps within a layer concurrently and
//! confirming everything else sequentially, rolling the whole transaction
//! back on a non-optional failure (spec §4.5).

use crate::confirmation::{ConfirmPrompt, ConfirmationGate, Decision, InvocationFlags, PromptContext};
use crate::config::Preferences;
use crate::error::{AngelaError, Result};
use crate::executor::{CommandExecutor, ExecOptions, ExecOutcome};
use crate::filesystem::FilesystemExecutor;
use crate::journal::{Inverse, JournalStore, OperationKind, TransactionStatus};
use crate::plan::{AdvancedPlan, AdvancedStep, Condition, Plan, PlanContext, PlanStep, StepStatus, StepType};
use crate::rollback::RollbackManager;
use crate::safety::{RiskLevel, SafetyClassifier};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What happened to one step of a plan run.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Overall result of running a plan.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub transaction_id: u64,
    pub steps: Vec<StepOutcome>,
    pub rolled_back: bool,
}

pub struct PlanOrchestrator {
    classifier: Arc<SafetyClassifier>,
    gate: ConfirmationGate,
    prompt: ConfirmPrompt,
    executor: Arc<CommandExecutor>,
    filesystem: Arc<FilesystemExecutor>,
    journal: Arc<dyn JournalStore>,
    rollback: Arc<RollbackManager>,
}

impl PlanOrchestrator {
    pub fn new(
        classifier: Arc<SafetyClassifier>,
        executor: Arc<CommandExecutor>,
        filesystem: Arc<FilesystemExecutor>,
        journal: Arc<dyn JournalStore>,
        rollback: Arc<RollbackManager>,
    ) -> Self {
        Self {
            classifier,
            gate: ConfirmationGate::new(),
            prompt: ConfirmPrompt::new(),
            executor,
            filesystem,
            journal,
            rollback,
        }
    }

    /// Run every step of `plan`, opening exactly one transaction for the
    /// whole run (SPEC_FULL.md §13.2). A non-optional step that is denied,
    /// refused, or fails its execution halts the plan and rolls the
    /// transaction back; an optional step's failure is recorded and the
    /// plan continues.
    ///
    /// Every step runs with an implicit `Condition::Always` gate — use
    /// `run_advanced_plan` for plans whose steps carry their own condition
    /// expressions.
    pub async fn run_plan(
        &self,
        plan: &Plan,
        cwd: &PathBuf,
        prefs: &Preferences,
        flags: InvocationFlags,
        cancel: watch::Receiver<bool>,
    ) -> Result<PlanOutcome> {
        let advanced: AdvancedPlan = plan.clone().into();
        self.run_advanced_plan(&advanced, cwd, prefs, flags, cancel).await
    }

    /// Run every step of an advanced plan, evaluating each step's
    /// condition expression against the accumulated plan context before
    /// it becomes eligible to run (spec §4.5 step 1).
    pub async fn run_advanced_plan(
        &self,
        plan: &AdvancedPlan,
        cwd: &PathBuf,
        prefs: &Preferences,
        flags: InvocationFlags,
        cancel: watch::Receiver<bool>,
    ) -> Result<PlanOutcome> {
        let layers = plan
            .layers()
            .map_err(|e| AngelaError::PreconditionFailed(e.to_string()))?;

        let conditions: HashMap<&str, Condition> = plan
            .steps
            .iter()
            .map(|s| {
                let condition = s
                    .condition
                    .as_deref()
                    .map(Condition::parse)
                    .unwrap_or(Condition::Always);
                (s.step.id.as_str(), condition)
            })
            .collect();

        let transaction_id = self.journal.begin(&plan.goal)?;
        let mut context = PlanContext::new();
        let mut outcomes = Vec::new();

        for layer in layers {
            if *cancel.borrow() {
                warn!(transaction_id, "plan cancelled before layer started");
                self.rollback.rollback_transaction(transaction_id)?;
                return Ok(PlanOutcome {
                    transaction_id,
                    steps: outcomes,
                    rolled_back: true,
                });
            }

            let runnable: Vec<&AdvancedStep> = layer
                .into_iter()
                .filter(|step| context.dependencies_satisfied(&step.step.dependencies))
                .collect();

            // Per-step protocol step 1: a false condition skips the step
            // before it is ever classified, confirmed, or journaled.
            let mut eligible = Vec::new();
            for step in runnable {
                let condition = conditions.get(step.step.id.as_str()).unwrap_or(&Condition::Always);
                if !condition.evaluate(&context) {
                    context.set_status(&step.step.id, StepStatus::Skipped);
                    outcomes.push(StepOutcome {
                        step_id: step.step.id.clone(),
                        status: StepStatus::Skipped,
                        exit_code: None,
                        stdout: String::new(),
                        stderr: String::new(),
                    });
                    continue;
                }
                eligible.push(step);
            }

            // Steps at risk ≤ MEDIUM that need no confirmation run
            // concurrently; everything else is serialized within the
            // level to preserve a predictable prompt order (spec §4.5).
            let (concurrent, sequential): (Vec<&AdvancedStep>, Vec<&AdvancedStep>) =
                eligible.into_iter().partition(|step| {
                    step.step.estimated_risk <= RiskLevel::Medium
                        && !step.step.requires_confirmation
                        && self.decide(&step.step, cwd, prefs, flags) == Decision::Allow
                });

            let concurrent_results = join_all(
                concurrent
                    .iter()
                    .map(|step| self.run_step(step, transaction_id, cwd, prefs, flags, cancel.clone())),
            )
            .await;

            for (step, outcome) in concurrent.iter().zip(concurrent_results.into_iter()) {
                let outcome = outcome?;
                context.set_status(&step.step.id, outcome.status);
                let halt = outcome.status == StepStatus::Failed && !step.step.optional;
                outcomes.push(outcome);
                if halt {
                    return self.abort(transaction_id, outcomes).await;
                }
            }

            for step in sequential {
                let outcome = self
                    .run_step(step, transaction_id, cwd, prefs, flags, cancel.clone())
                    .await?;
                context.set_status(&step.step.id, outcome.status);
                let halt = outcome.status == StepStatus::Failed && !step.step.optional;
                outcomes.push(outcome);
                if halt {
                    return self.abort(transaction_id, outcomes).await;
                }
            }
        }

        self.journal
            .close_transaction(transaction_id, TransactionStatus::Committed)?;
        info!(transaction_id, "plan completed");

        Ok(PlanOutcome {
            transaction_id,
            steps: outcomes,
            rolled_back: false,
        })
    }

    async fn abort(&self, transaction_id: u64, outcomes: Vec<StepOutcome>) -> Result<PlanOutcome> {
        warn!(transaction_id, "plan halted on non-optional step failure, rolling back");
        self.rollback.rollback_transaction(transaction_id)?;
        Ok(PlanOutcome {
            transaction_id,
            steps: outcomes,
            rolled_back: true,
        })
    }

    fn decide(
        &self,
        step: &PlanStep,
        cwd: &PathBuf,
        prefs: &Preferences,
        flags: InvocationFlags,
    ) -> Decision {
        let classification = self.classifier.classify(&step.command, cwd);
        self.gate.decide(&classification, &step.command, prefs, flags)
    }

    async fn run_step(
        &self,
        step: &AdvancedStep,
        transaction_id: u64,
        cwd: &PathBuf,
        prefs: &Preferences,
        flags: InvocationFlags,
        cancel: watch::Receiver<bool>,
    ) -> Result<StepOutcome> {
        let inner = &step.step;
        let classification = self.classifier.classify(&inner.command, cwd);
        let decision = self.gate.decide(&classification, &inner.command, prefs, flags);

        let proceed = match decision {
            Decision::Deny => false,
            Decision::PresentOnly => false,
            Decision::Allow => true,
            Decision::Prompt => {
                let ctx = PromptContext {
                    command: &inner.command,
                    risk: classification.risk,
                    reason: &classification.reason,
                    impact_summary: &format!("{:?}", classification.impact.operations),
                    preview: None,
                    explanation: Some(&inner.explanation),
                    confidence: None,
                };
                self.prompt.confirm(&ctx)?
            }
        };

        if !proceed {
            let status = if inner.optional {
                StepStatus::Skipped
            } else {
                StepStatus::Failed
            };
            return Ok(StepOutcome {
                step_id: inner.id.clone(),
                status,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        if step.step_type == StepType::FileOp {
            return self.run_fs_step(inner, transaction_id);
        }

        let operation_id = self.journal.add_operation(
            Some(transaction_id),
            OperationKind::ShellCommand,
            &format!("run `{}`", inner.command),
            serde_json::json!({"command": inner.command, "step_id": inner.id}),
            Inverse::none(),
        )?;

        let opts = ExecOptions {
            cwd: Some(cwd.clone()),
            check_safety: false,
            cancel: Some(cancel),
            timeout: Some(std::time::Duration::from_secs(prefs.default_timeout_secs)),
            ..Default::default()
        };

        match self.executor.execute(&inner.command, opts).await {
            Ok(ExecOutcome::Completed(result)) => {
                if result.success() {
                    self.journal.commit_operation(operation_id)?;
                    Ok(StepOutcome {
                        step_id: inner.id.clone(),
                        status: StepStatus::Committed,
                        exit_code: Some(result.exit_code),
                        stdout: result.stdout,
                        stderr: result.stderr,
                    })
                } else {
                    self.journal
                        .fail_operation(operation_id, "non-zero exit status")?;
                    Ok(StepOutcome {
                        step_id: inner.id.clone(),
                        status: StepStatus::Failed,
                        exit_code: Some(result.exit_code),
                        stdout: result.stdout,
                        stderr: result.stderr,
                    })
                }
            }
            Ok(ExecOutcome::RecommendManualRun { reason, .. }) => {
                self.journal.fail_operation(operation_id, &reason)?;
                Ok(StepOutcome {
                    step_id: inner.id.clone(),
                    status: StepStatus::Failed,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: reason,
                })
            }
            Err(e) => {
                self.journal.fail_operation(operation_id, &e.to_string())?;
                Ok(StepOutcome {
                    step_id: inner.id.clone(),
                    status: StepStatus::Failed,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }

    /// Execute a `file_op` step: its `command` field carries the
    /// operation as JSON (spec §4.5 step 4, "§4.4 according to step
    /// type"). `FilesystemExecutor::perform` backs up, performs, and
    /// journals the operation itself, so this only needs to translate its
    /// result into a `StepOutcome`.
    fn run_fs_step(&self, step: &PlanStep, transaction_id: u64) -> Result<StepOutcome> {
        let op: crate::filesystem::FsOperation = match serde_json::from_str(&step.command) {
            Ok(op) => op,
            Err(e) => {
                return Ok(StepOutcome {
                    step_id: step.id.clone(),
                    status: StepStatus::Failed,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("invalid file_op step command: {e}"),
                });
            }
        };

        match self.filesystem.perform(op, Some(transaction_id)) {
            Ok(_operation_id) => Ok(StepOutcome {
                step_id: step.id.clone(),
                status: StepStatus::Committed,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
            }),
            Err(e) => Ok(StepOutcome {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::BackupManager;
    use crate::journal::store::JsonlJournalStore;
    use crate::plan::PlanStep;
    use crate::safety::RiskLevel;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn step(id: &str, command: &str, deps: &[&str], optional: bool) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            command: command.to_string(),
            explanation: String::new(),
            estimated_risk: RiskLevel::Safe,
            dependencies: deps.iter().map(|d| d.to_string()).collect::<HashSet<_>>(),
            optional,
            requires_confirmation: false,
        }
    }

    fn orchestrator(journal_dir: &std::path::Path, backup_dir: &std::path::Path) -> PlanOrchestrator {
        let journal: Arc<dyn JournalStore> =
            Arc::new(JsonlJournalStore::open(journal_dir).unwrap());
        let classifier = Arc::new(SafetyClassifier::new(false));
        let executor = Arc::new(CommandExecutor::new(
            classifier.clone(),
            std::time::Duration::from_millis(500),
        ));
        let filesystem = Arc::new(crate::filesystem::FilesystemExecutor::new(
            classifier.clone(),
            BackupManager::new(backup_dir),
            journal.clone(),
        ));
        let rollback = Arc::new(RollbackManager::new(
            journal.clone(),
            BackupManager::new(backup_dir),
        ));
        PlanOrchestrator::new(classifier, executor, filesystem, journal, rollback)
    }

    #[tokio::test]
    async fn all_safe_steps_commit_and_close_transaction() {
        let journal_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();
        let orch = orchestrator(journal_dir.path(), backup_dir.path());

        let plan = Plan {
            goal: "say hello".to_string(),
            steps: vec![step("s1", "echo one", &[], false), step("s2", "echo two", &["s1"], false)],
        };

        let (_tx, rx) = watch::channel(false);
        let cwd = std::env::current_dir().unwrap();
        let outcome = orch
            .run_plan(&plan, &cwd, &Preferences::default(), InvocationFlags::default(), rx)
            .await
            .unwrap();

        assert!(!outcome.rolled_back);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps.iter().all(|s| s.status == StepStatus::Committed));
    }

    #[tokio::test]
    async fn non_optional_failure_rolls_back_transaction() {
        let journal_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();
        let orch = orchestrator(journal_dir.path(), backup_dir.path());

        let plan = Plan {
            goal: "fails".to_string(),
            steps: vec![step("s1", "false", &[], false)],
        };

        let (_tx, rx) = watch::channel(false);
        let cwd = std::env::current_dir().unwrap();
        let outcome = orch
            .run_plan(&plan, &cwd, &Preferences::default(), InvocationFlags::default(), rx)
            .await
            .unwrap();

        assert!(outcome.rolled_back);
    }

    #[tokio::test]
    async fn optional_step_failure_does_not_halt_plan() {
        let journal_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();
        let orch = orchestrator(journal_dir.path(), backup_dir.path());

        let plan = Plan {
            goal: "optional failure".to_string(),
            steps: vec![
                step("s1", "false", &[], true),
                step("s2", "echo two", &["s1"], false),
            ],
        };

        let (_tx, rx) = watch::channel(false);
        let cwd = std::env::current_dir().unwrap();
        let outcome = orch
            .run_plan(&plan, &cwd, &Preferences::default(), InvocationFlags::default(), rx)
            .await
            .unwrap();

        assert!(!outcome.rolled_back);
        assert_eq!(outcome.steps.len(), 2);
    }

    #[tokio::test]
    async fn false_condition_skips_step_without_running_it() {
        use crate::plan::{AdvancedStep, StepType};

        let journal_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();
        let orch = orchestrator(journal_dir.path(), backup_dir.path());

        let plan = AdvancedPlan {
            goal: "conditional".to_string(),
            steps: vec![
                AdvancedStep {
                    step: step("s1", "echo ok", &[], false),
                    step_type: StepType::Command,
                    condition: None,
                },
                AdvancedStep {
                    step: step("s2", "echo should-not-run", &["s1"], false),
                    step_type: StepType::Command,
                    condition: Some("s1.failed".to_string()),
                },
            ],
        };

        let (_tx, rx) = watch::channel(false);
        let cwd = std::env::current_dir().unwrap();
        let outcome = orch
            .run_advanced_plan(&plan, &cwd, &Preferences::default(), InvocationFlags::default(), rx)
            .await
            .unwrap();

        assert!(!outcome.rolled_back);
        let s2 = outcome.steps.iter().find(|s| s.step_id == "s2").unwrap();
        assert_eq!(s2.status, StepStatus::Skipped);
        assert!(s2.stdout.is_empty());
    }

    #[tokio::test]
    async fn file_op_step_creates_file_via_filesystem_executor() {
        use crate::filesystem::FsOperation;
        use crate::plan::{AdvancedStep, StepType};

        let journal_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let orch = orchestrator(journal_dir.path(), backup_dir.path());

        let target = work_dir.path().join("notes.txt");
        let op = FsOperation::CreateFile {
            path: target.clone(),
            content: b"hello".to_vec(),
            overwrite: false,
        };

        let mut file_op_step = step("s1", &serde_json::to_string(&op).unwrap(), &[], false);
        file_op_step.estimated_risk = RiskLevel::Low;
        let plan = AdvancedPlan {
            goal: "write a file".to_string(),
            steps: vec![AdvancedStep {
                step: file_op_step,
                step_type: StepType::FileOp,
                condition: None,
            }],
        };

        let (_tx, rx) = watch::channel(false);
        let outcome = orch
            .run_advanced_plan(
                &plan,
                &work_dir.path().to_path_buf(),
                &Preferences::default(),
                InvocationFlags::default(),
                rx,
            )
            .await
            .unwrap();

        assert!(!outcome.rolled_back);
        assert_eq!(outcome.steps[0].status, StepStatus::Committed);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
    }
}
