//! Plan data model: dependency-ordered steps the orchestrator executes,
//! plus the advanced step/condition shape used by richer plans (spec §3).

use crate::safety::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// One step of a plan: a single command with its declared risk,
/// dependencies, and whether its failure is fatal to the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub command: String,
    pub explanation: String,
    pub estimated_risk: RiskLevel,
    #[serde(default)]
    pub dependencies: HashSet<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// A goal plus its ordered set of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
}

/// What kind of side effect an advanced-plan step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Command,
    FileOp,
    ApiCall,
    CodeGeneration,
    Decision,
}

/// A condition gating whether an advanced-plan step runs, evaluated
/// against the accumulated results of earlier steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    Always,
    StepSucceeded(String),
    StepFailed(String),
    StepSkipped(String),
}

impl Condition {
    /// Parse the small expression language a plan's JSON condition field
    /// carries: `"<step_id>.succeeded"`, `"<step_id>.failed"`, or
    /// `"<step_id>.skipped"`. Anything else is treated as always-true,
    /// matching the confirmation gate's "never block on what it can't
    /// parse" posture.
    pub fn parse(expr: &str) -> Self {
        if let Some(id) = expr.strip_suffix(".succeeded") {
            return Condition::StepSucceeded(id.to_string());
        }
        if let Some(id) = expr.strip_suffix(".failed") {
            return Condition::StepFailed(id.to_string());
        }
        if let Some(id) = expr.strip_suffix(".skipped") {
            return Condition::StepSkipped(id.to_string());
        }
        Condition::Always
    }

    pub fn evaluate(&self, context: &PlanContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::StepSucceeded(id) => {
                matches!(context.status(id), Some(StepStatus::Committed))
            }
            Condition::StepFailed(id) => matches!(context.status(id), Some(StepStatus::Failed)),
            Condition::StepSkipped(id) => matches!(context.status(id), Some(StepStatus::Skipped)),
        }
    }
}

/// One step of an advanced plan: a base step plus its type and an
/// optional gating condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedStep {
    #[serde(flatten)]
    pub step: PlanStep,
    pub step_type: StepType,
    pub condition: Option<String>,
}

/// A plan whose steps carry a type tag and optional condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedPlan {
    pub goal: String,
    pub steps: Vec<AdvancedStep>,
}

impl From<Plan> for AdvancedPlan {
    fn from(plan: Plan) -> Self {
        AdvancedPlan {
            goal: plan.goal,
            steps: plan
                .steps
                .into_iter()
                .map(|step| AdvancedStep {
                    step,
                    step_type: StepType::Command,
                    condition: None,
                })
                .collect(),
        }
    }
}

/// Lifecycle status of a plan step, tracked by the orchestrator and
/// consulted by invariant I5 (a step never runs until every dependency is
/// `Committed` or `Skipped`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Committed,
    Skipped,
    Failed,
}

/// Per-step results accumulated as a plan runs: status, captured stdout,
/// and any paths the step produced. Advanced-plan conditions evaluate
/// against this.
#[derive(Debug, Default)]
pub struct PlanContext {
    status: HashMap<String, StepStatus>,
    stdout: HashMap<String, String>,
    produced_paths: HashMap<String, Vec<PathBuf>>,
}

impl PlanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&mut self, step_id: &str, status: StepStatus) {
        self.status.insert(step_id.to_string(), status);
    }

    pub fn status(&self, step_id: &str) -> Option<StepStatus> {
        self.status.get(step_id).copied()
    }

    pub fn record_stdout(&mut self, step_id: &str, stdout: String) {
        self.stdout.insert(step_id.to_string(), stdout);
    }

    pub fn record_produced_paths(&mut self, step_id: &str, paths: Vec<PathBuf>) {
        self.produced_paths.insert(step_id.to_string(), paths);
    }

    /// A step's dependencies are satisfied once every one of them is
    /// `Committed` or `Skipped` (spec invariant I5).
    pub fn dependencies_satisfied(&self, dependencies: &HashSet<String>) -> bool {
        dependencies.iter().all(|dep| {
            matches!(
                self.status.get(dep),
                Some(StepStatus::Committed) | Some(StepStatus::Skipped)
            )
        })
    }
}

/// Error raised when a plan's dependency graph cannot be laid out into
/// levels (i.e. it contains a cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicDependencyError {
    pub remaining_step_ids: Vec<String>,
}

impl std::fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cyclic or unresolved dependency among steps: {}",
            self.remaining_step_ids.join(", ")
        )
    }
}

impl std::error::Error for CyclicDependencyError {}

impl Plan {
    /// Compute the dependency-level layering: level N contains every step
    /// whose dependencies are all in levels `< N`. Steps within a level
    /// have no ordering constraint between them (spec §4.5).
    pub fn layers(&self) -> Result<Vec<Vec<&PlanStep>>, CyclicDependencyError> {
        layer_steps(self.steps.iter().map(|s| (s.id.as_str(), &s.dependencies)).collect(), &self.steps)
    }
}

impl AdvancedPlan {
    pub fn layers(&self) -> Result<Vec<Vec<&AdvancedStep>>, CyclicDependencyError> {
        let keyed: Vec<(&str, &HashSet<String>)> = self
            .steps
            .iter()
            .map(|s| (s.step.id.as_str(), &s.step.dependencies))
            .collect();
        let by_id: HashMap<&str, &AdvancedStep> =
            self.steps.iter().map(|s| (s.step.id.as_str(), s)).collect();

        let id_layers = layer_ids(keyed)?;
        Ok(id_layers
            .into_iter()
            .map(|level| level.into_iter().map(|id| by_id[id]).collect())
            .collect())
    }
}

fn layer_steps<'a>(
    keyed: Vec<(&'a str, &'a HashSet<String>)>,
    steps: &'a [PlanStep],
) -> Result<Vec<Vec<&'a PlanStep>>, CyclicDependencyError> {
    let by_id: HashMap<&str, &PlanStep> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let id_layers = layer_ids(keyed)?;
    Ok(id_layers
        .into_iter()
        .map(|level| level.into_iter().map(|id| by_id[id]).collect())
        .collect())
}

/// Kahn's-algorithm layering over (id, dependencies) pairs.
fn layer_ids<'a>(
    keyed: Vec<(&'a str, &'a HashSet<String>)>,
) -> Result<Vec<Vec<&'a str>>, CyclicDependencyError> {
    let mut remaining: HashMap<&str, &HashSet<String>> = keyed.into_iter().collect();
    let mut layers = Vec::new();
    let mut resolved: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| resolved.contains(d)))
            .map(|(id, _)| *id)
            .collect();

        if ready.is_empty() {
            return Err(CyclicDependencyError {
                remaining_step_ids: remaining.keys().map(|s| s.to_string()).collect(),
            });
        }

        for id in &ready {
            remaining.remove(id);
            resolved.insert(id.to_string());
        }
        layers.push(ready);
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            command: format!("echo {id}"),
            explanation: String::new(),
            estimated_risk: RiskLevel::Safe,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            optional: false,
            requires_confirmation: false,
        }
    }

    #[test]
    fn independent_steps_are_one_layer() {
        let plan = Plan {
            goal: "test".to_string(),
            steps: vec![step("a", &[]), step("b", &[]), step("c", &[])],
        };
        let layers = plan.layers().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 3);
    }

    #[test]
    fn chained_dependencies_produce_sequential_layers() {
        let plan = Plan {
            goal: "test".to_string(),
            steps: vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])],
        };
        let layers = plan.layers().unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0][0].id, "a");
        assert_eq!(layers[1][0].id, "b");
        assert_eq!(layers[2][0].id, "c");
    }

    #[test]
    fn cyclic_dependency_is_rejected() {
        let plan = Plan {
            goal: "test".to_string(),
            steps: vec![step("a", &["b"]), step("b", &["a"])],
        };
        assert!(plan.layers().is_err());
    }

    #[test]
    fn condition_parses_and_evaluates_step_outcomes() {
        let mut ctx = PlanContext::new();
        ctx.set_status("s1", StepStatus::Committed);
        ctx.set_status("s2", StepStatus::Failed);

        assert!(Condition::parse("s1.succeeded").evaluate(&ctx));
        assert!(Condition::parse("s2.failed").evaluate(&ctx));
        assert!(!Condition::parse("s1.failed").evaluate(&ctx));
    }

    #[test]
    fn dependencies_satisfied_accepts_committed_or_skipped() {
        let mut ctx = PlanContext::new();
        ctx.set_status("a", StepStatus::Committed);
        ctx.set_status("b", StepStatus::Skipped);
        let deps: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        assert!(ctx.dependencies_satisfied(&deps));

        ctx.set_status("b", StepStatus::Failed);
        assert!(!ctx.dependencies_satisfied(&deps));
    }
}
