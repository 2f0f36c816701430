//! LLM collaborator data contracts (spec §6 "LLM collaborator interface").
//! No concrete provider lives here; this module defines only the shapes a
//! suggester must produce and the trait the core calls against, mirroring
//! the teacher's `AiProvider` seam without its `gemini`/`claude`/`codex`
//! concrete clients (explicitly out of scope, SPEC_FULL.md §14).

use crate::plan::{Plan, PlanStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single suggested command, with the explanation and confidence that
/// accompany it in the confirmation prompt (confidence is informational
/// only, per SPEC_FULL.md §13.3 — it never gates execution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub command: String,
    pub explanation: String,
    pub confidence: f64,
}

/// A suggester's multi-step proposal for a goal. Spec §6 fixes this wire
/// shape as `{goal, steps: [PlanStep]}` literally — the suggester has
/// already assigned each step its id, classified its `estimated_risk`,
/// and decided `requires_confirmation` before handing the plan across
/// this boundary; the core does not reclassify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPlan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
}

/// Anything capable of turning natural-language intent into a suggestion
/// or a multi-step plan. The core depends only on this trait; no
/// concrete implementation ships in this crate.
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn suggest(&self, request: &str) -> crate::error::Result<Suggestion>;
    async fn plan(&self, goal: &str) -> crate::error::Result<LlmPlan>;
}

/// Lift a suggester's plan into the `Plan` the orchestrator runs. The
/// wire contract already carries fully classified steps, so this is a
/// direct move, not a reclassification.
pub fn into_plan(llm_plan: LlmPlan) -> Plan {
    Plan {
        goal: llm_plan.goal,
        steps: llm_plan.steps,
    }
}
