//! Confirmation gate: turns a classification plus user preferences into
//! an allow/prompt/deny/present-only decision.

pub mod prompt;

use crate::config::Preferences;
use crate::safety::Classification;

pub use prompt::{ConfirmPrompt, PromptContext};

/// Outcome of the gate's decision algorithm (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Execute without interaction.
    Allow,
    /// Show the user what would happen, but never execute or prompt.
    PresentOnly,
    /// Ask the user before executing.
    Prompt,
    /// Never execute; no user override exists.
    Deny,
}

/// Per-invocation flags that can short-circuit the preference-driven
/// decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationFlags {
    pub force: bool,
    pub dry_run: bool,
}

pub struct ConfirmationGate;

impl ConfirmationGate {
    pub fn new() -> Self {
        Self
    }

    /// The seven-step algorithm from spec §4.2, in order. Each step is
    /// checked only if the previous ones didn't already return.
    pub fn decide(
        &self,
        classification: &Classification,
        command: &str,
        prefs: &Preferences,
        flags: InvocationFlags,
    ) -> Decision {
        if classification.is_refused() {
            return Decision::Deny;
        }

        if flags.dry_run {
            return Decision::PresentOnly;
        }

        if flags.force {
            return Decision::Allow;
        }

        if prefs.is_untrusted(command) {
            return Decision::Prompt;
        }

        if prefs.is_trusted(command) {
            return Decision::Allow;
        }

        if prefs.confirm_all_actions {
            return Decision::Prompt;
        }

        if prefs.auto_execute.get(classification.risk) {
            Decision::Allow
        } else {
            Decision::Prompt
        }
    }
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}
