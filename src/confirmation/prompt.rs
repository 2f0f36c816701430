use crate::error::{AngelaError, Result};
use crate::safety::RiskLevel;
use colored::*;
use dialoguer::Confirm;

/// Everything the terminal formatter needs to render a confirmation
/// prompt. The gate computes this; it never formats anything itself.
pub struct PromptContext<'a> {
    pub command: &'a str,
    pub risk: RiskLevel,
    pub reason: &'a str,
    pub impact_summary: &'a str,
    pub preview: Option<&'a str>,
    pub explanation: Option<&'a str>,
    pub confidence: Option<f64>,
}

/// Minimal confirmation surface: prints a risk-colored summary to
/// stderr (so stdout stays clean for command substitution) and asks a
/// yes/no question.
pub struct ConfirmPrompt;

impl ConfirmPrompt {
    pub fn new() -> Self {
        Self
    }

    pub fn confirm(&self, ctx: &PromptContext) -> Result<bool> {
        eprintln!("\n{}", "[>] Proposed command:".cyan().bold());

        let colored_command = match ctx.risk {
            RiskLevel::Safe | RiskLevel::Low => ctx.command.green(),
            RiskLevel::Medium => ctx.command.yellow(),
            RiskLevel::High => ctx.command.red(),
            RiskLevel::Critical => ctx.command.red().bold(),
        };
        eprintln!("  {}", colored_command);

        let risk_str = match ctx.risk {
            RiskLevel::Safe => "SAFE".green(),
            RiskLevel::Low => "LOW".green(),
            RiskLevel::Medium => "MEDIUM".yellow(),
            RiskLevel::High => "HIGH".red(),
            RiskLevel::Critical => "CRITICAL".red().bold(),
        };
        eprintln!("{} {} - {}", "Risk level:".bold(), risk_str, ctx.reason);
        eprintln!("{} {}", "Impact:".bold(), ctx.impact_summary);

        if let Some(explanation) = ctx.explanation {
            eprintln!("{} {}", "Explanation:".bold(), explanation);
        }
        if let Some(preview) = ctx.preview {
            eprintln!("{}\n{}", "Preview:".bold(), preview);
        }
        if let Some(confidence) = ctx.confidence {
            eprintln!("{} {:.0}%", "Confidence:".bold(), confidence * 100.0);
        }

        Confirm::new()
            .with_prompt("Execute this command?")
            .default(false)
            .interact()
            .map_err(|e| AngelaError::ExecutionFailure {
                message: format!("prompt failed: {e}"),
                exit_code: None,
            })
    }
}

impl Default for ConfirmPrompt {
    fn default() -> Self {
        Self::new()
    }
}
