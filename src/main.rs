mod cli;
mod config;
mod confirmation;
mod core;
mod error;
mod executor;
mod filesystem;
mod journal;
mod llm;
mod logging;
mod orchestrator;
mod plan;
mod rollback;
mod safety;

use clap::Parser;
use cli::{Cli, Command, RollbackAction};
use colored::*;
use confirmation::InvocationFlags;
use config::Preferences;
use core::Core;
use error::AngelaError;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();
    let preferences = match Preferences::load() {
        Ok(prefs) => prefs,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let core = match Core::new(preferences) {
        Ok(core) => core,
        Err(e) => {
            eprintln!("{} failed to initialize: {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Request(args) => run_request(&core, args).await,
        Command::Rollback { action } => run_rollback(&core, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// `angela request "<text>" [--suggest-only] [--dry-run] [--force]` (spec §6).
///
/// The enclosing tool is expected to resolve natural-language text into a
/// concrete command via its LLM collaborator before calling into this
/// core (§6 "LLM collaborator interface"); since no concrete `Suggester`
/// ships in this crate (SPEC_FULL.md §14), the request text is taken as
/// the resolved command directly.
async fn run_request(core: &Core, args: cli::RequestArgs) -> error::Result<()> {
    let command = args.text();
    let cwd = std::env::current_dir()?;

    if args.suggest_only {
        println!("{command}");
        return Ok(());
    }

    let flags = InvocationFlags {
        force: args.force,
        dry_run: args.dry_run,
    };

    match core.run_command(&command, &cwd, flags).await {
        Ok(Some(result)) => {
            print!("{}", result.stdout);
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr);
            }
            if let Some(analysis) = &result.error_analysis {
                eprintln!("{} {}", "analysis:".yellow().bold(), analysis.summary);
                for fix in &analysis.fix_suggestions {
                    eprintln!("  - {fix}");
                }
            }
            if !result.success() {
                return Err(AngelaError::ExecutionFailure {
                    message: "command exited non-zero".to_string(),
                    exit_code: Some(result.exit_code),
                });
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    }
}

fn run_rollback(core: &Core, action: RollbackAction) -> error::Result<()> {
    match action {
        RollbackAction::List { transactions, limit } => {
            if transactions {
                for txn in core.journal.recent_transactions(limit)? {
                    println!("{:>6}  {:?}  {}", txn.id, txn.status, txn.description);
                }
            } else {
                for op in core.journal.recent_operations(limit)? {
                    println!(
                        "{:>6}  {:?}  {:?}  {}",
                        op.id, op.status, op.kind, op.description
                    );
                }
            }
            Ok(())
        }
        RollbackAction::Operation { id, force } => {
            if !force && !confirm_rollback(&format!("operation {id}"))? {
                return Err(AngelaError::ConfirmationDenied(format!("rollback of operation {id}")));
            }
            let outcome = core.rollback_operation(id)?;
            println!("rolled back: {}", outcome.detail);
            Ok(())
        }
        RollbackAction::Transaction { id, force } => {
            if !force && !confirm_rollback(&format!("transaction {id}"))? {
                return Err(AngelaError::ConfirmationDenied(format!("rollback of transaction {id}")));
            }
            let outcome = core.rollback_transaction(id)?;
            report_transaction_rollback(&outcome);
            Ok(())
        }
        RollbackAction::Last { transaction, force } => {
            if !force && !confirm_rollback("the most recent record")? {
                return Err(AngelaError::ConfirmationDenied("rollback of last record".to_string()));
            }
            if transaction {
                let outcome = core.rollback_last_transaction()?;
                report_transaction_rollback(&outcome);
            } else {
                let outcome = core.rollback_last_operation()?;
                println!("rolled back: {}", outcome.detail);
            }
            Ok(())
        }
    }
}

fn report_transaction_rollback(outcome: &rollback::TransactionRollbackOutcome) {
    for op in &outcome.operations {
        let marker = if op.rolled_back { "✓".green() } else { "✗".red() };
        println!("  {marker} operation {}: {}", op.operation_id, op.detail);
    }
    if outcome.fully_rolled_back() {
        println!("transaction {} fully rolled back", outcome.transaction_id);
    } else {
        println!(
            "{} transaction {} partially rolled back",
            "warning:".yellow().bold(),
            outcome.transaction_id
        );
    }
}

fn confirm_rollback(what: &str) -> error::Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!("Roll back {what}?"))
        .default(false)
        .interact()
        .map_err(|e| AngelaError::ExecutionFailure {
            message: format!("prompt failed: {e}"),
            exit_code: None,
        })
}
