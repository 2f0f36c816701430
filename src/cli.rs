//! CLI surface (spec §6): `request` runs or previews a single natural
//! language request; `rollback` inspects and reverses journaled history.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "angela")]
#[command(about = "Execution core for an AI-augmented command-line assistant", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug-level tracing output regardless of ANGELA_LOG/RUST_LOG.
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify, confirm, and run a natural-language request's resolved command.
    Request(RequestArgs),

    /// Inspect or reverse journaled operations and transactions.
    Rollback {
        #[command(subcommand)]
        action: RollbackAction,
    },
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// The request text, e.g. `angela request "delete the build directory"`.
    #[arg(required = true)]
    pub text: Vec<String>,

    /// Only resolve and print the command; never execute or prompt.
    #[arg(long)]
    pub suggest_only: bool,

    /// Show what would happen without executing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation and execute immediately (refusals still apply).
    #[arg(long)]
    pub force: bool,
}

impl RequestArgs {
    pub fn text(&self) -> String {
        self.text.join(" ")
    }
}

#[derive(Subcommand, Debug)]
pub enum RollbackAction {
    /// List recent operations (or transactions).
    List {
        /// List transactions instead of individual operations.
        #[arg(long)]
        transactions: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Roll back a single operation by id.
    Operation {
        id: u64,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Roll back every operation in a transaction.
    Transaction {
        id: u64,

        #[arg(long)]
        force: bool,
    },

    /// Roll back the most recently committed operation or transaction.
    Last {
        /// Roll back the last transaction instead of the last operation.
        #[arg(long)]
        transaction: bool,

        #[arg(long)]
        force: bool,
    },
}
