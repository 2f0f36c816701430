//! Command execution: streaming subprocess runner, interactive-command
//! detection, and best-effort error analysis (spec §4.3).

pub mod error_analysis;
pub mod interactive;
pub mod runner;

pub use error_analysis::{analyze_error, ErrorAnalysis};
pub use interactive::is_interactive_command;
pub use runner::{ChunkCallback, CommandExecutor, ExecOptions, ExecOutcome, ExecutionResult};
