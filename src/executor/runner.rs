//! Streaming command executor: spawns a child process, consumes its
//! stdout/stderr concurrently, enforces a timeout with a grace-period
//! kill, and honors external cancellation (spec §4.3).

use super::error_analysis::{analyze_error, ErrorAnalysis};
use super::interactive::is_interactive_command;
use crate::error::{AngelaError, Result};
use crate::safety::SafetyClassifier;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time;

/// A callback invoked with each decoded chunk of stdout/stderr, for live
/// display while the command is still running.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything the executor needs for one invocation (spec §4.3 contract).
#[derive(Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub check_safety: bool,
    pub on_stdout: Option<ChunkCallback>,
    pub on_stderr: Option<ChunkCallback>,
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Structured result of a completed (or aborted) execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub timed_out: bool,
    pub error_analysis: Option<ErrorAnalysis>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of `CommandExecutor::execute`: either the command actually ran,
/// or it was recognized as terminal-interactive and handed back for the
/// user to run directly.
pub enum ExecOutcome {
    Completed(ExecutionResult),
    RecommendManualRun { command: String, reason: String },
}

pub struct CommandExecutor {
    classifier: Arc<SafetyClassifier>,
    grace: Duration,
}

impl CommandExecutor {
    pub fn new(classifier: Arc<SafetyClassifier>, grace: Duration) -> Self {
        Self { classifier, grace }
    }

    pub async fn execute(&self, command: &str, opts: ExecOptions) -> Result<ExecOutcome> {
        if is_interactive_command(command) {
            return Ok(ExecOutcome::RecommendManualRun {
                command: command.to_string(),
                reason: "this command takes over the controlling terminal; run it directly"
                    .to_string(),
            });
        }

        let cwd = opts
            .cwd
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        if opts.check_safety {
            let classification = self.classifier.classify(command, &cwd);
            if let Some(reason) = classification.refusal {
                return Err(AngelaError::Refusal(reason));
            }
        }

        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AngelaError::ExecutionFailure {
                message: format!("failed to spawn: {e}"),
                exit_code: None,
            })?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let stdout_task = tokio::spawn(read_stream(stdout, opts.on_stdout.clone()));
        let stderr_task = tokio::spawn(read_stream(stderr, opts.on_stderr.clone()));

        let start = Instant::now();
        let mut timed_out = false;
        let mut cancelled = false;

        let wait = wait_with_cancel(&mut child, opts.cancel.clone());
        let status = match opts.timeout {
            Some(limit) => match time::timeout(limit, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    timed_out = true;
                    terminate_with_grace(&mut child, self.grace).await;
                    None
                }
            },
            None => wait.await,
        };

        let exit_code = match status {
            Some(WaitOutcome::Exited(status)) => status.code().unwrap_or(-1),
            Some(WaitOutcome::Cancelled) => {
                cancelled = true;
                terminate_with_grace(&mut child, self.grace).await;
                -1
            }
            None => -1,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration = start.elapsed();

        // Cancellation surfaces as a structured result carrying whatever
        // partial output was captured before the kill, not a control-flow
        // error (spec §8 "exit code -1, partial stdout/stderr retained").
        let error_analysis = if exit_code != 0 && !cancelled {
            let classification = self.classifier.classify(command, &cwd);
            Some(analyze_error(command, &stderr, &classification.impact.affected_paths))
        } else {
            None
        };

        Ok(ExecOutcome::Completed(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            duration,
            timed_out,
            error_analysis,
        }))
    }
}

enum WaitOutcome {
    Exited(std::process::ExitStatus),
    Cancelled,
}

async fn wait_with_cancel(
    child: &mut tokio::process::Child,
    cancel: Option<watch::Receiver<bool>>,
) -> Option<WaitOutcome> {
    match cancel {
        Some(mut rx) => {
            tokio::select! {
                status = child.wait() => status.ok().map(WaitOutcome::Exited),
                _ = wait_for_cancel(&mut rx) => Some(WaitOutcome::Cancelled),
            }
        }
        None => child.wait().await.ok().map(WaitOutcome::Exited),
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(unix)]
async fn terminate_with_grace(child: &mut tokio::process::Child, grace: Duration) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn terminate_with_grace(child: &mut tokio::process::Child, grace: Duration) {
    let _ = time::timeout(grace, child.wait()).await;
    let _ = child.kill().await;
}

async fn read_stream<R: AsyncRead + Unpin>(reader: R, callback: Option<ChunkCallback>) -> String {
    let mut lines = BufReader::new(reader);
    let mut buffer = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        match lines.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Some(cb) = &callback {
                    cb(&line);
                }
                buffer.push_str(&line);
            }
            Err(_) => break,
        }
    }

    buffer
}
