//! Best-effort diagnosis of a failed shell command: regex-matched error
//! patterns plus path-existence checks (spec §4.3 "Error analysis").

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One entry in the error-pattern table: a regex matched against stderr,
/// plus the probable cause and fix suggestions shown when it matches.
struct ErrorPattern {
    regex: Regex,
    probable_cause: &'static str,
    fix_suggestions: &'static [&'static str],
}

static ERROR_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    let raw: &[(&str, &str, &[&str])] = &[
        (
            r"(?i)no such file or directory",
            "a referenced path does not exist",
            &["check the path for typos", "create the missing file or directory first"],
        ),
        (
            r"(?i)permission denied",
            "the current user lacks permission for this operation",
            &["check file ownership and mode with `ls -l`", "rerun with elevated privileges if appropriate"],
        ),
        (
            r"(?i)command not found",
            "the program is not installed or not on PATH",
            &["install the missing package", "check for typos in the command name"],
        ),
        (
            r"(?i)address already in use",
            "another process is already bound to the requested port",
            &["find the owning process with `lsof -i`", "stop the conflicting process or choose a different port"],
        ),
        (
            r"(?i)disk quota exceeded|no space left on device",
            "the target filesystem is out of space",
            &["free up space with `df -h` and cleanup", "choose a different volume"],
        ),
        (
            r"(?i)connection refused",
            "the remote host is not accepting connections on that port",
            &["verify the target service is running", "check firewall rules"],
        ),
        (
            r"(?i)is a directory",
            "an operation expecting a file was given a directory",
            &["pass a file path instead", "add -r/--recursive if a directory was intended"],
        ),
        (
            r"(?i)syntax error",
            "the command or script has a syntax error",
            &["check quoting and brackets", "run the script through a linter"],
        ),
    ];

    raw.iter()
        .map(|(pattern, cause, fixes)| ErrorPattern {
            regex: Regex::new(pattern).expect("error pattern must compile"),
            probable_cause: cause,
            fix_suggestions: fixes,
        })
        .collect()
});

/// Structural diagnosis attached to a non-zero exit (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub summary: String,
    pub probable_cause: Option<String>,
    pub file_issues: Vec<String>,
    pub structural_issues: Vec<String>,
    pub fix_suggestions: Vec<String>,
}

/// Best-effort diagnosis of a failed command; never fails the caller.
pub fn analyze_error(command: &str, stderr: &str, affected_paths: &[std::path::PathBuf]) -> ErrorAnalysis {
    let mut probable_cause = None;
    let mut fix_suggestions = Vec::new();

    for pattern in ERROR_PATTERNS.iter() {
        if pattern.regex.is_match(stderr) {
            probable_cause = Some(pattern.probable_cause.to_string());
            fix_suggestions.extend(pattern.fix_suggestions.iter().map(|s| s.to_string()));
            break;
        }
    }

    let file_issues = affected_paths
        .iter()
        .filter(|p| !path_exists(p))
        .map(|p| format!("{} does not exist", p.display()))
        .collect::<Vec<_>>();

    let structural_issues = structural_issues(command);

    let summary = if let Some(cause) = &probable_cause {
        format!("command failed: {cause}")
    } else if !stderr.trim().is_empty() {
        format!("command failed: {}", first_line(stderr))
    } else {
        "command failed with no diagnostic output".to_string()
    };

    ErrorAnalysis {
        summary,
        probable_cause,
        file_issues,
        structural_issues,
        fix_suggestions,
    }
}

fn structural_issues(command: &str) -> Vec<String> {
    let mut issues = Vec::new();
    let quotes = command.chars().filter(|c| *c == '"' || *c == '\'').count();
    if quotes % 2 != 0 {
        issues.push("unbalanced quotes in command".to_string());
    }
    let (open, close) = (
        command.matches('(').count() + command.matches('{').count(),
        command.matches(')').count() + command.matches('}').count(),
    );
    if open != close {
        issues.push("unbalanced brackets in command".to_string());
    }
    issues
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s).trim()
}

/// Returns true when `path` is reachable, used while building `file_issues`
/// to flag affected paths that no longer (or never did) exist.
fn path_exists(path: &Path) -> bool {
    path.exists()
}
