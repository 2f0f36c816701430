//! Shell-token-aware impact extraction: which high-level operation a
//! command performs and which paths it is expected to touch.

use std::path::{Path, PathBuf};

/// High-level operation tag attached to a classified command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    Read,
    Create,
    Modify,
    Delete,
    Move,
    Copy,
    Network,
    Privilege,
    Execute,
    Unknown,
}

impl OperationTag {
    pub fn is_destructive(self) -> bool {
        matches!(self, OperationTag::Delete | OperationTag::Modify)
    }
}

/// Split a command into whitespace/quote-aware tokens, the way a shell
/// would before word-splitting redirections. Returns `None` if quoting
/// is unbalanced, so the caller can escalate risk per the classifier's
/// structural-issue contract.
pub fn tokenize(command: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote.is_some() {
        return None;
    }
    if in_token {
        tokens.push(current);
    }

    Some(tokens)
}

/// Classify the leading command word of one pipeline segment.
fn classify_word(word: &str, segment: &str) -> OperationTag {
    match word {
        "rm" | "rmdir" | "unlink" => OperationTag::Delete,
        "mv" | "rename" => OperationTag::Move,
        "cp" => OperationTag::Copy,
        "touch" | "mkdir" => OperationTag::Create,
        "sed" | "awk" if segment.contains("-i") => OperationTag::Modify,
        "cat" | "less" | "more" | "grep" | "find" | "ls" | "head" | "tail" => OperationTag::Read,
        "echo" | "tee" if segment.contains('>') => OperationTag::Modify,
        "curl" | "wget" | "ssh" | "scp" | "rsync" => OperationTag::Network,
        "sudo" | "pkexec" | "su" | "systemctl" | "service" => OperationTag::Privilege,
        "sh" | "bash" | "zsh" | "python" | "python3" | "node" | "ruby" => OperationTag::Execute,
        "xargs" => {
            if segment.contains(" rm ") || segment.trim_end().ends_with(" rm") {
                OperationTag::Delete
            } else if segment.contains(" mv ") {
                OperationTag::Move
            } else {
                OperationTag::Unknown
            }
        }
        _ => OperationTag::Unknown,
    }
}

/// Most dangerous of two operations, used to fold a pipeline of several
/// commands into a single overall tag.
fn rank(op: OperationTag) -> u8 {
    match op {
        OperationTag::Delete => 6,
        OperationTag::Privilege => 5,
        OperationTag::Modify => 4,
        OperationTag::Move => 3,
        OperationTag::Network | OperationTag::Execute | OperationTag::Copy | OperationTag::Create => 2,
        OperationTag::Read => 1,
        OperationTag::Unknown => 0,
    }
}

/// Classify every segment of a (possibly piped) command and return the
/// set of distinct operations observed.
pub fn classify_operations(command: &str) -> Vec<OperationTag> {
    let mut seen = Vec::new();

    for segment in command.split('|') {
        let segment = segment.trim();
        let Some(word) = segment.split_whitespace().next() else {
            continue;
        };
        let op = classify_word(word, segment);
        if !seen.contains(&op) {
            seen.push(op);
        }
    }

    if seen.is_empty() {
        seen.push(OperationTag::Unknown);
    }

    seen
}

pub fn most_dangerous(ops: &[OperationTag]) -> OperationTag {
    ops.iter()
        .copied()
        .max_by_key(|op| rank(*op))
        .unwrap_or(OperationTag::Unknown)
}

/// Best-effort extraction of path-looking arguments, resolved absolute
/// against `cwd`. A token is treated as a path candidate when it isn't a
/// flag and contains a path separator, a leading `~`/`/`, or a dotted
/// extension — mirroring the heuristic a shell-completion engine would use.
pub fn extract_affected_paths(command: &str, cwd: &Path) -> Vec<PathBuf> {
    let Some(tokens) = tokenize(command) else {
        return Vec::new();
    };

    let mut paths = Vec::new();

    for token in tokens {
        if token.starts_with('-') || token == "|" || token == ">" || token == ">>" {
            continue;
        }
        if !looks_like_path(&token) {
            continue;
        }

        let candidate = Path::new(&token);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else if let Some(stripped) = token.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(stripped)
        } else {
            cwd.join(candidate)
        };

        if !paths.contains(&resolved) {
            paths.push(resolved);
        }
    }

    paths
}

fn looks_like_path(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    token.starts_with('/')
        || token.starts_with("~/")
        || token.starts_with("./")
        || token.starts_with("../")
        || token.contains('/')
        || (token.contains('.') && !token.starts_with('.') && token.len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_handles_quotes() {
        let tokens = tokenize(r#"echo "hello world" 'foo bar'"#).unwrap();
        assert_eq!(tokens, vec!["echo", "hello world", "foo bar"]);
    }

    #[test]
    fn tokenize_rejects_unbalanced_quotes() {
        assert!(tokenize(r#"echo "unterminated"#).is_none());
    }

    #[test]
    fn classify_rm_is_delete() {
        let ops = classify_operations("rm -rf /tmp/test");
        assert_eq!(most_dangerous(&ops), OperationTag::Delete);
    }

    #[test]
    fn classify_read_only() {
        let ops = classify_operations("cat file.txt");
        assert_eq!(most_dangerous(&ops), OperationTag::Read);
    }

    #[test]
    fn classify_pipe_picks_most_dangerous() {
        let ops = classify_operations("find . -name '*.tmp' | xargs rm");
        assert_eq!(most_dangerous(&ops), OperationTag::Delete);
    }

    #[test]
    fn extract_paths_resolves_relative_against_cwd() {
        let cwd = Path::new("/home/user/project");
        let paths = extract_affected_paths("rm report.txt", cwd);
        assert_eq!(paths, vec![PathBuf::from("/home/user/project/report.txt")]);
    }

    #[test]
    fn extract_paths_keeps_absolute_as_is() {
        let cwd = Path::new("/home/user");
        let paths = extract_affected_paths("cat /etc/hosts", cwd);
        assert_eq!(paths, vec![PathBuf::from("/etc/hosts")]);
    }
}
