//! Closed table of commands known to take over the controlling terminal.
//! The command executor never spawns these; it hands back a
//! recommendation for the caller to run directly (spec §4.3).

/// Command names that always require the controlling terminal.
pub const INTERACTIVE_COMMANDS: &[&str] = &[
    "vim", "vi", "nvim", "emacs", "nano", "pico",
    "less", "more", "man",
    "top", "htop", "btop", "iotop", "iftop", "nmon", "glances", "atop",
    "traceroute", "mtr", "tcpdump", "wireshark", "tshark", "ngrep", "dmesg",
    "ssh", "telnet", "ftp", "sftp", "nc", "netcat",
    "mysql", "psql", "sqlite3", "redis-cli", "mongo",
    "python", "python3", "irb", "node", "ipython",
    "gdb", "lldb", "pdb",
    "screen", "tmux",
    "watch",
    "journalctl",
];

/// Returns true if `command` is known to take over the terminal, including
/// contextual variants (`ping` without `-c`, `tail -f`, `journalctl -f`,
/// bare `watch ...`) that aren't interactive by name alone.
pub fn is_interactive_command(command: &str) -> bool {
    let trimmed = command.trim();
    let Some(first) = trimmed.split_whitespace().next() else {
        return false;
    };
    let program = first.rsplit('/').next().unwrap_or(first);

    if INTERACTIVE_COMMANDS.contains(&program) {
        return true;
    }

    match program {
        "ping" => !trimmed.contains("-c"),
        "tail" => trimmed.contains("-f") || trimmed.contains("--follow"),
        "journalctl" => trimmed.contains("-f") || trimmed.contains("--follow"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_interactive_commands_detected() {
        assert!(is_interactive_command("vim file.txt"));
        assert!(is_interactive_command("less /var/log/syslog"));
        assert!(is_interactive_command("top"));
        assert!(is_interactive_command("ssh user@host"));
    }

    #[test]
    fn tail_follow_is_interactive_tail_without_follow_is_not() {
        assert!(is_interactive_command("tail -f /var/log/syslog"));
        assert!(!is_interactive_command("tail -n 20 /var/log/syslog"));
    }

    #[test]
    fn journalctl_follow_is_interactive() {
        assert!(is_interactive_command("journalctl -f -u nginx"));
        assert!(!is_interactive_command("journalctl -u nginx"));
    }

    #[test]
    fn ping_without_count_is_interactive() {
        assert!(is_interactive_command("ping example.com"));
        assert!(!is_interactive_command("ping -c 4 example.com"));
    }

    #[test]
    fn plain_read_commands_are_not_interactive() {
        assert!(!is_interactive_command("ls -la"));
        assert!(!is_interactive_command("cat file.txt"));
    }

    #[test]
    fn bare_watch_is_interactive() {
        assert!(is_interactive_command("watch df -h"));
    }
}
