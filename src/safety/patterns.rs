//! Closed tables of refusal and privilege-detection patterns.
//!
//! Pattern bodies are carried over from the reference policy rather than
//! re-derived; only the representation (compiled `Regex`, `once_cell`
//! static) is idiomatic Rust.

use once_cell::sync::Lazy;
use regex::Regex;

/// One dangerous-command rule: a compiled pattern plus the refusal
/// message shown to the user when it matches.
pub struct DangerousPattern {
    pub regex: Regex,
    pub message: &'static str,
}

/// The ten required refusal patterns (§4.1), in the order they're
/// checked. First match wins.
pub static DANGEROUS_PATTERNS: Lazy<Vec<DangerousPattern>> = Lazy::new(|| {
    let raw: &[(&str, &str)] = &[
        (
            r"rm\s+(-r|-f|--recursive|--force)\s+(/|/boot|/etc|/bin|/sbin|/lib|/usr|/var|~)",
            "Removing critical system directories is not allowed",
        ),
        (
            r"(mkfs|fdisk|dd|shred)\s+.*(/dev/sd[a-z]|/dev/nvme[0-9])",
            "Disk formatting operations are not allowed",
        ),
        (
            r"(shutdown|reboot|halt|poweroff|init\s+0|init\s+6)",
            "System power commands are not allowed",
        ),
        (
            r"chmod\s+(-R|--recursive)\s+777",
            "Setting recursive 777 permissions is not allowed",
        ),
        (
            r"(ifconfig|ip)\s+.*down",
            "Network interface disabling is not allowed",
        ),
        (
            r">\s*(/etc/passwd|/etc/shadow|/etc/sudoers)",
            "Writing directly to critical system files is not allowed",
        ),
        (r";\s*rm\s+", "Hidden deletion commands are not allowed"),
        (
            r"(curl|wget).*\|\s*(bash|sh)",
            "Downloading and executing scripts is not allowed",
        ),
        (
            r"(dd|fallocate)\s+.*if=/dev/zero",
            "Creating large files that may fill disk space is not allowed",
        ),
        (
            r"for\s+.*\s+in\s+.*;.*rm\s+",
            "Shell loops with file deletion are not allowed",
        ),
    ];

    raw.iter()
        .map(|(pattern, message)| DangerousPattern {
            regex: Regex::new(pattern).expect("dangerous pattern must compile"),
            message,
        })
        .collect()
});

/// Patterns flagging commands that require elevated privilege, either
/// through an explicit privilege-escalation prefix or by mutating a
/// system directory.
pub static ROOT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let raw = [
        r"^sudo\s+",
        r"^pkexec\s+",
        r"^su\s+(-|--|-c|\w+)\s+",
        r"(chmod|chown|chgrp)\s+.*(/usr/|/etc/|/bin/|/sbin/|/lib/|/var/)",
        r"(touch|rm|mv|cp)\s+.*(/usr/|/etc/|/bin/|/sbin/|/lib/|/var/)",
        r">\s*(/usr/|/etc/|/bin/|/sbin/|/lib/|/var/)",
    ];

    raw.iter()
        .map(|p| Regex::new(p).expect("root pattern must compile"))
        .collect()
});

/// System directories in which deletion is never permitted even when it
/// wouldn't otherwise match a dangerous pattern (e.g. via a filesystem
/// operation rather than a `rm` shell command).
pub const SYSTEM_DIRS: &[&str] = &["/bin", "/sbin", "/lib", "/usr", "/etc", "/var"];

/// Returns the first matching refusal message, if any.
pub fn first_refusal(command: &str) -> Option<&'static str> {
    DANGEROUS_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(command))
        .map(|p| p.message)
}

/// Whether `command` requires elevated privilege per `ROOT_PATTERNS`.
pub fn requires_privilege(command: &str) -> bool {
    ROOT_PATTERNS.iter().any(|re| re.is_match(command))
}
