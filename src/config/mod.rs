use crate::error::{AngelaError, Result};
use crate::safety::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// Auto-execute policy keyed by risk level. Stored as an explicit struct
/// rather than a `[bool; 5]` array so the TOML on disk stays readable
/// (`auto_execute.medium = false` rather than a positional array).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoExecuteTable {
    pub safe: bool,
    pub low: bool,
    pub medium: bool,
    pub high: bool,
    pub critical: bool,
}

impl AutoExecuteTable {
    pub fn get(&self, level: RiskLevel) -> bool {
        match level {
            RiskLevel::Safe => self.safe,
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

impl Default for AutoExecuteTable {
    fn default() -> Self {
        Self {
            safe: true,
            low: true,
            medium: false,
            high: false,
            critical: false,
        }
    }
}

/// User preference bundle consulted by the confirmation gate. Persisted
/// as `~/.angela/preferences.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub auto_execute: AutoExecuteTable,

    /// Overrides `auto_execute` entirely: every action is prompted.
    #[serde(default = "default_confirm_all")]
    pub confirm_all_actions: bool,

    /// Exact command strings auto-executed regardless of risk (refusal
    /// still applies — trust never overrides a refusal).
    #[serde(default)]
    pub trusted_commands: HashSet<String>,

    /// Exact command strings that always require confirmation, even if
    /// `auto_execute` would otherwise allow them.
    #[serde(default)]
    pub untrusted_commands: HashSet<String>,

    /// Directory the operation journal is stored under.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,

    /// Directory content-addressed pre-operation backups are stored under.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Default command timeout in seconds when a caller doesn't specify one.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Grace period after a terminate signal before a child is force-killed.
    #[serde(default = "default_timeout_grace_ms")]
    pub command_timeout_grace_ms: u64,
}

fn default_confirm_all() -> bool {
    false
}

fn angela_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".angela")
}

fn default_journal_dir() -> String {
    angela_home().join("journal").to_string_lossy().into_owned()
}

fn default_backup_dir() -> String {
    angela_home().join("backups").to_string_lossy().into_owned()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_timeout_grace_ms() -> u64 {
    2_000
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_execute: AutoExecuteTable::default(),
            confirm_all_actions: default_confirm_all(),
            trusted_commands: HashSet::new(),
            untrusted_commands: HashSet::new(),
            journal_dir: default_journal_dir(),
            backup_dir: default_backup_dir(),
            default_timeout_secs: default_timeout_secs(),
            command_timeout_grace_ms: default_timeout_grace_ms(),
        }
    }
}

impl Preferences {
    fn config_path() -> PathBuf {
        angela_home().join("preferences.toml")
    }

    fn config_dir() -> PathBuf {
        angela_home()
    }

    /// Load from `~/.angela/preferences.toml`, falling back to defaults
    /// when the file is absent. A present-but-unparseable file is an error.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let prefs: Preferences =
            toml::from_str(&content).map_err(|e| AngelaError::ConfigError(e.to_string()))?;

        Ok(prefs)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| AngelaError::ConfigError(e.to_string()))?;
        fs::write(Self::config_path(), toml_string)?;

        Ok(())
    }

    pub fn init() -> Result<()> {
        Self::default().save()
    }

    pub fn journal_path(&self) -> PathBuf {
        PathBuf::from(&self.journal_dir)
    }

    pub fn backup_path(&self) -> PathBuf {
        PathBuf::from(&self.backup_dir)
    }

    pub fn is_trusted(&self, command: &str) -> bool {
        self.trusted_commands.contains(command)
    }

    pub fn is_untrusted(&self, command: &str) -> bool {
        self.untrusted_commands.contains(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preferences() {
        let prefs = Preferences::default();
        assert!(prefs.auto_execute.safe);
        assert!(prefs.auto_execute.low);
        assert!(!prefs.auto_execute.medium);
        assert!(!prefs.auto_execute.high);
        assert!(!prefs.auto_execute.critical);
        assert!(!prefs.confirm_all_actions);
        assert!(prefs.trusted_commands.is_empty());
    }

    #[test]
    fn test_auto_execute_get_matches_risk_level() {
        let table = AutoExecuteTable::default();
        assert!(table.get(RiskLevel::Safe));
        assert!(table.get(RiskLevel::Low));
        assert!(!table.get(RiskLevel::Medium));
        assert!(!table.get(RiskLevel::High));
        assert!(!table.get(RiskLevel::Critical));
    }

    #[test]
    fn test_preferences_round_trip() {
        let mut prefs = Preferences::default();
        prefs.confirm_all_actions = true;
        prefs.trusted_commands.insert("ls -la".to_string());

        let toml_string = toml::to_string(&prefs).unwrap();
        let reloaded: Preferences = toml::from_str(&toml_string).unwrap();

        assert!(reloaded.confirm_all_actions);
        assert!(reloaded.trusted_commands.contains("ls -la"));
    }

    #[test]
    fn test_preferences_tolerant_of_missing_fields() {
        let toml_str = r#"
            confirm_all_actions = true
        "#;

        let prefs: Preferences = toml::from_str(toml_str).unwrap();
        assert!(prefs.confirm_all_actions);
        assert!(prefs.auto_execute.safe);
    }
}
