use crate::errors::SpecError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A backup job as submitted by the web client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTaskSpec {
    #[serde(rename = "taskName")]
    pub name: String,
    #[serde(rename = "sourceDir")]
    pub source_directory: String,
    #[serde(rename = "rcloneRemote", default)]
    pub remote_targets: Vec<String>,
    #[serde(rename = "maxBackups", default)]
    pub max_backups: u32,
    #[serde(rename = "isSplit", default)]
    pub split_enabled: bool,
    #[serde(rename = "isEncrypted", default)]
    pub encrypt_enabled: bool,
    #[serde(rename = "encryptionPassword", default)]
    pub encryption_password: String,
    #[serde(rename = "cronSchedule")]
    pub schedule: String,
}

/// Rules that are product decisions rather than fixed invariants.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecPolicy {
    pub allow_empty_remotes: bool,
}

impl BackupTaskSpec {
    /// Checks every field except the schedule, which has its own validator.
    pub fn validate(&self, policy: SpecPolicy) -> Result<(), SpecError> {
        check_task_name(&self.name)?;

        if has_control(&self.source_directory) {
            return Err(SpecError::ControlCharacters("source directory"));
        }
        if !Path::new(&self.source_directory).is_absolute() {
            return Err(SpecError::RelativeSource);
        }

        if self.remote_targets.is_empty() && !policy.allow_empty_remotes {
            return Err(SpecError::NoRemotes);
        }
        for target in &self.remote_targets {
            if target.trim().is_empty() {
                return Err(SpecError::BlankRemote);
            }
            if has_control(target) {
                return Err(SpecError::ControlCharacters("remote target"));
            }
        }

        if self.encrypt_enabled && self.encryption_password.is_empty() {
            return Err(SpecError::MissingPassword);
        }
        if has_control(&self.encryption_password) {
            return Err(SpecError::ControlCharacters("encryption password"));
        }
        Ok(())
    }

    pub fn script_file_name(&self) -> String {
        format!("{}.sh", self.name)
    }

    /// Bash array literal of the remote targets, e.g. `("a:bk" "b:bk" )`.
    pub fn remote_array_literal(&self) -> String {
        let mut out = String::from("(");
        for target in &self.remote_targets {
            out.push('"');
            out.push_str(&escape_double_quoted(target));
            out.push_str("\" ");
        }
        out.push(')');
        out
    }
}

/// Accepts names usable as a single path segment that also stay inert in a
/// shell or crontab line: ASCII letters, digits, `.`, `_` and `-`.
pub fn check_task_name(name: &str) -> Result<(), SpecError> {
    if name.trim().is_empty() {
        return Err(SpecError::EmptyName);
    }
    if has_control(name) {
        return Err(SpecError::ControlCharacters("task name"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if !name.chars().all(allowed) || name.contains("..") || name == "." {
        return Err(SpecError::UnsafeName);
    }
    Ok(())
}

/// Escapes the characters bash still interprets inside double quotes.
pub fn escape_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn has_control(value: &str) -> bool {
    value.chars().any(char::is_control)
}
