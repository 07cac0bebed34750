use crate::task::SpecPolicy;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:628";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub listen_addr: String,
    /// Base directory for relative paths below. Defaults to the process working directory.
    pub working_dir: Option<PathBuf>,
    pub template_path: PathBuf,
    /// Directory for generated scripts, relative to `working_dir`.
    pub script_dir: PathBuf,
    pub users_path: PathBuf,
    /// HMAC key for session tokens. A random key is generated per process when unset.
    pub token_secret: Option<String>,
    pub token_ttl_secs: u64,
    /// Accept backup tasks with no remote targets.
    pub allow_empty_remotes: bool,
    /// Keep the task table in this file instead of the user's crontab.
    pub task_table_file: Option<PathBuf>,
    pub crontab_path: Option<String>,
    pub rclone_path: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            working_dir: None,
            template_path: PathBuf::from("bashTemplate").join("backup.sh"),
            script_dir: PathBuf::from("Bash"),
            users_path: PathBuf::from("users.json"),
            token_secret: None,
            token_ttl_secs: 3600,
            allow_empty_remotes: false,
            task_table_file: None,
            crontab_path: None,
            rclone_path: None,
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Loads `path`, or the per-user config file when no path is given. A
    /// missing per-user file is created with defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };
        if !path.exists() {
            if explicit {
                anyhow::bail!("config file not found");
            }
            let config = Self::default();
            config.save_to(&path)?;
            return Ok(config);
        }
        let content = fs::read_to_string(&path).context("read config")?;
        let config: AgentConfig = serde_json::from_str(&content).context("parse config")?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("create config dir")?;
        }
        let content = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, content).context("write config")?;
        Ok(())
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        let proj = ProjectDirs::from("com", "cronvault", "Cronvault").context("resolve config dir")?;
        Ok(proj.config_dir().join("config.json"))
    }

    pub fn base_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.working_dir {
            Some(dir) => std::path::absolute(dir).context("resolve working dir"),
            None => std::env::current_dir().context("resolve working dir"),
        }
    }

    pub fn resolve(&self, relative: &Path) -> anyhow::Result<PathBuf> {
        Ok(self.base_dir()?.join(relative))
    }

    pub fn script_root(&self) -> anyhow::Result<PathBuf> {
        self.resolve(&self.script_dir)
    }

    pub fn spec_policy(&self) -> SpecPolicy {
        SpecPolicy { allow_empty_remotes: self.allow_empty_remotes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"listen_addr":"0.0.0.0:9000","allow_empty_remotes":true}"#).unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert!(config.spec_policy().allow_empty_remotes);
        assert_eq!(config.script_dir, PathBuf::from("Bash"));
        assert_eq!(config.token_ttl_secs, 3600);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(AgentConfig::load(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_working_dir() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            working_dir: Some(dir.path().to_path_buf()),
            ..AgentConfig::default()
        };
        assert_eq!(config.script_root().unwrap(), dir.path().join("Bash"));
        assert_eq!(
            config.resolve(&config.template_path).unwrap(),
            dir.path().join("bashTemplate").join("backup.sh")
        );
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AgentConfig { token_ttl_secs: 60, ..AgentConfig::default() };
        config.save_to(&path).unwrap();
        assert_eq!(AgentConfig::load(Some(&path)).unwrap().token_ttl_secs, 60);
    }
}
