use crate::auth::TokenIssuer;
use crate::config::AgentConfig;
use crate::crontab::{Crontab, FileTaskTable, TaskTable};
use crate::install::Installer;
use crate::orchestrator::BackupTaskOrchestrator;
use crate::render::FileTemplate;
use crate::users::UserStore;
use anyhow::Context;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Everything the HTTP handlers need, built once from the config.
pub struct AgentState {
    pub orchestrator: BackupTaskOrchestrator,
    pub tokens: TokenIssuer,
    pub users: RwLock<UserStore>,
    pub rclone_path: Option<String>,
}

pub type SharedState = Arc<AgentState>;

impl AgentState {
    /// Resolves paths against the working directory, then opens the user
    /// store, the token key and the task table, in that order.
    pub fn from_config(config: &AgentConfig) -> anyhow::Result<Self> {
        let users = UserStore::load(config.resolve(&config.users_path)?).context("load users")?;
        if users.registration_open() {
            warn!("No operator registered yet; POST /register to create one.");
        }

        let validity = Duration::from_secs(config.token_ttl_secs);
        let tokens = match &config.token_secret {
            Some(secret) if !secret.is_empty() => TokenIssuer::new(secret.as_bytes().to_vec(), validity),
            _ => {
                info!("No token secret configured; sessions end when the agent restarts.");
                TokenIssuer::random(validity)
            }
        };

        let table: Arc<dyn TaskTable> = match &config.task_table_file {
            Some(path) => Arc::new(FileTaskTable::new(config.resolve(path)?)),
            None => Arc::new(Crontab::resolve(config.crontab_path.as_deref()).context("resolve crontab")?),
        };

        let orchestrator = BackupTaskOrchestrator::new(
            Arc::new(FileTemplate::new(config.resolve(&config.template_path)?)),
            Arc::new(Installer::new(table)),
            config.script_root()?,
            config.spec_policy(),
        );

        Ok(Self {
            orchestrator,
            tokens,
            users: RwLock::new(users),
            rclone_path: config.rclone_path.clone(),
        })
    }
}
