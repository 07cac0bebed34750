use anyhow::Context;
use cronvault_agent::api;
use cronvault_agent::config::AgentConfig;
use cronvault_agent::logging::init_logging;
use cronvault_agent::state::AgentState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AgentConfig::load(config_path.as_deref()).context("load config")?;

    let _log_guard = init_logging(config.log_dir.clone());
    info!("Cronvault agent starting");

    let state = Arc::new(AgentState::from_config(&config).context("init agent state")?);

    let listen_addr = config.listen_addr.clone();
    let server = tokio::spawn(async move {
        if let Err(err) = api::serve(state, &listen_addr).await {
            error!("HTTP server failed: {:#}", err);
        }
    });

    tokio::select! {
        _ = server => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Cronvault agent shutting down");
        }
    }
    Ok(())
}
