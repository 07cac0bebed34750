//! Provisioning of scheduled rclone backup jobs: a generated bash script per
//! task plus a crontab entry that runs it.

pub mod api;
pub mod auth;
pub mod browse;
pub mod config;
pub mod crontab;
pub mod errors;
pub mod install;
pub mod logging;
pub mod orchestrator;
pub mod remotes;
pub mod render;
pub mod schedule;
pub mod state;
pub mod task;
pub mod users;
