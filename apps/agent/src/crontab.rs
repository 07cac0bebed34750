//! Access to the host's periodic-task table.
//!
//! The table is only ever read whole and replaced whole from a file, the
//! same way `crontab -l` / `crontab <file>` work.

use crate::errors::{InstallError, InstallStage};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;
use which::which;

pub trait TaskTable: Send + Sync {
    /// Current table contents as raw bytes; empty when no table exists yet.
    fn read(&self) -> Result<Vec<u8>, InstallError>;

    /// Replaces the active table with the contents of `path`.
    fn install_from_file(&self, path: &Path) -> Result<(), InstallError>;
}

/// The invoking user's crontab, driven through the `crontab` binary.
#[derive(Debug, Clone)]
pub struct Crontab {
    binary: PathBuf,
}

impl Crontab {
    pub fn resolve(override_path: Option<&str>) -> anyhow::Result<Self> {
        if let Some(path) = override_path {
            return Ok(Self { binary: PathBuf::from(path) });
        }
        let binary = which("crontab").context("crontab not found in PATH")?;
        Ok(Self { binary })
    }
}

impl TaskTable for Crontab {
    fn read(&self) -> Result<Vec<u8>, InstallError> {
        let output = Command::new(&self.binary)
            .arg("-l")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InstallError::io(InstallStage::Read, e))?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_table(&stderr) {
            debug!("crontab: no table for current user yet");
            return Ok(Vec::new());
        }
        Err(InstallError::Command {
            stage: InstallStage::Read,
            status: output.status.code(),
            detail: stderr.trim().to_string(),
        })
    }

    fn install_from_file(&self, path: &Path) -> Result<(), InstallError> {
        let output = Command::new(&self.binary)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InstallError::io(InstallStage::Swap, e))?;
        if !output.status.success() {
            return Err(InstallError::Command {
                stage: InstallStage::Swap,
                status: output.status.code(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// `crontab -l` exits non-zero when the user has never installed a table:
/// cronie and vixie cron say "no crontab for <user>", busybox says
/// "can't open '<user>': No such file or directory".
fn is_missing_table(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no crontab for")
        || (stderr.contains("can't open") && stderr.contains("no such file or directory"))
}

/// A task table kept in a plain file, for hosts without cron.
#[derive(Debug, Clone)]
pub struct FileTaskTable {
    path: PathBuf,
}

impl FileTaskTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskTable for FileTaskTable {
    fn read(&self) -> Result<Vec<u8>, InstallError> {
        match fs::read(&self.path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(InstallError::io(InstallStage::Read, err)),
        }
    }

    fn install_from_file(&self, path: &Path) -> Result<(), InstallError> {
        let content = fs::read(path).map_err(|e| InstallError::io(InstallStage::Swap, e))?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| InstallError::io(InstallStage::Swap, e))?;
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| InstallError::io(InstallStage::Swap, e))?;
        std::io::Write::write_all(&mut staged, &content).map_err(|e| InstallError::io(InstallStage::Swap, e))?;
        staged
            .persist(&self.path)
            .map_err(|e| InstallError::io(InstallStage::Swap, e.error))?;
        Ok(())
    }
}
