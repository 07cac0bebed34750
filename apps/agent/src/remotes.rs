//! Names of the remotes configured in rclone, offered to the web client as
//! backup destinations.

use anyhow::{anyhow, Context};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use which::which;

const CONFIG_FILE_PREFIX: &str = "Configuration file is stored at:";

#[derive(Debug, Clone)]
pub struct Rclone {
    binary: PathBuf,
}

impl Rclone {
    pub fn resolve(override_path: Option<&str>) -> anyhow::Result<Self> {
        if let Some(path) = override_path {
            return Ok(Self { binary: PathBuf::from(path) });
        }
        let binary = which("rclone").context("rclone not found in PATH")?;
        Ok(Self { binary })
    }

    pub fn config_file(&self) -> anyhow::Result<PathBuf> {
        let output = Command::new(&self.binary)
            .args(["config", "file"])
            .stdin(Stdio::null())
            .output()
            .context("spawn rclone")?;
        if !output.status.success() {
            return Err(anyhow!("rclone config file failed"));
        }
        parse_config_file_output(&String::from_utf8_lossy(&output.stdout))
    }

    pub fn remote_names(&self) -> anyhow::Result<Vec<String>> {
        let path = self.config_file()?;
        let content = fs::read_to_string(&path).context("read rclone config")?;
        Ok(section_names(&content))
    }
}

fn parse_config_file_output(stdout: &str) -> anyhow::Result<PathBuf> {
    let rest = stdout
        .trim_start()
        .strip_prefix(CONFIG_FILE_PREFIX)
        .ok_or_else(|| anyhow!("unexpected rclone config file output"))?;
    let path = rest.trim();
    if path.is_empty() {
        return Err(anyhow!("rclone reported an empty config path"));
    }
    Ok(PathBuf::from(path))
}

/// `[name]` headers of an INI file, in file order.
pub fn section_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('[')?.strip_suffix(']'))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_path() {
        let out = "Configuration file is stored at:\n/home/op/.config/rclone/rclone.conf\n";
        assert_eq!(
            parse_config_file_output(out).unwrap(),
            PathBuf::from("/home/op/.config/rclone/rclone.conf")
        );
        assert!(parse_config_file_output("something else").is_err());
        assert!(parse_config_file_output(CONFIG_FILE_PREFIX).is_err());
    }

    #[test]
    fn lists_sections_in_order() {
        let conf = "[gdrive]\ntype = drive\n\n[ s3-archive ]\ntype = s3\nkey = [not a section\n[]\n";
        assert_eq!(section_names(conf), vec!["gdrive", "s3-archive"]);
    }
}
