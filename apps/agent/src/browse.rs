use anyhow::{anyhow, Context};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub path: String,
    pub is_leaf: bool,
    pub is_directory: bool,
}

/// Only absolute paths without `..` components are browsable.
pub fn is_browsable(path: &Path) -> bool {
    path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::Normal(_)))
}

/// Entries of `dir`, sorted by name.
pub fn list_directory(dir: &Path) -> anyhow::Result<Vec<FileNode>> {
    if !is_browsable(dir) {
        return Err(anyhow!("path is not browsable"));
    }
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir).context("read directory")? {
        let entry = entry.context("read directory entry")?;
        let is_directory = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        nodes.push(FileNode {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_string_lossy().into_owned(),
            is_leaf: !is_directory,
            is_directory,
        });
    }
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}
