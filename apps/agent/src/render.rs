//! Backup script generation from the deployment-supplied bash template.
//!
//! Templates use `{{.Field}}` placeholders. Only the fields of
//! [`Field`] are known; anything else is rejected when the template is parsed.
//! Free-text values (source directory, password, remote targets) are escaped
//! for use inside bash double quotes.

use crate::errors::{RenderError, RenderStage};
use crate::task::{check_task_name, escape_double_quoted, BackupTaskSpec};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supplies the raw template text.
pub trait TemplateSource: Send + Sync {
    fn load(&self) -> std::io::Result<String>;
}

#[derive(Debug, Clone)]
pub struct FileTemplate {
    path: PathBuf,
}

impl FileTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for FileTemplate {
    fn load(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// Template text held in memory.
#[derive(Debug, Clone)]
pub struct InlineTemplate(pub String);

impl TemplateSource for InlineTemplate {
    fn load(&self) -> std::io::Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    pub path: PathBuf,
    /// Hex SHA-256 of the script content.
    pub digest: String,
    /// True when an earlier script at the same path was overwritten.
    pub replaced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TaskName,
    ScriptName,
    SourceDir,
    RcloneRemoteStr,
    MaxBackups,
    IsSplit,
    IsEncrypt,
    EncryptionPassword,
    CronTime,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "TaskName" => Field::TaskName,
            "ScriptName" => Field::ScriptName,
            "SourceDir" => Field::SourceDir,
            "RcloneRemoteStr" => Field::RcloneRemoteStr,
            "MaxBackups" => Field::MaxBackups,
            "IsSplit" => Field::IsSplit,
            "IsEncrypt" => Field::IsEncrypt,
            "EncryptionPassword" => Field::EncryptionPassword,
            "CronTime" => Field::CronTime,
            _ => return None,
        };
        Some(field)
    }

    fn value(self, spec: &BackupTaskSpec) -> String {
        match self {
            Field::TaskName => escape_double_quoted(&spec.name),
            Field::ScriptName => escape_double_quoted(&spec.script_file_name()),
            Field::SourceDir => escape_double_quoted(&spec.source_directory),
            Field::RcloneRemoteStr => spec.remote_array_literal(),
            Field::MaxBackups => spec.max_backups.to_string(),
            Field::IsSplit => spec.split_enabled.to_string(),
            Field::IsEncrypt => spec.encrypt_enabled.to_string(),
            Field::EncryptionPassword => escape_double_quoted(&spec.encryption_password),
            Field::CronTime => spec.schedule.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, RenderError> {
        let mut segments = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| parse_error("unterminated placeholder"))?;
            let inner = after[..close].trim();
            let name = inner
                .strip_prefix('.')
                .ok_or_else(|| parse_error("placeholder must reference a field"))?;
            let field = Field::from_name(name)
                .ok_or_else(|| parse_error(&format!("unknown field {:?}", name)))?;
            segments.push(Segment::Field(field));
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn execute(&self, spec: &BackupTaskSpec) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&field.value(spec)),
            }
        }
        out
    }
}

fn parse_error(reason: &str) -> RenderError {
    RenderError::Template {
        stage: RenderStage::ParseTemplate,
        reason: reason.to_string(),
    }
}

/// Writes `<output_root>/<name>.sh`, mode 0755.
///
/// The script is staged in a temporary file next to its destination and
/// renamed into place only after it is complete and executable, so a failure
/// never leaves a half-written script behind.
pub fn render(
    spec: &BackupTaskSpec,
    source: &dyn TemplateSource,
    output_root: &Path,
) -> Result<RenderedScript, RenderError> {
    check_task_name(&spec.name)?;

    let text = source
        .load()
        .map_err(|e| RenderError::io(RenderStage::ReadTemplate, e))?;
    let template = Template::parse(&text)?;

    let output_root =
        std::path::absolute(output_root).map_err(|e| RenderError::io(RenderStage::CreateDirectory, e))?;
    fs::create_dir_all(&output_root).map_err(|e| RenderError::io(RenderStage::CreateDirectory, e))?;
    let path = output_root.join(spec.script_file_name());
    let replaced = path.exists();

    let content = template.execute(spec);
    let digest = hex::encode(Sha256::digest(content.as_bytes()));

    let mut staged = tempfile::Builder::new()
        .prefix(".render-")
        .suffix(".tmp")
        .tempfile_in(&output_root)
        .map_err(|e| RenderError::io(RenderStage::CreateFile, e))?;
    staged
        .write_all(content.as_bytes())
        .and_then(|_| staged.flush())
        .map_err(|e| RenderError::io(RenderStage::ExecuteTemplate, e))?;
    set_executable(staged.path()).map_err(|e| RenderError::io(RenderStage::SetPermissions, e))?;
    staged
        .persist(&path)
        .map_err(|e| RenderError::io(RenderStage::Persist, e.error))?;

    debug!("render: wrote script {} replaced={}", spec.script_file_name(), replaced);
    Ok(RenderedScript { path, digest, replaced })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SpecError;
    use tempfile::TempDir;

    const TEMPLATE: &str = "#!/bin/bash\n\
        TASK={{.TaskName}}\n\
        SRC=\"{{ .SourceDir }}\"\n\
        REMOTES={{.RcloneRemoteStr}}\n\
        MAX={{.MaxBackups}}\n\
        SPLIT={{.IsSplit}}\n\
        ENCRYPT={{.IsEncrypt}}\n\
        PASS=\"{{.EncryptionPassword}}\"\n\
        # {{.CronTime}} {{.ScriptName}}\n";

    fn spec() -> BackupTaskSpec {
        BackupTaskSpec {
            name: "daily".to_string(),
            source_directory: "/data".to_string(),
            remote_targets: vec!["remote1:bk".to_string()],
            max_backups: 5,
            split_enabled: false,
            encrypt_enabled: true,
            encryption_password: "pw".to_string(),
            schedule: "0 2 * * *".to_string(),
        }
    }

    #[test]
    fn binds_every_field() {
        let template = Template::parse(TEMPLATE).unwrap();
        let out = template.execute(&spec());
        assert!(out.contains("TASK=daily\n"));
        assert!(out.contains("SRC=\"/data\"\n"));
        assert!(out.contains("REMOTES=(\"remote1:bk\" )\n"));
        assert!(out.contains("MAX=5\n"));
        assert!(out.contains("SPLIT=false\n"));
        assert!(out.contains("ENCRYPT=true\n"));
        assert!(out.contains("PASS=\"pw\"\n"));
        assert!(out.contains("# 0 2 * * * daily.sh\n"));
    }

    #[test]
    fn parse_rejects_unknown_and_unterminated_placeholders() {
        for text in ["{{.Nope}}", "a {{.TaskName", "{{TaskName}}"] {
            let err = Template::parse(text).unwrap_err();
            assert_eq!(err.stage(), Some(RenderStage::ParseTemplate), "{text:?}");
        }
    }

    #[test]
    fn free_text_values_are_escaped_for_double_quotes() {
        let mut s = spec();
        s.encryption_password = "a\"b$c".to_string();
        s.source_directory = "/srv/`x`".to_string();
        let template = Template::parse("P=\"{{.EncryptionPassword}}\" S=\"{{.SourceDir}}\"").unwrap();
        assert_eq!(template.execute(&s), "P=\"a\\\"b\\$c\" S=\"/srv/\\`x\\`\"");
    }

    #[test]
    fn text_without_placeholders_is_kept() {
        let template = Template::parse("echo hi\n").unwrap();
        assert_eq!(template.execute(&spec()), "echo hi\n");
    }

    #[test]
    fn writes_executable_script() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Bash");
        let rendered = render(&spec(), &InlineTemplate(TEMPLATE.to_string()), &root).unwrap();

        assert_eq!(rendered.path, root.join("daily.sh"));
        assert!(!rendered.replaced);
        let content = fs::read_to_string(&rendered.path).unwrap();
        assert_eq!(rendered.digest, hex::encode(Sha256::digest(content.as_bytes())));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&rendered.path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn rendering_twice_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let source = InlineTemplate(TEMPLATE.to_string());
        let first = render(&spec(), &source, dir.path()).unwrap();
        let first_bytes = fs::read(&first.path).unwrap();
        let second = render(&spec(), &source, dir.path()).unwrap();

        assert!(second.replaced);
        assert_eq!(first.digest, second.digest);
        assert_eq!(first_bytes, fs::read(&second.path).unwrap());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn empty_remote_list_renders_empty_array() {
        let dir = TempDir::new().unwrap();
        let mut s = spec();
        s.remote_targets.clear();
        let rendered = render(&s, &InlineTemplate("R={{.RcloneRemoteStr}}".to_string()), dir.path()).unwrap();
        assert_eq!(fs::read_to_string(rendered.path).unwrap(), "R=()");
    }

    #[test]
    fn traversal_name_is_rejected_before_any_write() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Bash");
        let mut s = spec();
        s.name = "../evil".to_string();
        let err = render(&s, &InlineTemplate(TEMPLATE.to_string()), &root).unwrap_err();
        assert!(matches!(err, RenderError::Spec(SpecError::UnsafeName)));
        assert!(!root.exists());
        assert!(!dir.path().join("evil.sh").exists());
    }

    #[test]
    fn missing_template_reports_read_stage() {
        let dir = TempDir::new().unwrap();
        let source = FileTemplate::new(dir.path().join("missing.sh"));
        let err = render(&spec(), &source, dir.path()).unwrap_err();
        assert_eq!(err.stage(), Some(RenderStage::ReadTemplate));
    }

    #[test]
    fn bad_template_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let err = render(&spec(), &InlineTemplate("{{.Bogus}}".to_string()), dir.path()).unwrap_err();
        assert_eq!(err.stage(), Some(RenderStage::ParseTemplate));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
