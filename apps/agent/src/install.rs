use crate::crontab::TaskTable;
use crate::errors::{InstallError, InstallStage};
use crate::schedule;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

/// Adds backup entries to the task table.
///
/// All installs through one `Installer` are serialized so the
/// read-modify-replace of the table cannot lose a concurrent update.
pub struct Installer {
    table: Arc<dyn TaskTable>,
    write_lock: Mutex<()>,
}

impl Installer {
    pub fn new(table: Arc<dyn TaskTable>) -> Self {
        Self { table, write_lock: Mutex::new(()) }
    }

    pub fn install(
        &self,
        schedule_expr: &str,
        script_path: &Path,
        task_label: &str,
    ) -> Result<InstallOutcome, InstallError> {
        schedule::validate(schedule_expr)?;
        let entry = job_entry(schedule_expr, script_path, task_label);

        // A poisoned lock only means another install panicked; the table itself
        // is never left half-written.
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.table.read()?;
        if contains_entry(&current, entry.as_bytes()) {
            debug!("install: entry for {} already present", task_label);
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        // Other entries are carried over byte for byte, whatever their encoding.
        let mut next = current;
        if !next.is_empty() && !next.ends_with(b"\n") {
            next.push(b'\n');
        }
        next.extend_from_slice(entry.as_bytes());

        // Removed on drop, whichever way this function returns.
        let mut staged = tempfile::Builder::new()
            .prefix("crontab_")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| InstallError::io(InstallStage::WriteTemp, e))?;
        staged
            .write_all(&next)
            .and_then(|_| staged.flush())
            .map_err(|e| InstallError::io(InstallStage::WriteTemp, e))?;

        self.table.install_from_file(staged.path())?;
        info!("install: scheduled task {} added", task_label);
        Ok(InstallOutcome::Installed)
    }
}

fn contains_entry(table: &[u8], entry: &[u8]) -> bool {
    !entry.is_empty() && table.windows(entry.len()).any(|window| window == entry)
}

/// The two-line unit identifying one backup job in the table.
pub fn job_entry(schedule_expr: &str, script_path: &Path, task_label: &str) -> String {
    format!(
        "# Backup Task: {}\n{} {}\n",
        task_label,
        schedule_expr,
        quote_path(&script_path.to_string_lossy())
    )
}

/// Double-quotes a path for a crontab command line run by `/bin/sh`.
///
/// Quotes, backslashes, `$` and backticks are escaped for the shell, `%` for
/// cron (which otherwise turns it into a newline), and control characters are
/// written as escapes.
pub fn quote_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 2);
    out.push('"');
    for c in path.chars() {
        match c {
            '"' | '\\' | '$' | '`' | '%' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crontab::FileTaskTable;
    use crate::errors::ScheduleError;
    use std::fs;
    use tempfile::TempDir;

    fn installer(dir: &TempDir) -> (Installer, Arc<FileTaskTable>) {
        let table = Arc::new(FileTaskTable::new(dir.path().join("crontab")));
        (Installer::new(table.clone()), table)
    }

    fn text(table: &FileTaskTable) -> String {
        String::from_utf8(table.read().unwrap()).unwrap()
    }

    struct FailingSwap;

    impl TaskTable for FailingSwap {
        fn read(&self) -> Result<Vec<u8>, InstallError> {
            Ok(b"existing\n".to_vec())
        }

        fn install_from_file(&self, _path: &Path) -> Result<(), InstallError> {
            Err(InstallError::Command {
                stage: InstallStage::Swap,
                status: Some(1),
                detail: "refused".to_string(),
            })
        }
    }

    #[test]
    fn entry_layout() {
        let entry = job_entry("0 2 * * *", Path::new("/srv/Bash/daily.sh"), "daily.sh");
        assert_eq!(entry, "# Backup Task: daily.sh\n0 2 * * * \"/srv/Bash/daily.sh\"\n");
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote_path("/a b/c"), "\"/a b/c\"");
        assert_eq!(quote_path("/a\"b\\c"), "\"/a\\\"b\\\\c\"");
        assert_eq!(quote_path("/a\nb"), "\"/a\\nb\"");
    }

    #[test]
    fn quoting_neutralizes_substitution_and_cron_percent() {
        assert_eq!(quote_path("/srv/$(id)/x.sh"), r#""/srv/\$(id)/x.sh""#);
        assert_eq!(quote_path("/srv/`id`/x.sh"), r#""/srv/\`id\`/x.sh""#);
        assert_eq!(quote_path("/srv/50%/x.sh"), r#""/srv/50\%/x.sh""#);
    }

    #[test]
    fn installs_into_empty_table() {
        let dir = TempDir::new().unwrap();
        let (installer, table) = installer(&dir);
        let outcome = installer.install("0 2 * * *", Path::new("/srv/Bash/daily.sh"), "daily.sh").unwrap();
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(
            text(&table),
            "# Backup Task: daily.sh\n0 2 * * * \"/srv/Bash/daily.sh\"\n"
        );
    }

    #[test]
    fn repeated_installs_do_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let (installer, table) = installer(&dir);
        let path = Path::new("/srv/Bash/daily.sh");
        installer.install("0 2 * * *", path, "daily.sh").unwrap();
        let after_one = text(&table);
        for _ in 0..3 {
            let outcome = installer.install("0 2 * * *", path, "daily.sh").unwrap();
            assert_eq!(outcome, InstallOutcome::AlreadyInstalled);
        }
        assert_eq!(text(&table), after_one);
    }

    #[test]
    fn unrelated_entries_survive() {
        let dir = TempDir::new().unwrap();
        let (installer, table) = installer(&dir);
        fs::write(table.path(), "MAILTO=ops\n*/5 * * * * /usr/bin/true").unwrap();

        installer.install("0 2 * * *", Path::new("/b/daily.sh"), "daily.sh").unwrap();
        installer.install("0 3 * * 0", Path::new("/b/weekly.sh"), "weekly.sh").unwrap();

        let content = text(&table);
        assert!(content.starts_with("MAILTO=ops\n*/5 * * * * /usr/bin/true\n"));
        assert!(content.contains("# Backup Task: daily.sh\n0 2 * * * \"/b/daily.sh\"\n"));
        assert!(content.contains("# Backup Task: weekly.sh\n0 3 * * 0 \"/b/weekly.sh\"\n"));
    }

    #[test]
    fn non_utf8_entries_survive_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let (installer, table) = installer(&dir);
        let existing = b"0 1 * * * /opt/caf\xe9/run.sh\n".to_vec();
        fs::write(table.path(), &existing).unwrap();

        installer.install("0 2 * * *", Path::new("/b/daily.sh"), "daily.sh").unwrap();
        assert_eq!(
            installer.install("0 2 * * *", Path::new("/b/daily.sh"), "daily.sh").unwrap(),
            InstallOutcome::AlreadyInstalled
        );

        let content = table.read().unwrap();
        assert!(content.starts_with(&existing));
        assert!(content.ends_with(b"# Backup Task: daily.sh\n0 2 * * * \"/b/daily.sh\"\n"));
    }

    #[test]
    fn schedule_is_revalidated() {
        let dir = TempDir::new().unwrap();
        let (installer, table) = installer(&dir);
        let err = installer.install("0 2 * *", Path::new("/b/x.sh"), "x.sh").unwrap_err();
        assert!(matches!(err, InstallError::Schedule(ScheduleError::Malformed(4))));
        assert!(table.read().unwrap().is_empty());
    }

    #[test]
    fn swap_failure_surfaces_as_install_error() {
        let installer = Installer::new(Arc::new(FailingSwap));
        let err = installer.install("0 2 * * *", Path::new("/b/x.sh"), "x.sh").unwrap_err();
        assert_eq!(err.stage(), Some(InstallStage::Swap));
    }

    #[test]
    fn concurrent_installs_keep_every_entry() {
        let dir = TempDir::new().unwrap();
        let (installer, table) = installer(&dir);
        let installer = Arc::new(installer);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let installer = installer.clone();
                std::thread::spawn(move || {
                    let path = format!("/b/task{}.sh", i);
                    installer
                        .install("0 2 * * *", Path::new(&path), &format!("task{}.sh", i))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let content = text(&table);
        for i in 0..8 {
            assert!(content.contains(&format!("# Backup Task: task{}.sh\n", i)));
        }
    }
}
