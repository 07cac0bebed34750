use crate::errors::{Stage, TaskError};
use crate::install::{InstallOutcome, Installer};
use crate::logging::Redact;
use crate::render::{self, RenderedScript, TemplateSource};
use crate::schedule;
use crate::task::{BackupTaskSpec, SpecPolicy};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Progress of one request. A failure at any step ends the request with a
/// [`TaskError`] naming the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Received,
    Validated,
    Rendered,
    Installed,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub message: String,
    pub task_name: String,
    pub script_name: String,
    pub digest: String,
    pub already_installed: bool,
}

/// Runs a backup task request through validation, rendering and installation.
///
/// Rendering, installing and any cleanup run under one lock, so a failed
/// request never deletes a script that a concurrent request just scheduled.
pub struct BackupTaskOrchestrator {
    template: Arc<dyn TemplateSource>,
    installer: Arc<Installer>,
    output_root: PathBuf,
    policy: SpecPolicy,
    provision_lock: Mutex<()>,
}

impl BackupTaskOrchestrator {
    pub fn new(
        template: Arc<dyn TemplateSource>,
        installer: Arc<Installer>,
        output_root: PathBuf,
        policy: SpecPolicy,
    ) -> Self {
        Self { template, installer, output_root, policy, provision_lock: Mutex::new(()) }
    }

    /// The caller must already be authorized.
    pub fn create_backup_task(&self, spec: &BackupTaskSpec) -> Result<Confirmation, TaskError> {
        let result = self.run(spec);
        match &result {
            Ok(confirmation) => info!(
                "backup task {} confirmed already_installed={}",
                confirmation.task_name, confirmation.already_installed
            ),
            Err(err) => warn!("backup task failed stage={:?} category={:?}: {}", err.stage, err.category, err.message),
        }
        result
    }

    fn run(&self, spec: &BackupTaskSpec) -> Result<Confirmation, TaskError> {
        enter(spec, TaskPhase::Received);

        schedule::validate(&spec.schedule).map_err(|e| TaskError::from_schedule(Stage::Validate, &e))?;
        spec.validate(self.policy).map_err(|e| TaskError::from_spec(&e))?;
        enter(spec, TaskPhase::Validated);

        let _guard = self.provision_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let script = render::render(spec, self.template.as_ref(), &self.output_root).map_err(|e| {
            error!("render failed: {}", e);
            TaskError::from_render(&e)
        })?;
        enter(spec, TaskPhase::Rendered);

        let outcome = match self
            .installer
            .install(&spec.schedule, &script.path, &spec.script_file_name())
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("install failed: {}", err);
                self.discard(&script);
                return Err(TaskError::from_install(&err));
            }
        };
        enter(spec, TaskPhase::Installed);

        let confirmation = Confirmation {
            message: "backup task created".to_string(),
            task_name: spec.name.clone(),
            script_name: spec.script_file_name(),
            digest: script.digest,
            already_installed: outcome == InstallOutcome::AlreadyInstalled,
        };
        enter(spec, TaskPhase::Confirmed);
        Ok(confirmation)
    }

    /// Removes a script this request created when its install failed. A script
    /// that replaced an earlier one may still be referenced by the table, so it stays.
    fn discard(&self, script: &RenderedScript) {
        if script.replaced {
            return;
        }
        if let Err(err) = fs::remove_file(&script.path) {
            error!("failed to remove unscheduled script: {}", Redact::new(err));
        }
    }
}

fn enter(spec: &BackupTaskSpec, phase: TaskPhase) {
    debug!("backup task {:?}: {:?}", spec.name, phase);
}
