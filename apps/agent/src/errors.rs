use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule must have 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    Malformed(usize),
    #[error("schedule is not a valid cron expression")]
    Invalid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("task name is required")]
    EmptyName,
    #[error("task name may only contain letters, digits, '.', '_' and '-'")]
    UnsafeName,
    #[error("source directory must be an absolute path")]
    RelativeSource,
    #[error("at least one remote target is required")]
    NoRemotes,
    #[error("remote targets must not be blank")]
    BlankRemote,
    #[error("encryption password is required when encryption is enabled")]
    MissingPassword,
    #[error("{0} must not contain control characters")]
    ControlCharacters(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    ReadTemplate,
    ParseTemplate,
    CreateDirectory,
    CreateFile,
    ExecuteTemplate,
    SetPermissions,
    Persist,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RenderStage::ReadTemplate => "read template",
            RenderStage::ParseTemplate => "parse template",
            RenderStage::CreateDirectory => "create script directory",
            RenderStage::CreateFile => "create script file",
            RenderStage::ExecuteTemplate => "execute template",
            RenderStage::SetPermissions => "set script permissions",
            RenderStage::Persist => "persist script",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("{stage}: {reason}")]
    Template { stage: RenderStage, reason: String },
    #[error("{stage} failed")]
    Io {
        stage: RenderStage,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub fn io(stage: RenderStage, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }

    pub fn stage(&self) -> Option<RenderStage> {
        match self {
            RenderError::Spec(_) => None,
            RenderError::Template { stage, .. } | RenderError::Io { stage, .. } => Some(*stage),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Read,
    WriteTemp,
    Swap,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            InstallStage::Read => "read task table",
            InstallStage::WriteTemp => "write temporary task table",
            InstallStage::Swap => "install task table",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("{stage} failed")]
    Io {
        stage: InstallStage,
        #[source]
        source: std::io::Error,
    },
    /// The task-table command ran but reported failure. `detail` is raw command output.
    #[error("{stage} failed (exit status {status:?})")]
    Command {
        stage: InstallStage,
        status: Option<i32>,
        detail: String,
    },
}

impl InstallError {
    pub fn io(stage: InstallStage, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }

    pub fn stage(&self) -> Option<InstallStage> {
        match self {
            InstallError::Schedule(_) => None,
            InstallError::Io { stage, .. } | InstallError::Command { stage, .. } => Some(*stage),
        }
    }
}

/// Pipeline stage at which a backup task request stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Render,
    Install,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MalformedSchedule,
    InvalidSchedule,
    InvalidSpec,
    Render,
    Install,
}

/// Caller-visible failure of a backup task request. The message never carries
/// filesystem paths or command output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    pub stage: Stage,
    pub category: ErrorCategory,
    pub message: String,
}

impl TaskError {
    pub fn from_schedule(stage: Stage, err: &ScheduleError) -> Self {
        let category = match err {
            ScheduleError::Malformed(_) => ErrorCategory::MalformedSchedule,
            ScheduleError::Invalid => ErrorCategory::InvalidSchedule,
        };
        Self { stage, category, message: err.to_string() }
    }

    pub fn from_spec(err: &SpecError) -> Self {
        Self {
            stage: Stage::Validate,
            category: ErrorCategory::InvalidSpec,
            message: err.to_string(),
        }
    }

    pub fn from_render(err: &RenderError) -> Self {
        match err {
            RenderError::Spec(spec) => Self { stage: Stage::Render, ..Self::from_spec(spec) },
            RenderError::Template { stage, .. } | RenderError::Io { stage, .. } => Self {
                stage: Stage::Render,
                category: ErrorCategory::Render,
                message: format!("failed to generate backup script ({})", stage),
            },
        }
    }

    pub fn from_install(err: &InstallError) -> Self {
        match err {
            InstallError::Schedule(schedule) => Self::from_schedule(Stage::Install, schedule),
            InstallError::Io { stage, .. } | InstallError::Command { stage, .. } => Self {
                stage: Stage::Install,
                category: ErrorCategory::Install,
                message: format!("failed to add scheduled task ({})", stage),
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("registration is closed")]
    RegistrationClosed,
    #[error("username and password are required")]
    EmptyCredentials,
}
