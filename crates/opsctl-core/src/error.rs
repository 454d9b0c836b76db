use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("not initialized: run 'opsctl init'")]
    NotInitialized,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid action id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidActionId(String),

    #[error("duplicate action id: {0}")]
    DuplicateAction(String),

    #[error("no active schedule for action: {0}")]
    NoActiveSchedule(String),

    #[error("invalid interval: {0} minutes (must be at least 1, at most one year)")]
    InvalidInterval(u64),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("no valid IPv4 hosts provided")]
    NoValidHosts,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OpsError>;
