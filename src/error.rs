//! Error types shared by the catalog helpers and the reconciliation adapter
//!
//! Errors fall into three groups:
//! - lookup failures (`ChartNotFound`, `SettingNotFound`, `ProjectNotFound`) abort
//!   the calling operation before anything is mutated
//! - conflicts (`Conflict`, or an API error with HTTP 409) are recoverable and
//!   get folded into condition state by the status handler
//! - everything else is propagated to whoever drives the handlers

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rancher API returned {status} for {url}: {body}")]
    ApiStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Chart {chart} not found in repository {repo}")]
    ChartNotFound { chart: String, repo: String },

    #[error("Setting {0} not found")]
    SettingNotFound(String),

    #[error("Project {name} not found in cluster {cluster}")]
    ProjectNotFound { cluster: String, name: String },

    #[error("Invalid chart values: {0}")]
    InvalidChartValues(String),

    #[error("App {namespace}/{name} failed to install: {message}")]
    InstallFailed {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { seconds: u64, what: String },

    #[error("Watch ended before {0}")]
    WatchEnded(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Apply failed: {0}")]
    Apply(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{} cleanup action(s) failed: {}", .0.len(), .0.join("; "))]
    Cleanup(Vec<String>),
}

impl Error {
    /// Whether this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            Error::ApiStatus { status, .. } => *status == 409,
            _ => false,
        }
    }

    /// Whether this error means the looked-up object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ChartNotFound { .. }
            | Error::SettingNotFound(_)
            | Error::ProjectNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            Error::ApiStatus { status, .. } => *status == 404,
            _ => false,
        }
    }
}
