use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed job descriptor {job_id}: {reason}")]
    Descriptor { job_id: String, reason: String },

    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job request: {0}")]
    Request(String),

    #[error("result not available: {0}")]
    NotReady(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
