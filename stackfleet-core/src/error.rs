use stackfleet_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Install config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid request: {0}")]
    Model(#[from] ModelError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("CloudFormation error: {0}")]
    Stacks(String),

    #[error("Object store error: {0}")]
    Objects(String),

    #[error("Scheduler error: {0}")]
    Schedule(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Command `{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid install config: {0}")]
    InstallConfig(String),

    #[error("Missing input: {0}")]
    MissingInput(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;
