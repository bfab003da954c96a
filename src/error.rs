use std::path::PathBuf;

use aws_cfn_stack::StackError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Bucket name {bucket} must exactly match the frontend domain {domain}")]
    BucketNameMismatch { bucket: String, domain: String },

    #[error("Bucket {0} already exists and is owned by another AWS account")]
    BucketOwnedElsewhere(String),

    /// domain ownership could not be proven. Retrying will not help.
    #[error("Certificate for {domain} was rejected: {reason}")]
    CertificateRejected { domain: String, reason: String },

    #[error("Stack {stack} did not report output {output}")]
    MissingOutput { stack: String, output: String },

    #[error("Failed to upload {key} to bucket {bucket}: {message}")]
    Upload { bucket: String, key: String, message: String },

    #[error("Failed to bundle {path}: {message}")]
    Bundle { path: PathBuf, message: String },

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    pub fn config(message: impl Into<String>) -> Self {
        DeployError::Config(message.into())
    }

    /// true for failures that a later re-run may get past without changes.
    pub fn is_transient(&self) -> bool {
        match self {
            DeployError::Stack(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
