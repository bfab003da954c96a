use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("Invalid stack name {name}\n{restriction}")]
    InvalidName { name: String, restriction: &'static str },

    #[error("Validation failed on resource '{name}'\n{message}")]
    InvalidResource { name: String, message: String },

    #[error("Stack {stack} is missing values for parameters {missing:?}")]
    MissingParameters { stack: String, missing: Vec<String> },

    #[error("AWS request for stack {stack} failed: {message}")]
    Aws { stack: String, message: String },

    #[error("Stack {stack} ended in {status}: {reason}")]
    Failed { stack: String, status: String, reason: String },

    #[error("Timed out after {waited_secs}s waiting for stack {stack}")]
    Timeout { stack: String, waited_secs: u64 },

    #[error("Failed to serialize template for stack {stack}")]
    Serialize {
        stack: String,
        #[source]
        source: serde_json::Error,
    },
}

/// error codes and SDK failure kinds that clear up on their own.
const RETRYABLE_MARKERS: &[&str] = &[
    "throttling",
    "toomanyrequests",
    "requestlimitexceeded",
    "serviceunavailable",
    "internalfailure",
    "internalerror",
    "dispatch failure",
    "timeout",
];

impl StackError {
    /// waits that ran out and throttled, server-side or connection failures.
    /// Template validation and access errors come back the same on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            StackError::Timeout { .. } => true,
            StackError::Aws { message, .. } => {
                let message = message.to_ascii_lowercase();
                RETRYABLE_MARKERS.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }
}
