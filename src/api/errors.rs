use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("remote command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("JSON encoding failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("model server returned an error: {0}")]
    ApiError(String),
    #[error("IO error while talking to the remote command: {0}")]
    IoError(#[from] std::io::Error),
}
