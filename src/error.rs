use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a prompt from turning into rendered output.
///
/// Each stage of the pipeline fails fast with one of these; nothing is
/// retried and nothing is rendered once an error has been returned.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no usable API key in {path}: {reason}")]
    CredentialMissing { path: PathBuf, reason: String },

    #[error("failed to parse secrets file {path} at line {line}, column {column}: {message}")]
    CredentialParse {
        path: PathBuf,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("failed to build request: {0}")]
    RequestBuild(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("ran out of memory while buffering {requested} more response bytes after {received}")]
    TransportMemory { received: usize, requested: usize },

    /// The body is kept verbatim since it is frequently an HTML error page
    /// or a truncated payload rather than JSON.
    #[error("failed to parse response as JSON: {message}\nRaw response:\n{raw}")]
    ResponseParse { message: String, raw: String },

    #[error("unexpected response shape: {0}")]
    ResponseShape(String),

    #[error("failed to write to the terminal: {0}")]
    Render(#[from] std::io::Error),
}

impl ChatError {
    /// Process exit status for this failure, one per error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChatError::CredentialMissing { .. } => 2,
            ChatError::CredentialParse { .. } => 3,
            ChatError::RequestBuild(_) => 4,
            ChatError::Transport(_) => 5,
            ChatError::TransportMemory { .. } => 6,
            ChatError::ResponseParse { .. } => 7,
            ChatError::ResponseShape(_) => 8,
            ChatError::Render(_) => 9,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(error: reqwest::Error) -> ChatError {
        if error.is_timeout() {
            return ChatError::Transport(format!("request timed out: {}", error));
        } else if error.is_connect() {
            return ChatError::Transport(format!("could not connect: {}", error));
        }

        ChatError::Transport(error.to_string())
    }
}
