//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// A line of request input could not be understood
    #[error("Invalid request on line {line}: {message}")]
    InvalidRequest { line: usize, message: String },

    /// The dispatcher refused a request
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] dispatcher::DispatchError),

    /// The dispatcher task ended abnormally
    #[error("Dispatcher task failed: {message}")]
    DispatcherTask { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_request(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            line,
            message: message.into(),
        }
    }

    pub fn dispatcher_task(message: impl Into<String>) -> Self {
        Self::DispatcherTask {
            message: message.into(),
        }
    }
}
