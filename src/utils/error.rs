use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Source {source_id} failed: {message}")]
    Source { source_id: String, message: String },

    #[error("Invalid item: {reason}")]
    InvalidItem { reason: String },

    #[error("Persistence error during {operation}: {message}")]
    Persistence { operation: &'static str, message: String },

    #[error("Notification error: {channel}: {message}")]
    Notification { channel: String, message: String },

    #[error("Run interrupted")]
    Interrupted,

    #[error("Timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the run orchestrator treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Reported and counted; the run continues.
    Recoverable,
    /// Aborts the run before anything is written.
    Fatal,
}

impl AppError {
    pub fn source_failure(source_id: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AppError::Source {
            source_id: source_id.into(),
            message: cause.to_string(),
        }
    }

    pub fn invalid_item(reason: impl Into<String>) -> Self {
        AppError::InvalidItem { reason: reason.into() }
    }

    pub fn persistence(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        AppError::Persistence {
            operation,
            message: cause.to_string(),
        }
    }

    pub fn notification(channel: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AppError::Notification {
            channel: channel.into(),
            message: cause.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Persistence { .. }
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Interrupted => ErrorClass::Fatal,
            _ => ErrorClass::Recoverable,
        }
    }

    /// True when a delivery attempt ran out of time, either on our own deadline
    /// or inside the HTTP client.
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Timeout { .. } => true,
            AppError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

// Implement conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidItem { reason: format!("{}", err) }
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
