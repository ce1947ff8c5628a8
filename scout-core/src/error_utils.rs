use crate::error::*;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn error_code(&self) -> String;
    /// Whether the failure must abort the whole run rather than skip one item.
    fn is_fatal(&self) -> bool;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Llm(e) => {
                error!("LLM error details: {:?}", e);
            }
            CoreError::Notify(e) => {
                error!("Notification error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            CoreError::Network(e) => {
                error!("Network error details: {:?}", e);
            }
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "CoreError (warning): {}", self);
        self
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Llm(_) => "LLM".to_string(),
            CoreError::Notify(_) => "NOTIFY".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Database(_) | CoreError::Config(_))
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::HttpStatus { .. } => "REDDIT_HTTP_STATUS".to_string(),
            RedditApiError::RequestTimeout { .. } => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::InvalidEndpoint { .. } => "REDDIT_INVALID_ENDPOINT".to_string(),
        }
    }

    // Source failures only ever cost one round of coverage.
    fn is_fatal(&self) -> bool {
        false
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }

    fn is_fatal(&self) -> bool {
        true
    }
}
