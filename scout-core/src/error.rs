use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Request to {url} failed with status {status_code}")]
    HttpStatus { url: String, status_code: u16 },

    #[error("Request to {url} timed out")]
    RequestTimeout { url: String },

    #[error("Invalid API response from {url}: {details}")]
    InvalidResponse { url: String, details: String },

    #[error("Invalid endpoint: {details}")]
    InvalidEndpoint { details: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Provider {provider} returned status {status_code}")]
    ServiceUnavailable { provider: String, status_code: u16 },

    #[error("Request timeout for {provider}")]
    RequestTimeout { provider: String },

    #[error("Invalid response format from {provider}: {details}")]
    InvalidResponseFormat { provider: String, details: String },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Webhook rejected chunk {chunk} of {total}: status {status_code}")]
    Rejected {
        chunk: usize,
        total: usize,
        status_code: u16,
    },

    #[error("Webhook delivery failed for chunk {chunk} of {total}: {reason}")]
    DeliveryFailed {
        chunk: usize,
        total: usize,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
