//! Static run configuration.
//!
//! Values come from a TOML file with every field defaulted; secrets and
//! deployment-specific paths are then overridden from the environment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_DATABASE_PATH: &str = "SCOUT_DATABASE_PATH";

/// Number of sort strategies sampled per source.
pub const STRATEGY_COUNT: u32 = 4;

/// Window used by the "top" strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub reddit: RedditConfig,
    pub filters: FilterConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    pub gemini: GeminiConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub subreddits: Vec<String>,
    /// Posts per source, split evenly across the strategies.
    pub post_limit: u32,
    pub time_filter: TimeFilter,
    pub user_agent: String,
    pub base_url: String,
    pub request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub comment_limit: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddits: vec!["TOEFL".to_string(), "ToeflAdvice".to_string()],
            post_limit: 50,
            time_filter: TimeFilter::Day,
            user_agent: "TOEFL_Scout/1.0".to_string(),
            base_url: "https://www.reddit.com".to_string(),
            request_interval_ms: 1000,
            request_timeout_secs: 10,
            comment_limit: 100,
        }
    }
}

impl RedditConfig {
    pub fn per_strategy_limit(&self) -> u32 {
        self.post_limit / STRATEGY_COUNT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_upvotes: i64,
    pub min_comments: u64,
    pub min_comment_score: i64,
    pub keywords: Vec<String>,
    pub min_comment_length: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_upvotes: 5,
            min_comments: 2,
            min_comment_score: 3,
            keywords: Vec::new(),
            min_comment_length: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub ttl_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/pushed_posts.db"),
            ttl_days: 3,
        }
    }
}

impl DatabaseConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.ttl_days))
    }

    pub fn connection_url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub top_n: usize,
    pub min_opportunity_score: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            min_opportunity_score: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub topic: String,
    pub product: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            topic: "TOEFL".to_string(),
            product: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
}

impl ScoutConfig {
    /// Read the file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        info!(
            "Loaded configuration from {}: {} sources, ttl {} days",
            path.display(),
            config.reddit.subreddits.len(),
            config.database.ttl_days
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// `lookup` is injected so tests do not depend on the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(user_agent) = present(ENV_USER_AGENT) {
            debug!("Overriding user agent from {}", ENV_USER_AGENT);
            self.reddit.user_agent = user_agent;
        }
        if let Some(key) = present(ENV_GEMINI_API_KEY) {
            self.gemini.api_key = Some(key);
        }
        if let Some(url) = present(ENV_DISCORD_WEBHOOK_URL) {
            self.discord.webhook_url = Some(url);
        }
        if let Some(path) = present(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit.subreddits.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                field: "reddit.subreddits".to_string(),
            });
        }
        if self.reddit.post_limit < STRATEGY_COUNT {
            return Err(ConfigError::InvalidValue {
                field: "reddit.post_limit".to_string(),
                value: self.reddit.post_limit.to_string(),
            });
        }
        if self.output.top_n == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.top_n".to_string(),
                value: "0".to_string(),
            });
        }
        if self.gemini.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: ENV_GEMINI_API_KEY.to_string(),
            });
        }
        if self.discord.webhook_url.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: ENV_DISCORD_WEBHOOK_URL.to_string(),
            });
        }
        Ok(())
    }
}
