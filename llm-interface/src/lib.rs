pub mod gemini;
pub mod prompts;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_core::{Analysis, CoreError, Item};

pub use gemini::GeminiScorer;

/// Assigns an opportunity score and reply suggestions to one item.
///
/// Failures are per item; callers skip the item and keep going.
#[async_trait]
pub trait OpportunityScorer: Send + Sync {
    async fn score(&self, item: &Item, now: DateTime<Utc>) -> Result<Analysis, CoreError>;
}

/// Pulls the JSON body out of a model reply, dropping a surrounding markdown
/// code fence if there is one.
pub fn extract_json_block(reply: &str) -> &str {
    let trimmed = reply.trim();

    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[open + 3..];
    // Skip the language tag on the opening fence line.
    let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
    let body = &after_fence[body_start..];

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}
