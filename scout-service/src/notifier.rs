use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_core::{Comment, CoreError, Post, ScoredItem};

/// The ranked slate handed to the notifier once per run.
#[derive(Debug, Clone)]
pub struct Digest {
    pub posts: Vec<ScoredItem<Post>>,
    pub comments: Vec<ScoredItem<Comment>>,
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.comments.is_empty()
    }
}

/// Outbound delivery channel.
///
/// `Ok` means every part of the digest was accepted. Implementations own
/// their payload chunking and rendering.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, digest: &Digest) -> Result<(), CoreError>;
}
