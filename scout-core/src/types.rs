use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body text the forum substitutes for removed or deleted content.
pub const DELETION_PLACEHOLDERS: [&str; 2] = ["[deleted]", "[removed]"];

/// Author name used when the payload carries none.
pub const DELETED_AUTHOR: &str = "[deleted]";

pub fn is_deletion_placeholder(body: &str) -> bool {
    DELETION_PLACEHOLDERS.contains(&body)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    /// Community the post was fetched from.
    pub source: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub is_original_content: bool,
    pub flair: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub parent_id: String,
    pub source_item_id: String,
    pub source_item_title: String,
    pub source: String,
    pub url: String,
    pub is_original_poster: bool,
    /// Number of ancestor comments; 0 is a top-level reply to the post.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Post(Post),
    Comment(Comment),
}

impl Item {
    pub fn id(&self) -> &str {
        match self {
            Item::Post(post) => &post.id,
            Item::Comment(comment) => &comment.id,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Item::Post(post) => &post.source,
            Item::Comment(comment) => &comment.source,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Item::Post(post) => post.created_at,
            Item::Comment(comment) => comment.created_at,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Item::Post(post) => &post.url,
            Item::Comment(comment) => &comment.url,
        }
    }
}

impl From<Post> for Item {
    fn from(post: Post) -> Self {
        Item::Post(post)
    }
}

impl From<Comment> for Item {
    fn from(comment: Comment) -> Self {
        Item::Comment(comment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub item_id: String,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplySuggestion {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub draft: String,
    #[serde(default)]
    pub why: String,
}

/// Structured verdict returned by the scoring collaborator for one item.
///
/// Posts and comments are scored with different prompts, so the wire names of
/// a few fields differ; the aliases accept both shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default, alias = "is_help_seeking", alias = "is_valuable_comment")]
    pub qualifies: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default, alias = "topic", alias = "opportunity_type")]
    pub category: String,
    #[serde(default)]
    pub product_fit: Option<String>,
    #[serde(default, alias = "reply_candidates", alias = "reply_strategy")]
    pub reply_suggestions: Vec<ReplySuggestion>,
    #[serde(default)]
    pub reason: String,
}

/// An item paired with its analysis. Built fresh from both halves; the
/// original item is never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem<T> {
    pub item: T,
    pub analysis: Analysis,
}

impl<T> ScoredItem<T> {
    pub fn new(item: T, analysis: Analysis) -> Self {
        Self { item, analysis }
    }

    pub fn score(&self) -> f64 {
        self.analysis.score
    }
}
