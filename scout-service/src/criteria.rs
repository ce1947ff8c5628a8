use scout_core::{is_deletion_placeholder, Comment, FilterConfig, Post};

/// Engagement and keyword gate applied to posts after dedup filtering.
#[derive(Debug, Clone)]
pub struct PostCriteria {
    pub min_upvotes: i64,
    pub min_comments: u64,
    /// Lowercased; empty means no keyword requirement.
    keywords: Vec<String>,
}

impl PostCriteria {
    pub fn new(min_upvotes: i64, min_comments: u64, keywords: &[String]) -> Self {
        Self {
            min_upvotes,
            min_comments,
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(filters: &FilterConfig) -> Self {
        Self::new(filters.min_upvotes, filters.min_comments, &filters.keywords)
    }

    pub fn accepts(&self, post: &Post) -> bool {
        if post.score < self.min_upvotes || post.comment_count < self.min_comments {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }

        let text = format!("{} {}", post.title, post.body).to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct CommentCriteria {
    pub min_score: i64,
    /// Minimum body length in characters.
    pub min_length: usize,
}

impl CommentCriteria {
    pub fn from_config(filters: &FilterConfig) -> Self {
        Self {
            min_score: filters.min_comment_score,
            min_length: filters.min_comment_length,
        }
    }

    pub fn accepts(&self, comment: &Comment) -> bool {
        comment.score >= self.min_score
            && comment.body.chars().count() >= self.min_length
            && !is_deletion_placeholder(comment.body.trim())
    }
}
