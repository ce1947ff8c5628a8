use crate::api::{JsonFetcher, RedditEndpoints};
use crate::parser::{self, KIND_COMMENT};
use scout_core::{is_deletion_placeholder, Comment, ErrorExt, Post};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-node inclusion rule applied during the walk.
#[derive(Debug, Clone)]
pub struct CommentFilter {
    pub min_score: i64,
}

impl CommentFilter {
    pub fn new(min_score: i64) -> Self {
        Self { min_score }
    }

    pub fn accepts(&self, comment: &Comment) -> bool {
        comment.score >= self.min_score
            && !comment.body.trim().is_empty()
            && !is_deletion_placeholder(comment.body.trim())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenStats {
    pub visited: usize,
    pub emitted: usize,
    pub rejected: usize,
    pub malformed: usize,
    pub max_depth: u32,
}

/// Flattens a reply tree into depth-first, sibling-ordered records.
///
/// Rejection is per node: a comment that fails the filter is not emitted, but
/// its replies are still walked. The walk uses an explicit stack, so payload
/// depth cannot exhaust the call stack.
#[derive(Debug, Clone)]
pub struct CommentTreeFlattener {
    filter: CommentFilter,
}

impl CommentTreeFlattener {
    pub fn new(filter: CommentFilter) -> Self {
        Self { filter }
    }

    pub fn flatten(&self, replies: &Value, post: &Post) -> Vec<Comment> {
        self.flatten_with_stats(replies, post).0
    }

    pub fn flatten_with_stats(&self, replies: &Value, post: &Post) -> (Vec<Comment>, FlattenStats) {
        let mut comments = Vec::new();
        let mut stats = FlattenStats::default();

        let Some(top_level) = parser::listing_children(replies) else {
            return (comments, stats);
        };

        let mut stack: Vec<(std::slice::Iter<'_, Value>, u32)> = vec![(top_level.iter(), 0)];

        loop {
            let next = match stack.last_mut() {
                Some((siblings, depth)) => siblings.next().map(|node| (node, *depth)),
                None => break,
            };
            let Some((node, depth)) = next else {
                stack.pop();
                continue;
            };

            // "more" placeholders and foreign kinds carry nothing to walk.
            if parser::envelope_kind(node) != Ok(KIND_COMMENT) {
                continue;
            }

            stats.visited += 1;
            stats.max_depth = stats.max_depth.max(depth);

            match node.get("data").map(|data| parser::parse_comment(data, post, depth)) {
                Some(Ok(comment)) if self.filter.accepts(&comment) => {
                    stats.emitted += 1;
                    comments.push(comment);
                }
                Some(Ok(_)) => stats.rejected += 1,
                Some(Err(e)) => {
                    stats.malformed += 1;
                    debug!("Dropping malformed comment under {}: {}", post.id, e);
                }
                None => stats.malformed += 1,
            }

            if let Some(children) = parser::replies_listing(node).and_then(parser::listing_children) {
                stack.push((children.iter(), depth + 1));
            }
        }

        (comments, stats)
    }
}

/// Fetches each post's reply tree and flattens it.
pub struct CommentHarvester {
    fetcher: Arc<dyn JsonFetcher>,
    endpoints: RedditEndpoints,
    flattener: CommentTreeFlattener,
    limit: u32,
}

impl CommentHarvester {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        endpoints: RedditEndpoints,
        flattener: CommentTreeFlattener,
        limit: u32,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            flattener,
            limit,
        }
    }

    /// A post whose thread cannot be fetched or parsed is skipped; the rest continue.
    pub async fn harvest(&self, posts: &[Post]) -> Vec<Comment> {
        let mut all_comments = Vec::new();

        for post in posts {
            let url = match self.endpoints.item_with_replies(&post.source, &post.id, self.limit) {
                Ok(url) => url,
                Err(e) => {
                    e.log_warn();
                    continue;
                }
            };

            let Some(payload) = self.fetcher.fetch_json(&url).await else {
                continue;
            };
            let Some(replies) = parser::parse_comment_root(&payload) else {
                warn!("Post {}: reply listing missing from response", post.id);
                continue;
            };

            let (comments, stats) = self.flattener.flatten_with_stats(replies, post);
            debug!(
                "Post {}: {} comments above threshold ({} visited, {} rejected, depth {})",
                post.id, stats.emitted, stats.visited, stats.rejected, stats.max_depth
            );
            all_comments.extend(comments);
        }

        info!("Total comments fetched: {}", all_comments.len());
        all_comments
    }
}
