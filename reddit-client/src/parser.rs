//! Normalizes the forum's `{kind, data}` envelopes into [`Post`] and
//! [`Comment`] records.
//!
//! Children are decoded one at a time: a malformed entry is dropped with a
//! debug log and never takes the rest of its listing down with it.

use chrono::{DateTime, TimeZone, Utc};
use scout_core::{Comment, Post, DELETED_AUTHOR};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const KIND_COMMENT: &str = "t1";
pub const KIND_POST: &str = "t3";

const PERMALINK_HOST: &str = "https://reddit.com";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("entry is not a {{kind, data}} envelope")]
    NotAnEnvelope,

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(f64),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// The `kind` tag of a `{kind, data}` envelope.
///
/// Only the tag is read; the `data` subtree is left in place, so a deeply
/// nested reply chain is never copied or walked recursively here.
pub fn envelope_kind(value: &Value) -> Result<&str, ParseError> {
    value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(ParseError::NotAnEnvelope)
}

// Every field is optional on the wire; defaults are applied in conversion.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPostData {
    id: Option<String>,
    title: Option<String>,
    selftext: Option<String>,
    author: Option<String>,
    subreddit: Option<String>,
    score: Option<i64>,
    upvote_ratio: Option<f64>,
    num_comments: Option<u64>,
    created_utc: Option<f64>,
    permalink: Option<String>,
    is_self: Option<bool>,
    link_flair_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCommentData {
    id: Option<String>,
    body: Option<String>,
    author: Option<String>,
    score: Option<i64>,
    created_utc: Option<f64>,
    parent_id: Option<String>,
    permalink: Option<String>,
    is_submitter: Option<bool>,
}

/// Children of a listing envelope, or `None` when the payload has no listing shape.
pub fn listing_children(payload: &Value) -> Option<&Vec<Value>> {
    payload.get("data")?.get("children")?.as_array()
}

/// Parses every `t3` child of a listing payload. Other kinds are skipped silently.
///
/// `source` is the community the listing was fetched from; it fills in for
/// entries whose `subreddit` field is missing or empty.
pub fn parse_posts(payload: &Value, source: &str) -> Vec<Post> {
    let Some(children) = listing_children(payload) else {
        if !payload.is_null() {
            debug!("Listing payload has no children array");
        }
        return Vec::new();
    };

    let mut posts = Vec::with_capacity(children.len());
    for child in children {
        match envelope_kind(child) {
            Ok(KIND_POST) => match child.get("data").map(parse_post) {
                Some(Ok(mut post)) => {
                    if post.source.is_empty() {
                        post.source = source.to_string();
                    }
                    posts.push(post);
                }
                Some(Err(e)) => debug!("Dropping malformed post entry: {}", e),
                None => debug!("Dropping post entry without data"),
            },
            Ok(_) => {}
            Err(e) => debug!("Dropping listing child: {}", e),
        }
    }
    posts
}

/// Converts the `data` object of a `t3` envelope.
pub fn parse_post(data: &Value) -> Result<Post, ParseError> {
    let raw = RawPostData::deserialize(data).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let id = required_id(raw.id)?;

    Ok(Post {
        id,
        title: raw.title.unwrap_or_default(),
        body: raw.selftext.unwrap_or_default(),
        author: raw.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        source: raw.subreddit.unwrap_or_default(),
        score: raw.score.unwrap_or(0),
        upvote_ratio: raw.upvote_ratio.unwrap_or(0.0),
        comment_count: raw.num_comments.unwrap_or(0),
        created_at: epoch_seconds(raw.created_utc.unwrap_or(0.0))?,
        url: permalink_url(raw.permalink.as_deref()),
        is_original_content: raw.is_self.unwrap_or(true),
        flair: raw.link_flair_text.unwrap_or_default(),
    })
}

/// Converts the `data` object of a `t1` envelope. `depth` is supplied by the
/// caller's walk; any depth carried in the payload is ignored.
pub fn parse_comment(data: &Value, parent: &Post, depth: u32) -> Result<Comment, ParseError> {
    let raw =
        RawCommentData::deserialize(data).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let id = required_id(raw.id)?;

    Ok(Comment {
        id,
        body: raw.body.unwrap_or_default(),
        author: raw.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        score: raw.score.unwrap_or(0),
        created_at: epoch_seconds(raw.created_utc.unwrap_or(0.0))?,
        parent_id: raw.parent_id.unwrap_or_default(),
        source_item_id: parent.id.clone(),
        source_item_title: parent.title.clone(),
        source: parent.source.clone(),
        url: permalink_url(raw.permalink.as_deref()),
        is_original_poster: raw.is_submitter.unwrap_or(false),
        depth,
    })
}

/// The reply listing of an item-plus-replies response.
///
/// The endpoint answers with `[item_listing, reply_listing]`; anything else
/// yields `None`.
pub fn parse_comment_root(payload: &Value) -> Option<&Value> {
    match payload.as_array()?.as_slice() {
        [_, replies, ..] if replies.is_object() => Some(replies),
        _ => None,
    }
}

/// The nested listing under a comment's `replies`. The API uses an empty string
/// for "no replies", so anything that is not an object ends the branch.
pub fn replies_listing(comment_thing: &Value) -> Option<&Value> {
    comment_thing
        .get("data")?
        .get("replies")
        .filter(|replies| replies.is_object())
}

fn required_id(id: Option<String>) -> Result<String, ParseError> {
    id.filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingField("id"))
}

fn epoch_seconds(seconds: f64) -> Result<DateTime<Utc>, ParseError> {
    if !seconds.is_finite() {
        return Err(ParseError::InvalidTimestamp(seconds));
    }
    Utc.timestamp_opt(seconds.trunc() as i64, 0)
        .single()
        .ok_or(ParseError::InvalidTimestamp(seconds))
}

fn permalink_url(permalink: Option<&str>) -> String {
    format!("{}{}", PERMALINK_HOST, permalink.unwrap_or_default())
}
