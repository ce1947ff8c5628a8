//! Discord webhook delivery and the plain-text digest layout it sends.

use crate::notifier::{Digest, Notifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use scout_core::{
    Analysis, Comment, ConfigError, CoreError, DiscordConfig, NotifyError, Post, ReplySuggestion,
};
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info};

/// Discord caps messages at 2000 characters; leave room for markup.
pub const MAX_CHUNK_CHARS: usize = 1900;
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const COMMENT_PREVIEW_CHARS: usize = 150;
const TITLE_PREVIEW_CHARS: usize = 60;

pub struct DiscordNotifier {
    http_client: Client,
    webhook_url: String,
    max_chunk_chars: usize,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            webhook_url,
            max_chunk_chars: MAX_CHUNK_CHARS,
        })
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self, CoreError> {
        let webhook_url = config
            .webhook_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "discord.webhook_url".to_string(),
            })?;
        Self::new(webhook_url)
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    async fn post_chunk(&self, chunk: &str, index: usize, total: usize) -> Result<(), CoreError> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&json!({ "content": chunk }))
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed {
                chunk: index,
                total,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                chunk: index,
                total,
                status_code: status.as_u16(),
            }
            .into());
        }

        debug!("Delivered chunk {}/{}", index, total);
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, digest: &Digest) -> Result<(), CoreError> {
        let message = render_digest(digest);
        let chunks = split_message(&message, self.max_chunk_chars);
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            self.post_chunk(chunk, i + 1, total).await?;
        }

        info!(
            "Sent Discord report: {} posts, {} comments in {} messages",
            digest.posts.len(),
            digest.comments.len(),
            total
        );
        Ok(())
    }
}

/// Renders the digest as markdown text. Times are relative to `generated_at`.
pub fn render_digest(digest: &Digest) -> String {
    let now = digest.generated_at;
    let mut out = String::new();

    let _ = writeln!(out, "**Reddit opportunity digest** ({})", now.format("%Y-%m-%d"));
    let _ = writeln!(
        out,
        "{} posts and {} comments worth a reply",
        digest.posts.len(),
        digest.comments.len()
    );

    if !digest.posts.is_empty() {
        out.push_str("\n**Top posts**\n\n");
        for (rank, scored) in digest.posts.iter().enumerate() {
            render_post(&mut out, rank + 1, &scored.item, &scored.analysis, now);
            out.push_str("\n---\n\n");
        }
    }

    if !digest.comments.is_empty() {
        out.push_str("\n**Top comments**\n\n");
        for (rank, scored) in digest.comments.iter().enumerate() {
            render_comment(&mut out, rank + 1, &scored.item, &scored.analysis, now);
            out.push_str("\n---\n\n");
        }
    }

    out.push_str("End of digest.");
    out
}

fn render_post(out: &mut String, rank: usize, post: &Post, analysis: &Analysis, now: DateTime<Utc>) {
    let _ = writeln!(out, "**#{} | score {:.1}/10**", rank, analysis.score);
    let _ = writeln!(out, "**{}** (r/{})", post.title, post.source);
    let _ = writeln!(out, "Topic: {}", label_or(&analysis.category, "General"));
    let _ = writeln!(
        out,
        "Engagement: {} upvotes, {} comments",
        post.score, post.comment_count
    );
    let _ = writeln!(out, "Posted: {}", format_time_ago(post.created_at, now));
    let _ = writeln!(
        out,
        "Product fit: {}",
        analysis.product_fit.as_deref().unwrap_or("unknown")
    );
    render_suggestions(out, &analysis.reply_suggestions);
    let _ = writeln!(out, "Link: {}", post.url);
}

fn render_comment(
    out: &mut String,
    rank: usize,
    comment: &Comment,
    analysis: &Analysis,
    now: DateTime<Utc>,
) {
    let _ = writeln!(out, "**#{} | score {:.1}/10**", rank, analysis.score);
    let _ = writeln!(
        out,
        "On post: \"{}\"",
        preview(&comment.source_item_title, TITLE_PREVIEW_CHARS)
    );
    let _ = writeln!(
        out,
        "Comment: \"{}\"",
        preview(&comment.body, COMMENT_PREVIEW_CHARS)
    );
    let _ = writeln!(out, "Author: u/{} ({} upvotes)", comment.author, comment.score);
    let _ = writeln!(out, "Posted: {}", format_time_ago(comment.created_at, now));
    let _ = writeln!(out, "Opportunity: {}", label_or(&analysis.category, "reply"));
    render_suggestions(out, &analysis.reply_suggestions);
    let _ = writeln!(out, "Link: {}", comment.url);
}

fn render_suggestions(out: &mut String, suggestions: &[ReplySuggestion]) {
    if suggestions.is_empty() {
        return;
    }

    out.push_str("\nReply drafts:\n");
    for (i, suggestion) in suggestions.iter().enumerate() {
        let style = if suggestion.style.is_empty() {
            format!("Option {}", i + 1)
        } else {
            suggestion.style.clone()
        };
        let _ = writeln!(out, "{}. {} ({})", i + 1, style, suggestion.tone);
        if !suggestion.why.is_empty() {
            let _ = writeln!(out, "Why: {}", suggestion.why);
        }
        let _ = writeln!(out, "```\n{}\n```", suggestion.draft);
    }
}

fn label_or<'a>(label: &'a str, fallback: &'a str) -> &'a str {
    if label.trim().is_empty() {
        fallback
    } else {
        label
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// "5 mins ago", "1 hour ago", "3 days ago".
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - then).num_seconds().max(0);
    let (value, unit) = if elapsed < 3600 {
        (elapsed / 60, "min")
    } else if elapsed < 86_400 {
        (elapsed / 3600, "hour")
    } else {
        (elapsed / 86_400, "day")
    };
    let plural = if value == 1 { "" } else { "s" };
    format!("{value} {unit}{plural} ago")
}

/// Separator written between digest entries.
const ENTRY_BREAK: &str = "\n---\n";

/// Splits `message` into pieces of at most `max_chars` characters.
///
/// Pieces break after entry separators where possible so a reply-draft fence
/// never straddles two messages; an entry longer than the limit falls back to
/// line boundaries. Concatenating the pieces gives back the original message.
pub fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for entry in entries(message) {
        let entry_chars = entry.chars().count();
        if current_chars + entry_chars <= max_chars {
            current.push_str(entry);
            current_chars += entry_chars;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if entry_chars <= max_chars {
            current.push_str(entry);
            current_chars = entry_chars;
            continue;
        }

        let mut pieces = split_lines(entry, max_chars);
        if let Some(last) = pieces.pop() {
            chunks.extend(pieces);
            current_chars = last.chars().count();
            current = last;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Slices of `message`, each ending just after an entry separator.
fn entries(message: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut rest = message;
    while let Some(pos) = rest.find(ENTRY_BREAK) {
        let (entry, tail) = rest.split_at(pos + ENTRY_BREAK.len());
        entries.push(entry);
        rest = tail;
    }
    if !rest.is_empty() {
        entries.push(rest);
    }
    entries
}

fn split_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if current_chars + line_chars <= max_chars {
            current.push_str(line);
            current_chars += line_chars;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if line_chars <= max_chars {
            current.push_str(line);
            current_chars = line_chars;
            continue;
        }

        // A single line longer than the limit is cut at character boundaries.
        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(max_chars).peekable();
        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            if pieces.peek().is_some() {
                chunks.push(piece);
            } else {
                current_chars = piece.chars().count();
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use scout_core::ScoredItem;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn digest() -> Digest {
        let post = Post {
            id: "p1".to_string(),
            title: "Reading timing help".to_string(),
            body: String::new(),
            author: "learner".to_string(),
            source: "TOEFL".to_string(),
            score: 21,
            upvote_ratio: 1.0,
            comment_count: 4,
            created_at: now() - Duration::hours(5),
            url: "https://reddit.com/r/TOEFL/comments/p1/".to_string(),
            is_original_content: true,
            flair: String::new(),
        };
        let analysis = Analysis {
            qualifies: true,
            score: 8.4,
            category: "Reading".to_string(),
            product_fit: Some("high".to_string()),
            reply_suggestions: vec![ReplySuggestion {
                style: String::new(),
                tone: "friendly".to_string(),
                draft: "Skim first, then answer.".to_string(),
                why: "Concrete".to_string(),
            }],
            reason: String::new(),
        };

        Digest {
            posts: vec![ScoredItem::new(post, analysis)],
            comments: Vec::new(),
            generated_at: now(),
        }
    }

    #[test]
    fn test_render_digest() {
        let text = render_digest(&digest());
        assert!(text.starts_with("**Reddit opportunity digest** (2024-03-10)"));
        assert!(text.contains("**#1 | score 8.4/10**"));
        assert!(text.contains("**Reading timing help** (r/TOEFL)"));
        assert!(text.contains("Engagement: 21 upvotes, 4 comments"));
        assert!(text.contains("Posted: 5 hours ago"));
        assert!(text.contains("1. Option 1 (friendly)"));
        assert!(text.contains("```\nSkim first, then answer.\n```"));
        assert!(!text.contains("**Top comments**"));
    }

    #[test]
    fn test_format_time_ago() {
        assert_eq!(format_time_ago(now() - Duration::seconds(30), now()), "0 mins ago");
        assert_eq!(format_time_ago(now() - Duration::minutes(1), now()), "1 min ago");
        assert_eq!(format_time_ago(now() - Duration::minutes(61), now()), "1 hour ago");
        assert_eq!(format_time_ago(now() - Duration::hours(49), now()), "2 days ago");
        assert_eq!(format_time_ago(now() + Duration::hours(1), now()), "0 mins ago");
    }

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(split_message("hello\nworld", 1900), vec!["hello\nworld"]);
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let message = format!("{}\n{}\n{}", "a".repeat(8), "b".repeat(8), "c".repeat(3));
        let chunks = split_message(&message, 10);
        assert_eq!(chunks, vec!["aaaaaaaa\n", "bbbbbbbb\n", "ccc"]);
    }

    #[test]
    fn test_oversized_line_is_cut() {
        let message = format!("short\n{}\nend", "x".repeat(25));
        let chunks = split_message(&message, 10);

        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), message);
    }

    #[test]
    fn test_long_digest_chunks_fit_limit() {
        let mut big = digest();
        let template = big.posts[0].clone();
        big.posts = (0..40).map(|_| template.clone()).collect();

        let message = render_digest(&big);
        let chunks = split_message(&message, MAX_CHUNK_CHARS);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
        assert_eq!(chunks.concat(), message);
    }

    #[test]
    fn test_chunks_break_between_entries() {
        let mut big = digest();
        let template = big.posts[0].clone();
        big.posts = (0..12).map(|_| template.clone()).collect();

        let message = render_digest(&big);
        // Room for a little over two entries, so a line-based split would
        // land inside an entry.
        let entry_chars = entries(&message)[1].chars().count();
        let limit = entry_chars * 2 + entry_chars / 2;
        let chunks = split_message(&message, limit);

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), message);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with(ENTRY_BREAK), "chunk ends mid-entry: {chunk:?}");
        }
        for chunk in &chunks {
            assert!(chunk.chars().count() <= limit);
            assert_eq!(chunk.matches("```").count() % 2, 0, "unbalanced fence: {chunk:?}");
        }
    }

    #[test]
    fn test_missing_webhook_is_config_error() {
        let err = DiscordNotifier::from_config(&DiscordConfig { webhook_url: None })
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Config(_)));
    }

    /// Answers `statuses.len()` connections in order and returns the request bodies.
    async fn webhook(statuses: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut bodies = Vec::new();
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                        let length = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if request.len() >= end + 4 + length {
                            bodies.push(String::from_utf8_lossy(&request[end + 4..]).to_string());
                            break;
                        }
                    }
                }

                let response =
                    format!("{status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            bodies
        });

        (format!("http://{addr}/webhook"), handle)
    }

    #[tokio::test]
    async fn test_deliver_posts_every_chunk() {
        let expected = split_message(&render_digest(&digest()), 250).len();
        assert!(expected >= 2);

        let (url, server) = webhook(vec!["HTTP/1.1 204 No Content"; expected]).await;
        let notifier = DiscordNotifier::new(url).unwrap().with_max_chunk_chars(250);
        notifier.deliver(&digest()).await.unwrap();

        let bodies = server.await.unwrap();
        assert_eq!(bodies.len(), expected);
        let first: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert!(first["content"]
            .as_str()
            .unwrap()
            .starts_with("**Reddit opportunity digest**"));
    }

    #[tokio::test]
    async fn test_rejected_chunk_fails_delivery() {
        let (url, server) = webhook(vec!["HTTP/1.1 400 Bad Request"]).await;
        let notifier = DiscordNotifier::new(url).unwrap();

        let err = notifier.deliver(&digest()).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Notify(NotifyError::Rejected { chunk: 1, total: 1, status_code: 400 })
        ));
        server.await.unwrap();
    }
}
