use chrono::{DateTime, Utc};
use scout_core::{Comment, Item, Post};

/// Characters of body text included in a prompt.
pub const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct PromptContext {
    /// Subject-matter label, e.g. the exam the communities discuss.
    pub topic: String,
    /// Product to mention in drafts where it fits naturally.
    pub product: Option<String>,
}

impl PromptContext {
    pub fn build(&self, item: &Item, now: DateTime<Utc>) -> String {
        match item {
            Item::Post(post) => self.post_prompt(post, now),
            Item::Comment(comment) => self.comment_prompt(comment, now),
        }
    }

    fn post_prompt(&self, post: &Post, now: DateTime<Utc>) -> String {
        format!(
            r#"Analyze this {topic}-related Reddit post for a reply opportunity:

**Post Title:** {title}
**Subreddit:** r/{source}
**Content:** {body}
**Upvotes:** {score}
**Comments:** {comments}
**Posted:** {hours:.1} hours ago

Your task:
1. Decide whether this is a genuine help-seeking post (not spam, meme or off-topic)
2. Identify the {topic} topic
3. Score the reply opportunity from 1 to 10
4. Write 2-3 reply drafts with different approaches

Scoring criteria:
- Post quality: specific and detailed question (0-3 points)
- Engagement potential: upvote and comment activity (0-2 points)
- Recency: fresh posts get more visibility (0-2 points)
- Product fit: {fit} (0-3 points)

Return ONLY valid JSON in this format:
{{
  "is_help_seeking": true,
  "topic": "Reading/Listening/Speaking/Writing/General",
  "score": 8.5,
  "product_fit": "high/medium/low",
  "reply_candidates": [
    {{"style": "Expert Mentor", "tone": "professional", "draft": "100-200 word reply", "why": "why this approach works"}}
  ],
  "reason": "brief explanation of the score"
}}

All output must be in English. Each draft must be ready to copy and paste.{mention}"#,
            topic = self.topic,
            title = post.title,
            source = post.source,
            body = excerpt(&post.body),
            score = post.score,
            comments = post.comment_count,
            hours = hours_since(post.created_at, now),
            fit = self.fit_question(),
            mention = self.mention_line(),
        )
    }

    fn comment_prompt(&self, comment: &Comment, now: DateTime<Utc>) -> String {
        format!(
            r#"Analyze this {topic}-related Reddit comment for a reply opportunity:

**Original Post:** {post_title}
**Comment by:** u/{author}
**Comment:** {body}
**Upvotes:** {score}
**Depth:** {depth} (0 = top-level)
**Posted:** {hours:.1} hours ago

Your task:
1. Evaluate the comment quality (helpful, accurate, complete?)
2. Identify the reply opportunity (gap, misconception, addition)
3. Score the opportunity from 1 to 10
4. Write 2-3 reply drafts with different approaches

Scoring criteria:
- Quality gap: incomplete or inaccurate advice (0-3 points)
- Engagement: upvotes mean visibility (0-2 points)
- Recency: fresh comments mean better timing (0-2 points)
- Value-add potential: {fit} (0-3 points)

Return ONLY valid JSON in this format:
{{
  "is_valuable_comment": true,
  "opportunity_type": "supplement/correct/alternative/disagree",
  "score": 7.8,
  "product_fit": "high/medium/low",
  "reply_candidates": [
    {{"style": "Agree & Expand", "tone": "agreeable", "draft": "80-150 word reply", "why": "why this approach works"}}
  ],
  "reason": "brief explanation of the score"
}}

All output must be in English. Reference the original comment naturally.{mention}"#,
            topic = self.topic,
            post_title = comment.source_item_title,
            author = comment.author,
            body = excerpt(&comment.body),
            score = comment.score,
            depth = comment.depth,
            hours = hours_since(comment.created_at, now),
            fit = self.fit_question(),
            mention = self.mention_line(),
        )
    }

    fn fit_question(&self) -> String {
        match &self.product {
            Some(product) => format!("can {product} be mentioned naturally?"),
            None => "can we add unique, practical insight?".to_string(),
        }
    }

    fn mention_line(&self) -> String {
        match &self.product {
            Some(product) => format!("\nMention {product} only where it fits naturally."),
            None => String::new(),
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

fn hours_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_seconds().max(0) as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn post(body: &str) -> Post {
        Post {
            id: "p1".to_string(),
            title: "How to pace the reading section?".to_string(),
            body: body.to_string(),
            author: "learner".to_string(),
            source: "TOEFL".to_string(),
            score: 14,
            upvote_ratio: 0.97,
            comment_count: 6,
            created_at: now() - Duration::minutes(90),
            url: String::new(),
            is_original_content: true,
            flair: String::new(),
        }
    }

    fn context(product: Option<&str>) -> PromptContext {
        PromptContext {
            topic: "TOEFL".to_string(),
            product: product.map(str::to_string),
        }
    }

    #[test]
    fn test_post_prompt_fields() {
        let prompt = context(None).build(&Item::Post(post("I run out of time.")), now());
        assert!(prompt.contains("TOEFL-related Reddit post"));
        assert!(prompt.contains("**Subreddit:** r/TOEFL"));
        assert!(prompt.contains("**Upvotes:** 14"));
        assert!(prompt.contains("**Posted:** 1.5 hours ago"));
        assert!(prompt.contains("\"is_help_seeking\""));
        assert!(!prompt.contains("Mention "));
    }

    #[test]
    fn test_product_is_woven_in() {
        let prompt = context(Some("StudyPal")).build(&Item::Post(post("")), now());
        assert!(prompt.contains("can StudyPal be mentioned naturally?"));
        assert!(prompt.contains("Mention StudyPal only where it fits naturally."));
    }

    #[test]
    fn test_body_is_truncated_on_char_boundary() {
        let long = "é".repeat(EXCERPT_CHARS + 100);
        let prompt = context(None).build(&Item::Post(post(&long)), now());
        assert!(prompt.contains(&"é".repeat(EXCERPT_CHARS)));
        assert!(!prompt.contains(&"é".repeat(EXCERPT_CHARS + 1)));
    }

    #[test]
    fn test_comment_prompt_fields() {
        let comment = Comment {
            id: "c1".to_string(),
            body: "Skim the first sentence of every paragraph.".to_string(),
            author: "helper".to_string(),
            score: 9,
            created_at: now() - Duration::hours(3),
            parent_id: "t3_p1".to_string(),
            source_item_id: "p1".to_string(),
            source_item_title: "How to pace the reading section?".to_string(),
            source: "TOEFL".to_string(),
            url: String::new(),
            is_original_poster: false,
            depth: 1,
        };

        let prompt = context(None).build(&Item::Comment(comment), now());
        assert!(prompt.contains("**Original Post:** How to pace the reading section?"));
        assert!(prompt.contains("**Comment by:** u/helper"));
        assert!(prompt.contains("**Depth:** 1 (0 = top-level)"));
        assert!(prompt.contains("**Posted:** 3.0 hours ago"));
        assert!(prompt.contains("\"is_valuable_comment\""));
    }
}
