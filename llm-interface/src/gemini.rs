use crate::prompts::PromptContext;
use crate::{extract_json_block, OpportunityScorer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use scout_core::{Analysis, ConfigError, CoreError, GeminiConfig, Item, LlmError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const PROVIDER: &str = "gemini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Scores items through the Gemini `generateContent` REST endpoint.
#[derive(Debug)]
pub struct GeminiScorer {
    http_client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    base_url: String,
    prompts: PromptContext,
}

impl GeminiScorer {
    pub fn from_config(config: &GeminiConfig) -> Result<Self, CoreError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "gemini.api_key".to_string(),
            })?;

        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            base_url: GEMINI_API_BASE.to_string(),
            prompts: PromptContext {
                topic: config.topic.clone(),
                product: config.product.clone(),
            },
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn generate(&self, prompt: &str) -> Result<String, CoreError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::InvalidApiKey {
                provider: PROVIDER.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(LlmError::ServiceUnavailable {
                provider: PROVIDER.to_string(),
                status_code: status.as_u16(),
            }
            .into());
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
                details: e.to_string(),
            }
        })?;

        body.text().ok_or_else(|| {
            LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
                details: "response carried no candidate text".to_string(),
            }
            .into()
        })
    }
}

fn transport_error(e: reqwest::Error) -> CoreError {
    if e.is_timeout() {
        LlmError::RequestTimeout {
            provider: PROVIDER.to_string(),
        }
        .into()
    } else {
        CoreError::Network(e)
    }
}

/// Decodes the model's reply text into an [`Analysis`].
pub fn parse_analysis(reply: &str) -> Result<Analysis, CoreError> {
    serde_json::from_str(extract_json_block(reply)).map_err(|e| {
        LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
            details: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl OpportunityScorer for GeminiScorer {
    async fn score(&self, item: &Item, now: DateTime<Utc>) -> Result<Analysis, CoreError> {
        let prompt = self.prompts.build(item, now);
        let reply = self.generate(&prompt).await?;
        let analysis = parse_analysis(&reply)?;
        debug!("Item {} scored {:.1}", item.id(), analysis.score);
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use scout_core::Post;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(api_key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            api_key: api_key.map(str::to_string),
            ..GeminiConfig::default()
        }
    }

    fn item() -> Item {
        Item::Post(Post {
            id: "p1".to_string(),
            title: "Speaking template?".to_string(),
            body: "Any structure for task 1?".to_string(),
            author: "learner".to_string(),
            source: "TOEFL".to_string(),
            score: 8,
            upvote_ratio: 1.0,
            comment_count: 3,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            url: String::new(),
            is_original_content: true,
            flair: String::new(),
        })
    }

    /// Replies to one request with `status` and `body`, returning the request text.
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "{status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = GeminiScorer::from_config(&config(None)).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(GeminiScorer::from_config(&config(Some("  "))).is_err());
    }

    #[test]
    fn test_endpoint_uses_model() {
        let scorer = GeminiScorer::from_config(&config(Some("k")))
            .unwrap()
            .with_base_url("http://localhost:1234/");
        assert_eq!(
            scorer.endpoint(),
            "http://localhost:1234/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_parse_analysis_errors_are_typed() {
        let err = parse_analysis("I cannot help with that").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Llm(LlmError::InvalidResponseFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_score_round_trip() {
        let reply = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "```json\n{\"is_help_seeking\": true, \"topic\": \"Speaking\", \"score\": 8.0, \"reason\": \"clear ask\"}\n```"}]}
            }]
        });
        let (base, server) = serve_once("HTTP/1.1 200 OK", reply.to_string()).await;
        let scorer = GeminiScorer::from_config(&config(Some("secret")))
            .unwrap()
            .with_base_url(base);

        let analysis = scorer
            .score(&item(), Utc.timestamp_opt(1_700_003_600, 0).unwrap())
            .await
            .unwrap();
        assert!(analysis.qualifies);
        assert_eq!(analysis.category, "Speaking");
        assert_eq!(analysis.score, 8.0);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-1.5-flash:generateContent?key=secret"));
        assert!(request.contains("maxOutputTokens"));
        assert!(request.contains("Speaking template?"));
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let (base, server) = serve_once("HTTP/1.1 403 Forbidden", "{}".to_string()).await;
        let scorer = GeminiScorer::from_config(&config(Some("bad")))
            .unwrap()
            .with_base_url(base);

        let err = scorer.score(&item(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, CoreError::Llm(LlmError::InvalidApiKey { .. })));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"candidates": []}"#.to_string()).await;
        let scorer = GeminiScorer::from_config(&config(Some("k")))
            .unwrap()
            .with_base_url(base);

        let err = scorer.score(&item(), Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Llm(LlmError::InvalidResponseFormat { .. })
        ));
        server.await.unwrap();
    }
}
