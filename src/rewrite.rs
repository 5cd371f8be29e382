//! Digest rewriting through the OpenRouter chat-completions API.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{self, Rewrite};

/// Summary characters forwarded to the model.
const SUMMARY_LIMIT: usize = 400;

const SYSTEM_PROMPT: &str = "Отвечай по‑русски, сжато и фактологично.";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("rewrite service credential is missing")]
    MissingCredential,
    #[error("could not build rewrite request: {0}")]
    Request(String),
    #[error("rewrite request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rewrite service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed rewrite response: {0}")]
    Malformed(String),
}

/// Turns a feed item into a short publishable digest.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, title: &str, summary: &str, url: &str)
        -> Result<String, RewriteError>;
}

#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    referer: String,
    title: String,
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    pub fn from_config(http: Client, cfg: &Rewrite) -> anyhow::Result<Self> {
        let mut endpoint = cfg.endpoint.trim().to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base_url = Url::parse(&endpoint).context("invalid rewrite endpoint")?;
        Ok(Self {
            http,
            base_url,
            api_key: config::credential(&cfg.api_key).map(str::to_string),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            referer: cfg.referer.clone(),
            title: cfg.title.clone(),
        })
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn build_request(&self, api_key: &str, body: &Value) -> anyhow::Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("chat/completions")
            .context("invalid rewrite base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .build()
            .context("failed to build rewrite request")
    }

    pub fn build_body(&self, title: &str, summary: &str, url: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(title, summary, url) },
            ],
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl Rewriter for OpenRouterClient {
    #[instrument(skip_all, fields(url = %url))]
    async fn rewrite(
        &self,
        title: &str,
        summary: &str,
        url: &str,
    ) -> Result<String, RewriteError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RewriteError::MissingCredential)?;
        let body = self.build_body(title, summary, url);
        let request = self
            .build_request(api_key, &body)
            .map_err(|e| RewriteError::Request(format!("{:#}", e)))?;

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RewriteError::Status { status, body });
        }
        let text = res.text().await?;
        let digest = parse_completion(&text)?;
        debug!(chars = digest.chars().count(), "rewrite done");
        Ok(digest)
    }
}

/// Editorial instructions for one item: 300–400 characters, emoji lead, one
/// or two facts, trailing source line, nothing beyond title and summary.
pub fn build_prompt(title: &str, summary: &str, url: &str) -> String {
    let summary: String = summary.chars().take(SUMMARY_LIMIT).collect();
    format!(
        "Ты — редактор техно‑новостей. Сжато, 300–400 знаков.\n\
         Структура: короткий лид с эмодзи, 1–2 факта (чип/цена/дата), в конце \"Источник: {url}\".\n\
         Без домыслов, только из заголовка/анонса.\n\
         Заголовок: {title}\n\
         Анонс: {summary}"
    )
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Extract the first choice's text from a chat-completions response body.
pub fn parse_completion(body: &str) -> Result<String, RewriteError> {
    let payload: CompletionResponse =
        serde_json::from_str(body).map_err(|e| RewriteError::Malformed(e.to_string()))?;
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(RewriteError::Malformed("empty completion".into()));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_key: Option<&str>) -> OpenRouterClient {
        let cfg = Rewrite {
            api_key: api_key.map(String::from),
            endpoint: "https://openrouter.example/api/v1".into(),
            ..Rewrite::default()
        };
        OpenRouterClient::from_config(Client::new(), &cfg).unwrap()
    }

    #[test]
    fn prompt_truncates_summary_by_chars() {
        let summary = "я".repeat(500);
        let prompt = build_prompt("Заголовок", &summary, "https://x/a");
        assert!(prompt.contains("\"Источник: https://x/a\""));
        assert!(prompt.contains("Заголовок: Заголовок"));
        assert!(prompt.contains(&"я".repeat(400)));
        assert!(!prompt.contains(&"я".repeat(401)));
    }

    #[test]
    fn build_request_sets_headers() {
        let client = client(Some("secret"));
        let body = client.build_body("T", "S", "https://x/a");
        let request = client.build_request("secret", &body).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/api/v1/chat/completions");
        let headers = request.headers();
        assert_eq!(
            headers.get("Authorization").and_then(|h| h.to_str().ok()),
            Some("Bearer secret")
        );
        assert_eq!(
            headers.get("X-Title").and_then(|h| h.to_str().ok()),
            Some("Tech Rewriter")
        );
        assert_eq!(body["model"], "openrouter/auto");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn blank_key_counts_as_missing() {
        assert!(!client(Some("  ")).has_credential());
        assert!(client(Some("k")).has_credential());
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let err = client(None)
            .rewrite("T", "S", "https://x/a")
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::MissingCredential));
    }

    #[tokio::test]
    async fn unbuildable_request_is_not_a_response_error() {
        let cfg = Rewrite {
            api_key: Some("k".into()),
            title: "bad\ntitle".into(),
            ..Rewrite::default()
        };
        let client = OpenRouterClient::from_config(Client::new(), &cfg).unwrap();
        let err = client.rewrite("T", "S", "https://x/a").await.unwrap_err();
        assert!(matches!(err, RewriteError::Request(_)));
    }

    #[test]
    fn parse_completion_reads_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  📱 Новость\nИсточник: https://x/a \n"}}]}"#;
        assert_eq!(
            parse_completion(body).unwrap(),
            "📱 Новость\nИсточник: https://x/a"
        );
    }

    #[test]
    fn parse_completion_rejects_malformed_bodies() {
        assert!(matches!(
            parse_completion("not json"),
            Err(RewriteError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(RewriteError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":"   "}}]}"#),
            Err(RewriteError::Malformed(_))
        ));
    }
}
