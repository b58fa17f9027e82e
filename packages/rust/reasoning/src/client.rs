//! Minimal OpenRouter chat-completions client returning raw message content.

use std::time::Duration;

use prospector_shared::{PortError, ProspectorError, Result};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("Prospector/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Message<'a>>,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self { kind: "json_object" }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub(crate) struct ChatClient {
    http: Client,
    endpoint: Url,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut endpoint = Url::parse(base_url).map_err(|e| {
            ProspectorError::config(format!("invalid openrouter base_url '{base_url}': {e}"))
        })?;
        endpoint
            .path_segments_mut()
            .map_err(|_| ProspectorError::config("openrouter base_url cannot be a base"))?
            .pop_if_empty()
            .extend(["chat", "completions"]);

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ProspectorError::config("openrouter API key contains invalid characters")
        })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("X-Title", HeaderValue::from_static("Prospector"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ProspectorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, endpoint })
    }

    /// Send a chat request and return the first choice's message content.
    pub async fn complete(
        &self,
        request: &ChatRequest<'_>,
    ) -> std::result::Result<String, PortError> {
        debug!(model = %request.model, "chat completion request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| PortError::transport(format!("reasoning: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(PortError::transport(format!("reasoning: HTTP {status}: {snippet}")));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            PortError::transport(format!(
                "reasoning: malformed completion: {}",
                e.without_url()
            ))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| PortError::transport("reasoning: completion had no content"))
    }
}
