//! Reasoning port backed by an OpenRouter chat model.
//!
//! [`OpenRouterReasoning`] implements [`ReasoningPort`] with two JSON-mode
//! completions: one aggregate prioritization call per run and one analysis
//! call per enriched profile. Answers are parsed and validated here, so the
//! pipeline only ever sees well-formed scores and analyses.

mod answer;
mod client;
mod prompts;

use std::time::Duration;

use async_trait::async_trait;
use prospector_shared::{
    OpenRouterConfig, PortError, ProfileAnalysis, RawProfile, ReasoningPort, Record, Result,
    SchemaDescriptor, ScoreMap, api_key_from_env,
};
use tracing::{info, instrument};

use client::{ChatClient, ChatRequest, Message, ResponseFormat};

/// Default timeout in seconds for a completion.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReasoningOptions {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ReasoningOptions {
    fn default() -> Self {
        Self::from(&OpenRouterConfig::default())
    }
}

impl From<&OpenRouterConfig> for ReasoningOptions {
    fn from(config: &OpenRouterConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.default_model.clone(),
            temperature: config.temperature,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ReasoningOptions {
    /// Completion timeout, matched to the engine's reasoning budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

pub struct OpenRouterReasoning {
    client: ChatClient,
    model: String,
    temperature: f32,
}

impl OpenRouterReasoning {
    pub fn new(api_key: &str, opts: &ReasoningOptions) -> Result<Self> {
        Ok(Self {
            client: ChatClient::new(
                &opts.base_url,
                api_key,
                Duration::from_secs(opts.timeout_secs),
            )?,
            model: opts.model.clone(),
            temperature: opts.temperature,
        })
    }

    /// Build from the `[openrouter]` config section, reading the key from the env.
    pub fn from_config(config: &OpenRouterConfig, timeout: Duration) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Self::new(&api_key, &ReasoningOptions::from(config).with_timeout(timeout))
    }

    /// Model id used for completions; also the analysis cache namespace.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, system: &str, user: &str) -> std::result::Result<String, PortError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat::json_object(),
        };
        self.client.complete(&request).await
    }
}

#[async_trait]
impl ReasoningPort for OpenRouterReasoning {
    #[instrument(skip_all, fields(records = records.len(), max_results = max_results))]
    async fn score(
        &self,
        records: &[Record],
        role_description: &str,
        max_results: u32,
    ) -> std::result::Result<ScoreMap, PortError> {
        let prompt = prompts::prioritization(records, role_description, max_results);
        let content = self.ask(prompts::PRIORITIZATION_SYSTEM, &prompt).await?;
        let scores = answer::parse_scores(&content)?;
        info!(selected = scores.len(), "prioritization answered");
        Ok(scores)
    }

    #[instrument(skip_all, fields(schema = %schema.name))]
    async fn analyze(
        &self,
        profile: &RawProfile,
        role_description: &str,
        schema: &SchemaDescriptor,
    ) -> std::result::Result<ProfileAnalysis, PortError> {
        let prompt = prompts::analysis(profile, role_description, schema);
        let content = self.ask(prompts::ANALYSIS_SYSTEM, &prompt).await?;
        answer::parse_analysis(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_shared::RecordKey;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reasoning(server: &MockServer) -> OpenRouterReasoning {
        let opts = ReasoningOptions {
            base_url: format!("{}/api/v1", server.uri()),
            model: "test/model".into(),
            temperature: 0.0,
            timeout_secs: 5,
        };
        OpenRouterReasoning::new("sk-test", &opts).expect("reasoning client")
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "gen-test",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    fn record(email: &str, role: &str) -> Record {
        let mut r = Record::new(RecordKey::parse(email).unwrap());
        r.role = Some(role.into());
        r
    }

    #[tokio::test]
    async fn score_posts_json_mode_request() {
        let server = MockServer::start().await;
        let answer = r#"{"users": [{"email": "ada@example.com", "score": 0.88, "reason": "CTO"}]}"#;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(answer)))
            .expect(1)
            .mount(&server)
            .await;

        let records = [record("ada@example.com", "CTO"), record("bob@example.com", "Intern")];
        let scores = reasoning(&server).score(&records, "CTO", 1).await.unwrap();

        assert_eq!(scores.len(), 1);
        let verdict = &scores[records[0].key()];
        assert_eq!(verdict.score, 0.88);
        assert_eq!(verdict.reason, "CTO");
    }

    #[tokio::test]
    async fn analyze_parses_fixture() {
        let server = MockServer::start().await;
        let body = std::fs::read_to_string("../../../fixtures/openrouter/analysis.json")
            .expect("read analysis fixture");
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let profile = RawProfile {
            full_name: Some("Ada Lovelace".into()),
            ..Default::default()
        };
        let analysis = reasoning(&server)
            .analyze(&profile, "CTO", &ProfileAnalysis::schema())
            .await
            .unwrap();

        assert_eq!(analysis.company.as_deref(), Some("Example Inc"));
        assert_eq!(analysis.years_in_company, Some(5));
        assert_eq!(analysis.role_relevance, Some(0.92));
        assert_eq!(analysis.key_skills, ["Leadership", "Mathematics"]);
    }

    #[tokio::test]
    async fn invalid_analysis_is_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("I think they are great")),
            )
            .mount(&server)
            .await;

        let err = reasoning(&server)
            .analyze(&RawProfile::default(), "CTO", &ProfileAnalysis::schema())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Schema(_)));
    }

    #[tokio::test]
    async fn http_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = reasoning(&server)
            .score(&[record("a@x.io", "CTO")], "CTO", 5)
            .await
            .unwrap_err();
        match err {
            PortError::Transport(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("overloaded"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = reasoning(&server)
            .score(&[record("a@x.io", "CTO")], "CTO", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Transport(_)));
    }

    #[test]
    fn completion_timeout_follows_engine_budget() {
        assert_eq!(ReasoningOptions::default().timeout_secs, 120);
        let opts = ReasoningOptions::default().with_timeout(Duration::from_secs(90));
        assert_eq!(opts.timeout_secs, 90);
        let opts = ReasoningOptions::default().with_timeout(Duration::from_millis(200));
        assert_eq!(opts.timeout_secs, 1);
    }
}
