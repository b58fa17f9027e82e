//! Profile enrichment through the RapidAPI LinkedIn profile endpoint.
//!
//! [`RapidApiClient`] implements [`EnrichmentPort`]. The provider answers with
//! `{"data": {...}, "message": ...}`; the `data` object is normalized onto
//! [`RawProfile`] and any key we do not model is kept in `extra`.

use std::time::Duration;

use async_trait::async_trait;
use prospector_shared::{
    EnrichmentPort, PortError, ProspectorError, RapidApiConfig, RawProfile, Result,
    api_key_from_env,
};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

/// Default timeout in seconds for a profile request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for profile requests.
const USER_AGENT: &str = concat!("Prospector/", env!("CARGO_PKG_VERSION"));

/// Optional sections we never ask for. Each one costs provider credits.
const EXCLUDED_SECTIONS: &[&str] = &[
    "include_skills",
    "include_certifications",
    "include_publications",
    "include_honors",
    "include_volunteers",
    "include_projects",
    "include_patents",
    "include_courses",
    "include_organizations",
    "include_profile_status",
    "include_company_public_url",
];

/// Provider key -> canonical [`RawProfile`] field.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("company", "current_company"),
    ("job_title", "current_job_title"),
    ("connection_count", "connections"),
    ("educations", "education"),
    ("profile_image_url", "profile_pic_url"),
    ("public_id", "public_identifier"),
];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RapidApiOptions {
    pub base_url: String,
    /// Value of the `X-RapidAPI-Host` header.
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for RapidApiOptions {
    fn default() -> Self {
        Self::from(&RapidApiConfig::default())
    }
}

impl From<&RapidApiConfig> for RapidApiOptions {
    fn from(config: &RapidApiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            host: config.host.clone(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RapidApiOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RapidApiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    host: String,
}

impl RapidApiClient {
    pub fn new(api_key: impl Into<String>, opts: &RapidApiOptions) -> Result<Self> {
        let mut endpoint = Url::parse(&opts.base_url).map_err(|e| {
            ProspectorError::config(format!("invalid rapidapi base_url '{}': {e}", opts.base_url))
        })?;
        endpoint
            .path_segments_mut()
            .map_err(|_| ProspectorError::config("rapidapi base_url cannot be a base"))?
            .pop_if_empty()
            .push("get-linkedin-profile");

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| ProspectorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            host: opts.host.clone(),
        })
    }

    /// Build a client from the `[rapidapi]` config section, reading the key from the env.
    pub fn from_config(config: &RapidApiConfig, timeout: Duration) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Self::new(api_key, &RapidApiOptions::from(config).with_timeout(timeout))
    }
}

#[async_trait]
impl EnrichmentPort for RapidApiClient {
    #[instrument(skip_all, fields(profile = %profile_ref))]
    async fn fetch(&self, profile_ref: &str) -> std::result::Result<RawProfile, PortError> {
        let mut query: Vec<(&str, &str)> = vec![("linkedin_url", profile_ref)];
        query.extend(EXCLUDED_SECTIONS.iter().map(|flag| (*flag, "false")));

        let response = self
            .client
            .get(self.endpoint.clone())
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.host)
            .query(&query)
            .send()
            .await
            .map_err(|e| PortError::transport(format!("profile lookup: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PortError::transport(format!(
                "profile lookup: HTTP {status}: {snippet}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            PortError::schema(format!("profile lookup: invalid JSON: {}", e.without_url()))
        })?;

        let profile = parse_profile(body)?;
        debug!(
            name = profile.full_name.as_deref().unwrap_or("-"),
            extra_fields = profile.extra.len(),
            "profile fetched"
        );
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract and normalize the `data` object of a provider response.
fn parse_profile(body: Value) -> std::result::Result<RawProfile, PortError> {
    let Value::Object(mut envelope) = body else {
        return Err(PortError::schema("profile lookup: response is not an object"));
    };
    let data = match envelope.remove("data") {
        Some(Value::Object(data)) => data,
        Some(Value::Null) | None => {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no data");
            return Err(PortError::schema(format!("profile lookup: empty profile ({message})")));
        }
        Some(other) => {
            return Err(PortError::schema(format!(
                "profile lookup: expected object for data, got {}",
                type_name(&other)
            )));
        }
    };

    serde_json::from_value(Value::Object(normalize(data)))
        .map_err(|e| PortError::schema(format!("profile lookup: {e}")))
}

/// Rename provider keys onto canonical fields unless the canonical key is already set.
fn normalize(mut data: Map<String, Value>) -> Map<String, Value> {
    for (from, to) in FIELD_ALIASES {
        if data.contains_key(*to) {
            continue;
        }
        if let Some(value) = data.remove(*from) {
            data.insert((*to).to_string(), value);
        }
    }
    data
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
