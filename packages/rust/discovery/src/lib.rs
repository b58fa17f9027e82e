//! Contact discovery via the Hunter.io domain-search API.
//!
//! [`HunterClient`] implements [`DiscoveryPort`]: it pages through
//! `GET /v2/domain-search` with `offset`/`limit` and returns the raw email
//! records. Depth bounds the number of pages requested; paging stops early once
//! the reported result count is exhausted.

mod response;

use std::time::Duration;

use async_trait::async_trait;
use prospector_shared::{
    DiscoveryPort, HunterConfig, PortError, ProspectorError, RawContact, Result,
    api_key_from_env,
};
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use response::DomainSearchResponse;

/// Default timeout in seconds for a single page request.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("Prospector/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the Hunter client.
#[derive(Debug, Clone)]
pub struct HunterOptions {
    /// API root, e.g. `https://api.hunter.io`.
    pub base_url: String,
    /// Results requested per page.
    pub page_size: u32,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl Default for HunterOptions {
    fn default() -> Self {
        Self::from(&HunterConfig::default())
    }
}

impl From<&HunterConfig> for HunterOptions {
    fn from(config: &HunterConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            page_size: config.page_size.max(1),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HunterOptions {
    /// Per-page request timeout, matched to the engine's page budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Hunter.io domain-search client.
pub struct HunterClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    page_size: u32,
}

impl HunterClient {
    pub fn new(api_key: impl Into<String>, opts: &HunterOptions) -> Result<Self> {
        let base = Url::parse(&opts.base_url).map_err(|e| {
            ProspectorError::config(format!("invalid hunter base_url '{}': {e}", opts.base_url))
        })?;
        let endpoint = base
            .join("/v2/domain-search")
            .map_err(|e| ProspectorError::config(e.to_string()))?;

        Ok(Self {
            client: build_client(opts.timeout_secs)?,
            endpoint,
            api_key: api_key.into(),
            page_size: opts.page_size.max(1),
        })
    }

    /// Build a client from the `[hunter]` config section, reading the key from the env.
    /// `page_timeout` bounds each page request.
    pub fn from_config(config: &HunterConfig, page_timeout: Duration) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Self::new(api_key, &HunterOptions::from(config).with_timeout(page_timeout))
    }

    /// Fetch one page of results starting at `offset`.
    async fn fetch_page(
        &self,
        domain: &str,
        offset: u32,
    ) -> std::result::Result<DomainSearchResponse, PortError> {
        let offset = offset.to_string();
        let limit = self.page_size.to_string();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("domain", domain),
                ("api_key", self.api_key.as_str()),
                ("offset", offset.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            // The request URL carries the API key; never let it into messages.
            .map_err(|e| PortError::transport(format!("hunter: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::transport(format!(
                "hunter: HTTP {status}: {}",
                response::error_detail(&body)
            )));
        }

        let body = response.text().await.map_err(|e| {
            PortError::transport(format!("hunter: failed to read body: {}", e.without_url()))
        })?;
        serde_json::from_str(&body)
            .map_err(|e| PortError::schema(format!("hunter: unexpected response: {e}")))
    }
}

#[async_trait]
impl DiscoveryPort for HunterClient {
    #[instrument(skip_all, fields(domain = %domain, depth = depth))]
    async fn lookup(
        &self,
        domain: &str,
        depth: u32,
    ) -> std::result::Result<Vec<RawContact>, PortError> {
        let mut contacts = Vec::new();

        for page in 0..depth.max(1) {
            let Some(offset) = page_offset(page, self.page_size) else {
                debug!(page, "offset past the addressable range, stopping");
                break;
            };
            let response = self.fetch_page(domain, offset).await?;
            let received = u32::try_from(response.data.emails.len()).unwrap_or(u32::MAX);
            let total = response.meta.results;
            debug!(page, offset, received, ?total, "hunter page");
            contacts.extend(response.data.emails);

            let exhausted = received < self.page_size
                || total.is_some_and(|total| offset.saturating_add(received) >= total);
            if exhausted {
                break;
            }
        }

        info!(contacts = contacts.len(), "hunter lookup complete");
        Ok(contacts)
    }
}

/// Result offset of the zero-based `page`, or `None` once it no longer fits.
fn page_offset(page: u32, page_size: u32) -> Option<u32> {
    page.checked_mul(page_size)
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProspectorError::Network(format!("failed to build HTTP client: {e}")))
}
