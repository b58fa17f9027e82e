//! Wire types for the domain-search endpoint.

use prospector_shared::RawContact;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct DomainSearchResponse {
    pub data: DomainSearchData,
    #[serde(default)]
    pub meta: DomainSearchMeta,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DomainSearchData {
    #[serde(default)]
    pub emails: Vec<RawContact>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DomainSearchMeta {
    /// Total results available for the domain.
    #[serde(default)]
    pub results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Human-readable detail from an error body, falling back to the raw text.
pub(crate) fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let details: Vec<String> = parsed
        .into_iter()
        .flat_map(|b| b.errors)
        .filter_map(|e| e.details.or(e.id))
        .collect();

    if details.is_empty() {
        body.chars().take(200).collect()
    } else {
        details.join("; ")
    }
}
