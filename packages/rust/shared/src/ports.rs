//! Capability ports: the boundary between the pipeline and external services.
//!
//! The pipeline only ever talks to contact discovery, profile enrichment, and
//! the reasoning model through these traits. Concrete adapters live in their
//! own crates; tests inject in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::PortError;
use crate::types::{Confidence, Record, RecordKey};

// ---------------------------------------------------------------------------
// Port payloads
// ---------------------------------------------------------------------------

/// A contact as reported by the discovery service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContact {
    /// Email address.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Raw external profile. Known fields are typed; anything else is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiences: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_identifier: Option<String>,
    /// Fields the provider sent that we do not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Score assigned to one record by the reasoning port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVerdict {
    /// Fit for the target role, in `[0, 1]`.
    pub score: f64,
    pub reason: String,
}

/// Result of an aggregate scoring call, keyed by identity.
pub type ScoreMap = HashMap<RecordKey, ScoreVerdict>;

/// Structured analysis of an external profile.
///
/// Every field is optional so partial answers validate; unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProfileAnalysis {
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Full display name.
    pub full_name: Option<String>,
    /// Profile headline.
    pub headline: Option<String>,
    /// Current job title.
    pub job_title: Option<String>,
    /// Current employer.
    pub company: Option<String>,
    /// Industry of the current employer.
    pub company_industry: Option<String>,
    /// Years in the current role.
    pub years_in_role: Option<u32>,
    /// Years at the current employer.
    pub years_in_company: Option<u32>,
    /// Total years of professional experience.
    pub total_experience_years: Option<u32>,
    /// Most relevant skills.
    pub key_skills: Vec<String>,
    /// Industries the person has worked in.
    pub industries: Vec<String>,
    /// Highest education level.
    pub education_level: Option<String>,
    /// Field of education.
    pub education_field: Option<String>,
    /// Number of connections.
    pub connection_count: Option<u64>,
    /// Number of followers.
    pub follower_count: Option<u64>,
    /// Assessed seniority, e.g. "senior" or "executive".
    pub seniority_level: Option<String>,
    /// Relevance for the target role, in `[0, 1]`.
    pub role_relevance: Option<f64>,
    /// Overall assessment.
    pub overall_summary: Option<String>,
}

impl ProfileAnalysis {
    /// Schema descriptor handed to the reasoning port.
    pub fn schema() -> SchemaDescriptor {
        SchemaDescriptor::of::<Self>("profile_analysis")
    }

    /// Checks that go beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), PortError> {
        if let Some(relevance) = self.role_relevance {
            if !relevance.is_finite() || !(0.0..=1.0).contains(&relevance) {
                return Err(PortError::schema(format!(
                    "role_relevance {relevance} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Name and JSON schema of a structured answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub schema: serde_json::Value,
}

impl SchemaDescriptor {
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(schema).unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Port traits
// ---------------------------------------------------------------------------

/// Contact discovery for a company domain.
#[async_trait]
pub trait DiscoveryPort: Send + Sync {
    /// Look up contacts at `domain`, reading at most `depth` result pages.
    async fn lookup(&self, domain: &str, depth: u32) -> Result<Vec<RawContact>, PortError>;
}

/// External profile lookup.
#[async_trait]
pub trait EnrichmentPort: Send + Sync {
    async fn fetch(&self, profile_ref: &str) -> Result<RawProfile, PortError>;
}

/// The reasoning model.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    /// Score a batch of records for `role_description` in a single call.
    ///
    /// Records absent from the returned map were not selected.
    async fn score(
        &self,
        records: &[Record],
        role_description: &str,
        max_results: u32,
    ) -> Result<ScoreMap, PortError>;

    /// Produce a structured analysis of a raw profile.
    async fn analyze(
        &self,
        profile: &RawProfile,
        role_description: &str,
        schema: &SchemaDescriptor,
    ) -> Result<ProfileAnalysis, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_profile_keeps_unknown_fields() {
        let json = r#"{
            "full_name": "Ada Lovelace",
            "connections": 500,
            "languages": ["en", "fr"],
            "headline": null
        }"#;
        let profile: RawProfile = serde_json::from_str(json).expect("deserialize");
        assert_eq!(profile.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.connections, Some(500));
        assert!(profile.headline.is_none());
        assert_eq!(profile.extra["languages"], serde_json::json!(["en", "fr"]));
    }

    #[test]
    fn raw_contact_tolerates_missing_fields() {
        let contact: RawContact =
            serde_json::from_str(r#"{"value": "a@x.io", "confidence": 91}"#).unwrap();
        assert_eq!(contact.value, "a@x.io");
        assert_eq!(contact.confidence, Some(Confidence::Score(91.0)));
        assert!(contact.position.is_none());
    }

    #[test]
    fn analysis_allows_partial_and_unknown_fields() {
        let analysis: ProfileAnalysis = serde_json::from_str(
            r#"{"job_title": "CMO", "role_relevance": 0.8, "mood": "cheerful"}"#,
        )
        .expect("deserialize");
        assert_eq!(analysis.job_title.as_deref(), Some("CMO"));
        assert!(analysis.key_skills.is_empty());
        assert!(analysis.validate().is_ok());
    }

    #[test]
    fn analysis_rejects_out_of_range_relevance() {
        let analysis = ProfileAnalysis {
            role_relevance: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(analysis.validate(), Err(PortError::Schema(_))));
    }

    #[test]
    fn schema_descriptor_lists_properties() {
        let descriptor = ProfileAnalysis::schema();
        assert_eq!(descriptor.name, "profile_analysis");
        let props = descriptor.schema["properties"]
            .as_object()
            .expect("properties object");
        assert!(props.contains_key("role_relevance"));
        assert!(props.contains_key("key_skills"));
    }
}
