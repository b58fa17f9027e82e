//! Prompt templates for prioritization and profile analysis.

use prospector_shared::{RawProfile, Record, SchemaDescriptor};
use serde_json::json;

pub(crate) const PRIORITIZATION_SYSTEM: &str = "\
You are an experienced B2B sales analyst who identifies and prioritizes the most promising prospects.

Evaluate each prospect on:
- how well the role matches the target role, including seniority and decision authority
- relevant areas of responsibility and strategic position in the organization
- completeness and quality of the available data

Do not over-rate prospects on thin data or guess at budgets.
Score every selected prospect between 0 and 1 and give a concrete reason for each score.
Answer with a single JSON object and nothing else.";

pub(crate) const ANALYSIS_SYSTEM: &str = "\
You are an experienced B2B sales analyst who evaluates contacts at target companies.

Read the whole profile before answering. Identify the person's role, influence and decision authority, \
relevant projects and initiatives, and how well they match the target role.
Stay close to the data: leave a field null rather than guessing, and ignore irrelevant personal traits.
Answer with a single JSON object that follows the requested schema and nothing else.";

/// User prompt for the aggregate scoring call.
pub(crate) fn prioritization(records: &[Record], role_description: &str, max_results: u32) -> String {
    let prospects: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "email": r.key().as_str(),
                "first_name": r.first_name,
                "last_name": r.last_name,
                "role": r.role,
                "has_profile": r.profile_url.is_some(),
                "confidence": r.confidence,
            })
        })
        .collect();
    let prospects = serde_json::to_string_pretty(&prospects).unwrap_or_default();

    format!(
        "Evaluate and prioritize these prospects for the target role: {role_description}

PROSPECTS:
{prospects}

Select at most {max_results} prospects. Leave out anyone who is not a plausible fit.

Return a JSON object of this shape:
{{\"users\": [{{\"email\": \"<email from the list>\", \"score\": <number between 0 and 1>, \"reason\": \"<why>\"}}]}}"
    )
}

/// User prompt for a single profile analysis.
pub(crate) fn analysis(
    profile: &RawProfile,
    role_description: &str,
    schema: &SchemaDescriptor,
) -> String {
    let profile = serde_json::to_string_pretty(profile).unwrap_or_default();
    let schema_json = serde_json::to_string_pretty(&schema.schema).unwrap_or_default();

    format!(
        "Analyze this profile for its B2B sales potential.

PROFILE:
{profile}

TARGET ROLE:
{role_description}

Return only a valid JSON object matching the `{name}` schema:
{schema_json}",
        name = schema.name
    )
}
