//! Parsing of model answers into port results.

use std::collections::BTreeMap;

use prospector_shared::{PortError, ProfileAnalysis, RecordKey, ScoreMap, ScoreVerdict};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct Verdict {
    score: f64,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ListedVerdict {
    email: String,
    score: f64,
    #[serde(default)]
    reason: String,
}

/// Parse a prioritization answer.
///
/// Accepts `{"users": [{"email", "score", "reason"}]}` as well as the keyed
/// form `{"users": {"<email>": {"score", "reason"}}}`. Entries whose email is
/// not a valid identity are skipped. Score ranges are not checked here.
pub(crate) fn parse_scores(content: &str) -> Result<ScoreMap, PortError> {
    let mut answer: Value = serde_json::from_str(strip_fences(content))
        .map_err(|e| PortError::schema(format!("scoring answer is not JSON: {e}")))?;
    let users = answer
        .get_mut("users")
        .map(Value::take)
        .ok_or_else(|| PortError::schema("scoring answer has no `users` field"))?;

    let entries: Vec<(String, Verdict)> = match users {
        Value::Array(_) => serde_json::from_value::<Vec<ListedVerdict>>(users)
            .map_err(|e| PortError::schema(format!("invalid scoring entry: {e}")))?
            .into_iter()
            .map(|l| {
                let verdict = Verdict {
                    score: l.score,
                    reason: l.reason,
                };
                (l.email, verdict)
            })
            .collect(),
        Value::Object(_) => serde_json::from_value::<BTreeMap<String, Verdict>>(users)
            .map_err(|e| PortError::schema(format!("invalid scoring entry: {e}")))?
            .into_iter()
            .collect(),
        other => {
            return Err(PortError::schema(format!(
                "scoring answer `users` must be a list, got {other}"
            )));
        }
    };

    let mut scores = ScoreMap::with_capacity(entries.len());
    for (email, verdict) in entries {
        match RecordKey::parse(&email) {
            Ok(key) => {
                scores.insert(
                    key,
                    ScoreVerdict {
                        score: verdict.score,
                        reason: verdict.reason,
                    },
                );
            }
            Err(e) => warn!(%email, error = %e, "ignoring scored entry with invalid identity"),
        }
    }
    Ok(scores)
}

/// Parse and validate a profile analysis answer.
pub(crate) fn parse_analysis(content: &str) -> Result<ProfileAnalysis, PortError> {
    let analysis: ProfileAnalysis = serde_json::from_str(strip_fences(content))
        .map_err(|e| PortError::schema(format!("analysis answer does not match schema: {e}")))?;
    analysis.validate()?;
    Ok(analysis)
}

/// Models sometimes wrap JSON in a markdown code fence despite json mode.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(email: &str) -> RecordKey {
        RecordKey::parse(email).unwrap()
    }

    #[test]
    fn parses_listed_scores() {
        let scores = parse_scores(
            r#"{"users": [
                {"email": "Ada@Example.com", "score": 0.9, "reason": "CTO"},
                {"email": "grace@example.com", "score": 0.4}
            ]}"#,
        )
        .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&key("ada@example.com")].score, 0.9);
        assert_eq!(scores[&key("grace@example.com")].reason, "");
    }

    #[test]
    fn parses_keyed_scores() {
        let answer = r#"{"users": {"ada@example.com": {"score": 0.7, "reason": "fit"}}}"#;
        let scores = parse_scores(answer).unwrap();
        assert_eq!(scores[&key("ada@example.com")].reason, "fit");
    }

    #[test]
    fn out_of_range_scores_pass_through() {
        let scores = parse_scores(r#"{"users": [{"email": "a@x.io", "score": 7}]}"#).unwrap();
        assert_eq!(scores[&key("a@x.io")].score, 7.0);
    }

    #[test]
    fn invalid_identities_are_skipped() {
        let scores = parse_scores(
            r#"{"users": [{"email": "nobody", "score": 0.5}, {"email": "a@x.io", "score": 0.5}]}"#,
        )
        .unwrap();
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn structural_problems_are_schema_errors() {
        for bad in [
            "not json",
            r#"{"prospects": []}"#,
            r#"{"users": "a@x.io"}"#,
            r#"{"users": [{"email": "a@x.io", "score": "high"}]}"#,
        ] {
            assert!(
                matches!(parse_scores(bad), Err(PortError::Schema(_))),
                "expected schema error for {bad}"
            );
        }
    }

    #[test]
    fn analysis_is_validated() {
        let fenced = "```json\n{\"job_title\": \"CTO\", \"role_relevance\": 0.5}\n```";
        let ok = parse_analysis(fenced).unwrap();
        assert_eq!(ok.job_title.as_deref(), Some("CTO"));

        let err = parse_analysis(r#"{"role_relevance": 2.0}"#).unwrap_err();
        assert!(matches!(err, PortError::Schema(_)));

        let err = parse_analysis(r#"{"key_skills": "rust"}"#).unwrap_err();
        assert!(matches!(err, PortError::Schema(_)));
    }
}
