//! Plain-text rendering of records, runs, and events.

use prospector_shared::{BundleKey, Event, Record};
use prospector_storage::RunSummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Summary table of records, best score first.
pub(crate) fn record_table(records: &[Record]) -> Vec<String> {
    if records.is_empty() {
        return vec!["(no records)".to_string()];
    }

    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.score()
            .unwrap_or(f64::MIN)
            .total_cmp(&a.score().unwrap_or(f64::MIN))
    });

    let mut lines = vec![format!(
        "{:<32} {:<24} {:<28} {:>5}  {}",
        "EMAIL", "NAME", "ROLE", "SCORE", "SOURCES"
    )];
    for record in sorted {
        let score = record
            .score()
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{:<32} {:<24} {:<28} {:>5}  {}",
            truncate(record.key().as_str(), 32),
            truncate(&record.display_name().unwrap_or_default(), 24),
            truncate(record.role.as_deref().unwrap_or("-"), 28),
            score,
            record.sources().joined(),
        ));
        if let Some(summary) = analysis_summary(record) {
            lines.push(format!("    {summary}"));
        }
    }
    lines
}

/// Table of persisted runs.
pub(crate) fn run_table(runs: &[RunSummary]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<36}  {:<19}  {:<24} {:<24} {:>7}  {}",
        "RUN", "STARTED", "DOMAIN", "ROLE", "RECORDS", "RESULT"
    )];
    for run in runs {
        lines.push(format!(
            "{:<36}  {:<19}  {:<24} {:<24} {:>7}  {}",
            run.id,
            run.started_at.format(TIME_FORMAT),
            truncate(&run.domain, 24),
            truncate(&run.target_role, 24),
            run.record_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            run.terminal.as_deref().unwrap_or("unfinished"),
        ));
    }
    lines
}

/// One line per event, in log order.
pub(crate) fn event_lines(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let subject = event
                .subject
                .as_ref()
                .map(|s| s.as_str())
                .unwrap_or("*");
            let outcome = match event.failure {
                Some(kind) => format!("{}({})", event.outcome.as_str(), kind.as_str()),
                None => event.outcome.as_str().to_string(),
            };
            format!(
                "{}  {:<10} {:<18} {:<32} {}",
                event.at.format(TIME_FORMAT),
                event.stage.as_str(),
                outcome,
                subject,
                event.detail
            )
        })
        .collect()
}

fn analysis_summary(record: &Record) -> Option<String> {
    let analysis = record.bundle(BundleKey::ProfileAnalysis)?;
    let summary = analysis.get("overall_summary")?.as_str()?;
    match analysis.get("role_relevance").and_then(|v| v.as_f64()) {
        Some(relevance) => Some(format!("[{relevance:.2}] {summary}")),
        None => Some(summary.to_string()),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
