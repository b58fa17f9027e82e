//! SQL migration definitions for the Prospector database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, records, events, analysis_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pipeline run
CREATE TABLE IF NOT EXISTS runs (
    id           TEXT PRIMARY KEY,
    domain       TEXT NOT NULL,
    target_role  TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    record_count INTEGER,
    event_count  INTEGER,
    terminal     TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_domain ON runs(domain);

-- Materialized record set per domain, merged across runs
CREATE TABLE IF NOT EXISTS records (
    domain      TEXT NOT NULL,
    record_key  TEXT NOT NULL,
    position    INTEGER NOT NULL,
    record_json TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (domain, record_key)
);

-- Append-only event log per run
CREATE TABLE IF NOT EXISTS events (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id   TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    seq      INTEGER NOT NULL,
    stage    TEXT NOT NULL,
    subject  TEXT,
    outcome  TEXT NOT NULL,
    failure  TEXT,
    detail   TEXT NOT NULL,
    at       TEXT NOT NULL,
    UNIQUE(run_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_events_run_id ON events(run_id);

-- Profile analysis cache
CREATE TABLE IF NOT EXISTS analysis_cache (
    prompt_hash TEXT NOT NULL,
    model_id    TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (prompt_hash, model_id)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
