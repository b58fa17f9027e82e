//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding run history, the
//! materialized record set per domain, each run's event log, and the profile
//! analysis cache.
//!
//! **Access rules:**
//! - `prospector run`: read-write via [`Storage::open`]
//! - `prospector runs` / `events`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use prospector_shared::{
    Event, FailureKind, Outcome, ProspectorError, Record, RecordKey, Result, StageId,
};
use uuid::Uuid;

/// File name of the run database inside the data directory.
pub const DB_FILE_NAME: &str = "prospector.db";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> ProspectorError {
    ProspectorError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProspectorError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProspectorError::Storage(format!(
                "no database at {}; run `prospector run` first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ProspectorError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ProspectorError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Insert a new run. Returns the generated run ID.
    pub async fn insert_run(&self, domain: &str, target_role: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, domain, target_role, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), domain, target_role, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Mark a run finished with its final counts and terminal reason.
    pub async fn finish_run(
        &self,
        run_id: &str,
        record_count: usize,
        event_count: usize,
        terminal: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs
                 SET finished_at = ?1, record_count = ?2, event_count = ?3, terminal = ?4
                 WHERE id = ?5",
                params![
                    now.as_str(),
                    record_count as i64,
                    event_count as i64,
                    terminal,
                    run_id
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a run by ID.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, domain, target_role, started_at, finished_at,
                        record_count, event_count, terminal
                 FROM runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List runs, newest first, optionally for one domain.
    pub async fn list_runs(&self, domain: Option<&str>) -> Result<Vec<RunSummary>> {
        let mut rows = match domain {
            Some(domain) => self
                .conn
                .query(
                    "SELECT id, domain, target_role, started_at, finished_at,
                            record_count, event_count, terminal
                     FROM runs WHERE domain = ?1 ORDER BY started_at DESC, id DESC",
                    params![domain],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT id, domain, target_role, started_at, finished_at,
                            record_count, event_count, terminal
                     FROM runs ORDER BY started_at DESC, id DESC",
                    params![],
                )
                .await,
        }
        .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Materialized records
    // -----------------------------------------------------------------------

    /// Load the materialized record set for `domain`, in stored order.
    pub async fn load_records(&self, domain: &str) -> Result<Vec<Record>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_json FROM records WHERE domain = ?1 ORDER BY position",
                params![domain],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let json: String = row.get(0).map_err(storage_err)?;
            let record: Record = serde_json::from_str(&json)
                .map_err(|e| ProspectorError::parse(format!("stored record: {e}")))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Replace the materialized record set for `domain` (upsert by identity key).
    /// Rows are written in one transaction; on error none of them land.
    pub async fn save_records(&self, domain: &str, records: &[Record]) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let written = async {
            for (position, record) in records.iter().enumerate() {
                let json = serde_json::to_string(record)
                    .map_err(|e| ProspectorError::parse(e.to_string()))?;
                tx.execute(
                    "INSERT INTO records (domain, record_key, position, record_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(domain, record_key) DO UPDATE SET
                       position = excluded.position,
                       record_json = excluded.record_json,
                       updated_at = excluded.updated_at",
                    params![
                        domain,
                        record.key().as_str(),
                        position as i64,
                        json.as_str(),
                        now.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
            }
            Ok::<(), ProspectorError>(())
        }
        .await;

        match written {
            Ok(()) => tx.commit().await.map_err(storage_err),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event log
    // -----------------------------------------------------------------------

    /// Append a run's events after any already stored for it.
    pub async fn append_events(&self, run_id: &str, events: &[Event]) -> Result<()> {
        self.check_writable()?;
        let offset = self.event_count(run_id).await?;
        for (i, event) in events.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO events (run_id, seq, stage, subject, outcome, failure, detail, at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        run_id,
                        (offset + i) as i64,
                        event.stage.as_str(),
                        event.subject.as_ref().map(|k| k.as_str()),
                        event.outcome.as_str(),
                        event.failure.map(|f| f.as_str()),
                        event.detail.as_str(),
                        event.at.to_rfc3339()
                    ],
                )
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// The event log of a run, in append order.
    pub async fn list_events(&self, run_id: &str) -> Result<Vec<Event>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stage, subject, outcome, failure, detail, at
                 FROM events WHERE run_id = ?1 ORDER BY seq",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_event(&row)?);
        }
        Ok(results)
    }

    async fn event_count(&self, run_id: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM events WHERE run_id = ?1",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as usize),
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Analysis cache operations
    // -----------------------------------------------------------------------

    /// Get a cached analysis result.
    pub async fn get_analysis_cache(
        &self,
        prompt_hash: &str,
        model_id: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM analysis_cache WHERE prompt_hash = ?1 AND model_id = ?2",
                params![prompt_hash, model_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let result: String = row.get(0).map_err(storage_err)?;
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Store an analysis result in the cache (upserts).
    pub async fn set_analysis_cache(
        &self,
        prompt_hash: &str,
        model_id: &str,
        result_json: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO analysis_cache (prompt_hash, model_id, result_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(prompt_hash, model_id) DO UPDATE SET
                   result_json = excluded.result_json,
                   created_at = excluded.created_at",
                params![prompt_hash, model_id, result_json, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

/// A persisted run as listed by `prospector runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub id: String,
    pub domain: String,
    pub target_role: String,
    pub started_at: DateTime<Utc>,
    /// `None` while the run is in progress (or if it was interrupted).
    pub finished_at: Option<DateTime<Utc>>,
    pub record_count: Option<u64>,
    pub event_count: Option<u64>,
    pub terminal: Option<String>,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProspectorError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`RunSummary`].
fn row_to_run(row: &libsql::Row) -> Result<RunSummary> {
    let started: String = row.get(3).map_err(storage_err)?;
    let finished: Option<String> = row.get::<String>(4).ok();
    Ok(RunSummary {
        id: row.get::<String>(0).map_err(storage_err)?,
        domain: row.get::<String>(1).map_err(storage_err)?,
        target_role: row.get::<String>(2).map_err(storage_err)?,
        started_at: parse_timestamp(&started)?,
        finished_at: finished.as_deref().map(parse_timestamp).transpose()?,
        record_count: row.get::<i64>(5).ok().map(|v| v as u64),
        event_count: row.get::<i64>(6).ok().map(|v| v as u64),
        terminal: row.get::<String>(7).ok(),
    })
}

/// Convert a database row to an [`Event`].
fn row_to_event(row: &libsql::Row) -> Result<Event> {
    let stage: String = row.get(0).map_err(storage_err)?;
    let subject: Option<String> = row.get::<String>(1).ok();
    let outcome: String = row.get(2).map_err(storage_err)?;
    let failure: Option<String> = row.get::<String>(3).ok();
    let at: String = row.get(5).map_err(storage_err)?;
    Ok(Event {
        stage: stage.parse::<StageId>()?,
        subject: subject.as_deref().map(RecordKey::parse).transpose()?,
        outcome: outcome.parse::<Outcome>()?,
        failure: failure
            .as_deref()
            .map(|f| f.parse::<FailureKind>())
            .transpose()?,
        detail: row.get::<String>(4).map_err(storage_err)?,
        at: parse_timestamp(&at)?,
    })
}
