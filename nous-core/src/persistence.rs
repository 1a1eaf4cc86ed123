//! SQLite persistence layer for the concept graph.
//!
//! Durable owner of all engine state. The schema is relational:
//!
//! ```sql
//! concept_network        (id PK, name, strength, confidence, created_at,
//!                         last_reinforced, related_ids JSON, source_snippets JSON)
//! knowledge_connections  (concept_a, concept_b, weight, connection_type,
//!                         reinforcement_count, discovered_at; PK (concept_a, concept_b))
//! interaction_patterns   (pattern_hash PK, pattern_type, frequency,
//!                         effectiveness, first_seen, last_used)
//! evolution_events       (id PK AUTOINCREMENT, event_type, description,
//!                         trigger_data JSON, impact_score, timestamp)
//! capability_evolution   (capability_name PK, level, growth_rate, last_exercise)
//! response_patterns      (pattern_type PK, weight, usage_count, updated_at)
//! ```
//!
//! Every logical mutation is one transaction. Timestamps are RFC 3339
//! strings throughout.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::capability::CapabilityRecord;
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::events::{EvolutionEvent, EvolutionEventKind};
use crate::pattern::{InteractionPattern, ResponsePatternWeight};
use crate::types::{Concept, ConceptId, Connection as Edge, ConnectionKind};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS concept_network (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL UNIQUE,
    strength         REAL NOT NULL,
    confidence       REAL NOT NULL,
    created_at       TEXT NOT NULL,
    last_reinforced  TEXT NOT NULL,
    related_ids      TEXT NOT NULL DEFAULT '[]',
    source_snippets  TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS knowledge_connections (
    concept_a            TEXT NOT NULL REFERENCES concept_network(id),
    concept_b            TEXT NOT NULL REFERENCES concept_network(id),
    weight               REAL NOT NULL,
    connection_type      TEXT NOT NULL,
    reinforcement_count  INTEGER NOT NULL DEFAULT 0,
    discovered_at        TEXT NOT NULL,
    PRIMARY KEY (concept_a, concept_b),
    CHECK (concept_a <> concept_b)
);
CREATE TABLE IF NOT EXISTS interaction_patterns (
    pattern_hash   TEXT PRIMARY KEY,
    pattern_type   TEXT NOT NULL,
    frequency      INTEGER NOT NULL,
    effectiveness  REAL NOT NULL,
    first_seen     TEXT NOT NULL,
    last_used      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS evolution_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type    TEXT NOT NULL,
    description   TEXT NOT NULL,
    trigger_data  TEXT NOT NULL,
    impact_score  REAL NOT NULL,
    timestamp     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS capability_evolution (
    capability_name  TEXT PRIMARY KEY,
    level            REAL NOT NULL,
    growth_rate      REAL NOT NULL,
    last_exercise    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS response_patterns (
    pattern_type  TEXT PRIMARY KEY,
    weight        REAL NOT NULL,
    usage_count   INTEGER NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON evolution_events(timestamp);
";

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn concept_from_row(row: &Row<'_>) -> rusqlite::Result<Concept> {
    Ok(Concept {
        id: ConceptId(row.get(0)?),
        name: row.get(1)?,
        strength: row.get(2)?,
        confidence: row.get(3)?,
        created_at: ts_col(row, 4)?,
        last_reinforced: ts_col(row, 5)?,
        related_ids: json_col(row, 6)?,
        source_snippets: json_col(row, 7)?,
    })
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let kind: String = row.get(3)?;
    let kind = kind
        .parse::<ConnectionKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(Edge {
        source: ConceptId(row.get(0)?),
        target: ConceptId(row.get(1)?),
        weight: row.get(2)?,
        kind,
        reinforcement_count: row.get(4)?,
        discovered_at: ts_col(row, 5)?,
    })
}

fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<InteractionPattern> {
    Ok(InteractionPattern {
        pattern_hash: row.get(0)?,
        pattern_type: row.get(1)?,
        frequency: row.get(2)?,
        effectiveness: row.get(3)?,
        first_seen: ts_col(row, 4)?,
        last_used: ts_col(row, 5)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EvolutionEvent> {
    let kind: EvolutionEventKind = json_col(row, 1)?;
    Ok(EvolutionEvent {
        id: Some(row.get(0)?),
        kind,
        description: row.get(2)?,
        impact_score: row.get(3)?,
        timestamp: ts_col(row, 4)?,
    })
}

fn capability_from_row(row: &Row<'_>) -> rusqlite::Result<CapabilityRecord> {
    Ok(CapabilityRecord {
        name: row.get(0)?,
        level: row.get(1)?,
        growth_rate: row.get(2)?,
        last_exercise: ts_col(row, 3)?,
    })
}

// ---------------------------------------------------------------------------
// Statement helpers (usable inside any transaction)
// ---------------------------------------------------------------------------

fn put_concept(tx: &Transaction<'_>, concept: &Concept) -> Result<()> {
    let related = serde_json::to_string(&concept.related_ids)?;
    let snippets = serde_json::to_string(&concept.source_snippets)?;
    tx.prepare_cached(
        "INSERT INTO concept_network
            (id, name, strength, confidence, created_at, last_reinforced, related_ids, source_snippets)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            strength = excluded.strength,
            confidence = excluded.confidence,
            last_reinforced = excluded.last_reinforced,
            related_ids = excluded.related_ids,
            source_snippets = excluded.source_snippets",
    )?
    .execute(params![
        concept.id.as_str(),
        concept.name,
        concept.strength,
        concept.confidence,
        ts(concept.created_at),
        ts(concept.last_reinforced),
        related,
        snippets,
    ])?;
    Ok(())
}

fn put_connection(tx: &Transaction<'_>, edge: &Edge) -> Result<()> {
    tx.prepare_cached(
        "INSERT INTO knowledge_connections
            (concept_a, concept_b, weight, connection_type, reinforcement_count, discovered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(concept_a, concept_b) DO UPDATE SET
            weight = excluded.weight,
            reinforcement_count = excluded.reinforcement_count",
    )?
    .execute(params![
        edge.source.as_str(),
        edge.target.as_str(),
        edge.weight,
        edge.kind.as_str(),
        edge.reinforcement_count,
        ts(edge.discovered_at),
    ])?;
    Ok(())
}

fn put_event(tx: &Transaction<'_>, event: &EvolutionEvent) -> Result<i64> {
    let payload = serde_json::to_string(&event.kind)?;
    tx.prepare_cached(
        "INSERT INTO evolution_events (event_type, description, trigger_data, impact_score, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        event.kind.event_type(),
        event.description,
        payload,
        event.impact_score,
        ts(event.timestamp),
    ])?;
    Ok(tx.last_insert_rowid())
}

// ---------------------------------------------------------------------------
// PersistenceLayer
// ---------------------------------------------------------------------------

/// Handle to the SQLite database holding the concept graph.
///
/// ```no_run
/// # use nous_core::persistence::PersistenceLayer;
/// # use nous_core::config::PersistenceConfig;
/// let mut db = PersistenceLayer::open("knowledge.db", &PersistenceConfig::default())?;
/// let concepts = db.load_concepts()?;
/// # Ok::<(), nous_core::error::NousError>(())
/// ```
pub struct PersistenceLayer {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceLayer")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceLayer {
    /// Open (or create) a database at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Database`](crate::NousError::Database) on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "NOUS persistence layer opened"
        );

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Database`](crate::NousError::Database) on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Loading (startup / resync)
    // ------------------------------------------------------------------

    /// All concepts, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_concepts(&self) -> Result<Vec<Concept>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, strength, confidence, created_at, last_reinforced,
                    related_ids, source_snippets
             FROM concept_network ORDER BY id",
        )?;
        let rows = stmt.query_map([], concept_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// A single concept by id.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_concept(&self, id: &ConceptId) -> Result<Option<Concept>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, strength, confidence, created_at, last_reinforced,
                    related_ids, source_snippets
             FROM concept_network WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id.as_str()], concept_from_row).optional()?)
    }

    /// All connections.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_connections(&self) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT concept_a, concept_b, weight, connection_type, reinforcement_count, discovered_at
             FROM knowledge_connections ORDER BY concept_a, concept_b",
        )?;
        let rows = stmt.query_map([], connection_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------
    // Graph mutations, one transaction each
    // ------------------------------------------------------------------

    /// Upsert a concept, optionally logging an event in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    pub fn save_concept(&mut self, concept: &Concept, event: Option<&EvolutionEvent>) -> Result<()> {
        let tx = self.conn.transaction()?;
        put_concept(&tx, concept)?;
        if let Some(event) = event {
            put_event(&tx, event)?;
        }
        tx.commit()?;
        debug!(concept = %concept.name, strength = concept.strength, "Saved concept");
        Ok(())
    }

    /// Upsert a connection together with the concepts it touches (their
    /// `related_ids` change on discovery) and an optional event.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    pub fn save_connection(
        &mut self,
        edge: &Edge,
        touched: &[&Concept],
        event: Option<&EvolutionEvent>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        for concept in touched {
            put_concept(&tx, concept)?;
        }
        put_connection(&tx, edge)?;
        if let Some(event) = event {
            put_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Upsert many concepts atomically (one cascade step).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    pub fn save_concepts(&mut self, concepts: &[Concept]) -> Result<()> {
        let start = Instant::now();
        let tx = self.conn.transaction()?;
        for concept in concepts {
            put_concept(&tx, concept)?;
        }
        tx.commit()?;
        debug!(
            count = concepts.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved concept batch"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------

    /// Append an event; returns its row id.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite or serialization failures.
    pub fn append_event(&mut self, event: &EvolutionEvent) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let id = put_event(&tx, event)?;
        tx.commit()?;
        Ok(id)
    }

    /// The `limit` most recent events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EvolutionEvent>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, trigger_data, description, impact_score, timestamp
             FROM evolution_events ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Total number of logged events.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures.
    pub fn event_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM evolution_events")
    }

    // ------------------------------------------------------------------
    // Interaction patterns
    // ------------------------------------------------------------------

    /// A pattern by hash.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_pattern(&self, pattern_hash: &str) -> Result<Option<InteractionPattern>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT pattern_hash, pattern_type, frequency, effectiveness, first_seen, last_used
             FROM interaction_patterns WHERE pattern_hash = ?1",
        )?;
        Ok(stmt.query_row(params![pattern_hash], pattern_from_row).optional()?)
    }

    /// All patterns, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_patterns(&self) -> Result<Vec<InteractionPattern>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT pattern_hash, pattern_type, frequency, effectiveness, first_seen, last_used
             FROM interaction_patterns ORDER BY frequency DESC, pattern_hash",
        )?;
        let rows = stmt.query_map([], pattern_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Upsert a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures.
    pub fn save_pattern(&mut self, pattern: &InteractionPattern) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.prepare_cached(
            "INSERT INTO interaction_patterns
                (pattern_hash, pattern_type, frequency, effectiveness, first_seen, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(pattern_hash) DO UPDATE SET
                frequency = excluded.frequency,
                effectiveness = excluded.effectiveness,
                last_used = excluded.last_used",
        )?
        .execute(params![
            pattern.pattern_hash,
            pattern.pattern_type,
            pattern.frequency,
            pattern.effectiveness,
            ts(pattern.first_seen),
            ts(pattern.last_used),
        ])?;
        tx.commit()?;
        Ok(())
    }

    /// Per pattern type: average effectiveness and total usage, over
    /// patterns whose effectiveness exceeds `threshold`.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures.
    pub fn effective_pattern_groups(&self, threshold: f64) -> Result<Vec<(String, f64, u64)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT pattern_type, AVG(effectiveness), SUM(frequency)
             FROM interaction_patterns
             WHERE effectiveness > ?1
             GROUP BY pattern_type ORDER BY pattern_type",
        )?;
        let rows = stmt.query_map(params![threshold], |row| {
            let usage: i64 = row.get(2)?;
            Ok((row.get(0)?, row.get(1)?, u64::try_from(usage).unwrap_or(0)))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Upsert response-pattern weights atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    pub fn save_response_patterns(&mut self, weights: &[ResponsePatternWeight]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO response_patterns (pattern_type, weight, usage_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(pattern_type) DO UPDATE SET
                    weight = excluded.weight,
                    usage_count = excluded.usage_count,
                    updated_at = excluded.updated_at",
            )?;
            for w in weights {
                stmt.execute(params![
                    w.pattern_type,
                    w.weight,
                    i64::try_from(w.usage_count).unwrap_or(i64::MAX),
                    ts(w.updated_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All response-pattern weights, heaviest first.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_response_patterns(&self) -> Result<Vec<ResponsePatternWeight>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT pattern_type, weight, usage_count, updated_at
             FROM response_patterns ORDER BY weight DESC, pattern_type",
        )?;
        let rows = stmt.query_map([], |row| {
            let usage: i64 = row.get(2)?;
            Ok(ResponsePatternWeight {
                pattern_type: row.get(0)?,
                weight: row.get(1)?,
                usage_count: u64::try_from(usage).unwrap_or(0),
                updated_at: ts_col(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    /// All capability records, by name.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or corrupt rows.
    pub fn load_capabilities(&self) -> Result<Vec<CapabilityRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT capability_name, level, growth_rate, last_exercise
             FROM capability_evolution ORDER BY capability_name",
        )?;
        let rows = stmt.query_map([], capability_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Upsert capability records atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    pub fn save_capabilities(&mut self, records: &[CapabilityRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO capability_evolution (capability_name, level, growth_rate, last_exercise)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(capability_name) DO UPDATE SET
                    level = excluded.level,
                    growth_rate = excluded.growth_rate,
                    last_exercise = excluded.last_exercise",
            )?;
            for r in records {
                stmt.execute(params![r.name, r.level, r.growth_rate, ts(r.last_exercise)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Backup & maintenance
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` using SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures or if the destination is not writable.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    /// Create `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count`. No-op for in-memory databases.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite or filesystem failures.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.as_os_str().to_os_string();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    /// Run `PRAGMA integrity_check`; `Ok(true)` when the database is sound.
    ///
    /// # Errors
    ///
    /// Returns an error if the check itself cannot run.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Path of the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Number of stored concepts.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures.
    pub fn concept_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM concept_network")
    }

    /// Number of stored connections.
    ///
    /// # Errors
    ///
    /// Returns an error on SQLite failures.
    pub fn connection_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM knowledge_connections")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
