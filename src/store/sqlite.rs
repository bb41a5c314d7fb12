//! SQLite-backed metadata reader and relationship store.
//!
//! One database file holds both the column metadata written by earlier
//! pipeline stages and the relationships discovery produces.
//!
//! # Tables
//!
//! ```text
//! meta                     version bookkeeping
//! column_profiles          one JSON ColumnProfile per (project, datasource, table, column)
//! declared_foreign_keys    one JSON DeclaredForeignKey per (project, datasource, name)
//! relationships            accepted relationships, primary read path
//! relationship_rejections  rejected candidates, audit only
//! ```
//!
//! Table and column names in relationship keys compare case-insensitively.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{RejectionRecord, RelationshipRecord, RelationshipStore, StoreError, StoreResult};
use crate::discovery::RelationshipKey;
use crate::metadata::{
    ColumnMetadataReader, ColumnProfile, DeclaredForeignKey, MetadataError, MetadataResult,
    SchemaSnapshot,
};

/// Current store schema version.
const STORE_VERSION: i32 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS column_profiles (
        project_id TEXT NOT NULL,
        datasource_id TEXT NOT NULL,
        table_name TEXT NOT NULL COLLATE NOCASE,
        column_name TEXT NOT NULL COLLATE NOCASE,
        ordinal INTEGER NOT NULL,
        profile TEXT NOT NULL,
        PRIMARY KEY (project_id, datasource_id, table_name, column_name)
    );

    CREATE TABLE IF NOT EXISTS declared_foreign_keys (
        project_id TEXT NOT NULL,
        datasource_id TEXT NOT NULL,
        ordinal INTEGER NOT NULL,
        definition TEXT NOT NULL,
        PRIMARY KEY (project_id, datasource_id, ordinal)
    );

    CREATE TABLE IF NOT EXISTS relationships (
        project_id TEXT NOT NULL,
        datasource_id TEXT NOT NULL,
        source_table TEXT NOT NULL COLLATE NOCASE,
        source_column TEXT NOT NULL COLLATE NOCASE,
        target_table TEXT NOT NULL COLLATE NOCASE,
        target_column TEXT NOT NULL COLLATE NOCASE,
        cardinality TEXT NOT NULL,
        source_role TEXT,
        provenance TEXT NOT NULL,
        confidence REAL NOT NULL,
        reasoning TEXT,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (project_id, datasource_id, source_table, source_column, target_table, target_column)
    );

    CREATE TABLE IF NOT EXISTS relationship_rejections (
        project_id TEXT NOT NULL,
        datasource_id TEXT NOT NULL,
        source_table TEXT NOT NULL COLLATE NOCASE,
        source_column TEXT NOT NULL COLLATE NOCASE,
        target_table TEXT NOT NULL COLLATE NOCASE,
        target_column TEXT NOT NULL COLLATE NOCASE,
        provenance TEXT NOT NULL,
        reason TEXT NOT NULL,
        confidence REAL,
        recorded_at INTEGER NOT NULL,
        PRIMARY KEY (project_id, datasource_id, source_table, source_column, target_table, target_column)
    );
";

/// SQLite store for column metadata and relationships.
///
/// Clones share one connection. The async trait methods run their SQL on
/// the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the store database, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v > STORE_VERSION => {
                return Err(StoreError::UnsupportedVersion {
                    found: v,
                    supported: STORE_VERSION,
                })
            }
            Some(v) if v == STORE_VERSION => {}
            _ => {
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION.to_string()],
                )?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&SqliteStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Replace the column metadata recorded for a datasource.
    pub fn save_schema(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
        schema: &SchemaSnapshot,
    ) -> StoreResult<()> {
        let project = project_id.to_string();
        let datasource = datasource_id.to_string();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM column_profiles WHERE project_id = ? AND datasource_id = ?",
            params![project, datasource],
        )?;
        tx.execute(
            "DELETE FROM declared_foreign_keys WHERE project_id = ? AND datasource_id = ?",
            params![project, datasource],
        )?;

        for (ordinal, profile) in schema.columns.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO column_profiles
                 (project_id, datasource_id, table_name, column_name, ordinal, profile)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    project,
                    datasource,
                    profile.table,
                    profile.column,
                    ordinal as i64,
                    serde_json::to_string(profile)?
                ],
            )?;
        }

        for (ordinal, fk) in schema.foreign_keys.iter().enumerate() {
            tx.execute(
                "INSERT INTO declared_foreign_keys (project_id, datasource_id, ordinal, definition)
                 VALUES (?, ?, ?, ?)",
                params![project, datasource, ordinal as i64, serde_json::to_string(fk)?],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn read_schema(&self, project_id: Uuid, datasource_id: Uuid) -> StoreResult<SchemaSnapshot> {
        let project = project_id.to_string();
        let datasource = datasource_id.to_string();
        let conn = self.lock()?;

        let profiles: Vec<String> = conn
            .prepare(
                "SELECT profile FROM column_profiles
                 WHERE project_id = ? AND datasource_id = ? ORDER BY ordinal",
            )?
            .query_map(params![project, datasource], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let definitions: Vec<String> = conn
            .prepare(
                "SELECT definition FROM declared_foreign_keys
                 WHERE project_id = ? AND datasource_id = ? ORDER BY ordinal",
            )?
            .query_map(params![project, datasource], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let columns = profiles
            .iter()
            .map(|p| serde_json::from_str::<ColumnProfile>(p))
            .collect::<Result<Vec<_>, _>>()?;
        let foreign_keys = definitions
            .iter()
            .map(|d| serde_json::from_str::<DeclaredForeignKey>(d))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SchemaSnapshot {
            columns,
            foreign_keys,
        })
    }

    fn write_relationship(&self, record: &RelationshipRecord) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        delete_keyed(
            &tx,
            "relationship_rejections",
            record.project_id,
            record.datasource_id,
            &record.key,
        )?;
        tx.execute(
            "INSERT INTO relationships
             (project_id, datasource_id, source_table, source_column, target_table, target_column,
              cardinality, source_role, provenance, confidence, reasoning, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (project_id, datasource_id, source_table, source_column, target_table, target_column)
             DO UPDATE SET
                cardinality = excluded.cardinality,
                source_role = excluded.source_role,
                provenance = excluded.provenance,
                confidence = excluded.confidence,
                reasoning = excluded.reasoning,
                updated_at = excluded.updated_at",
            params![
                record.project_id.to_string(),
                record.datasource_id.to_string(),
                record.key.source_table,
                record.key.source_column,
                record.key.target_table,
                record.key.target_column,
                record.cardinality.as_str(),
                record.source_role,
                record.provenance.as_str(),
                record.confidence,
                record.reasoning,
                now_unix(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn write_rejection(&self, record: &RejectionRecord) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        delete_keyed(
            &tx,
            "relationships",
            record.project_id,
            record.datasource_id,
            &record.key,
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO relationship_rejections
             (project_id, datasource_id, source_table, source_column, target_table, target_column,
              provenance, reason, confidence, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.project_id.to_string(),
                record.datasource_id.to_string(),
                record.key.source_table,
                record.key.source_column,
                record.key.target_table,
                record.key.target_column,
                record.provenance.as_str(),
                record.reason,
                record.confidence,
                now_unix(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn read_relationships(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RelationshipRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT source_table, source_column, target_table, target_column,
                    cardinality, source_role, provenance, confidence, reasoning
             FROM relationships
             WHERE project_id = ? AND datasource_id = ?
             ORDER BY source_table, source_column, target_table, target_column",
        )?;

        let rows = stmt
            .query_map(
                params![project_id.to_string(), datasource_id.to_string()],
                |row| {
                    Ok((
                        RelationshipKey::new(
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ),
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, f64>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(key, cardinality, source_role, provenance, confidence, reasoning)| {
                    Ok(RelationshipRecord {
                        project_id,
                        datasource_id,
                        key,
                        cardinality: cardinality
                            .parse()
                            .map_err(|e: crate::discovery::ParseCardinalityError| {
                                StoreError::Corrupt(e.to_string())
                            })?,
                        source_role,
                        provenance: provenance.parse().map_err(StoreError::Corrupt)?,
                        confidence,
                        reasoning,
                    })
                },
            )
            .collect()
    }

    fn read_rejections(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RejectionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT source_table, source_column, target_table, target_column,
                    provenance, reason, confidence
             FROM relationship_rejections
             WHERE project_id = ? AND datasource_id = ?
             ORDER BY source_table, source_column, target_table, target_column",
        )?;

        let rows = stmt
            .query_map(
                params![project_id.to_string(), datasource_id.to_string()],
                |row| {
                    Ok((
                        RelationshipKey::new(
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ),
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<f64>>(6)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, provenance, reason, confidence)| {
                Ok(RejectionRecord {
                    project_id,
                    datasource_id,
                    key,
                    provenance: provenance.parse().map_err(StoreError::Corrupt)?,
                    reason,
                    confidence,
                })
            })
            .collect()
    }
}

/// Remove the row for `key` from one of the two keyed tables.
fn delete_keyed(
    conn: &Connection,
    table: &str,
    project_id: Uuid,
    datasource_id: Uuid,
    key: &RelationshipKey,
) -> StoreResult<usize> {
    let removed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE project_id = ? AND datasource_id = ?
             AND source_table = ? AND source_column = ? AND target_table = ? AND target_column = ?",
            table
        ),
        params![
            project_id.to_string(),
            datasource_id.to_string(),
            key.source_table,
            key.source_column,
            key.target_table,
            key.target_column,
        ],
    )?;
    if removed > 0 {
        tracing::debug!(relationship = %key, table, "superseded earlier outcome");
    }
    Ok(removed)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl ColumnMetadataReader for SqliteStore {
    async fn load_schema(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> MetadataResult<SchemaSnapshot> {
        let snapshot = self
            .blocking(move |store| store.read_schema(project_id, datasource_id))
            .await
            .map_err(|e| match e {
                StoreError::Json(e) => MetadataError::Corrupt(e.to_string()),
                other => MetadataError::Unavailable(other.to_string()),
            })?;

        if snapshot.columns.is_empty() {
            return Err(MetadataError::NotFound {
                project_id,
                datasource_id,
            });
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl RelationshipStore for SqliteStore {
    async fn upsert_relationship(&self, record: &RelationshipRecord) -> StoreResult<()> {
        let record = record.clone();
        self.blocking(move |store| store.write_relationship(&record))
            .await
    }

    async fn record_rejection(&self, record: &RejectionRecord) -> StoreResult<()> {
        let record = record.clone();
        self.blocking(move |store| store.write_rejection(&record)).await
    }

    async fn list_relationships(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RelationshipRecord>> {
        self.blocking(move |store| store.read_relationships(project_id, datasource_id))
            .await
    }

    async fn list_rejections(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RejectionRecord>> {
        self.blocking(move |store| store.read_rejections(project_id, datasource_id))
            .await
    }
}
