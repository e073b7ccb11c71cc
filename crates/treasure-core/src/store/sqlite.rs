//! SqliteStore - SQLite WAL implementation of [`MarkerStore`]
//!
//! - WAL mode: concurrent readers, serialized writers, across processes
//! - `markers.id` is the primary key (case-insensitive collation), and a
//!   unique index on the block keeps one marker per location
//! - `claims (marker_id, actor_id)` is the primary key: the at-most-once
//!   arbiter for every node sharing the file
//! - Claims cascade when their marker is deleted
//!
//! Connections come from an r2d2 pool; every new connection gets the busy
//! timeout and the WAL/foreign-key PRAGMAs before it is handed out.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::settings::{PoolSettings, StoreSettings, TableNames};
use super::{ClaimInsert, MarkerStore, SaveOutcome};
use crate::error::{Result, ResultExt, TreasureError};
use crate::types::{self, ActorId, BlockLocation, ClaimEntry, Marker};

/// Raw marker row before validation
type MarkerRow = (String, String, i32, i32, i32, String, i64);

/// SQLite-backed marker and claim storage
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    tables: TableNames,
}

impl SqliteStore {
    /// Open (or create) the store described by `settings` and migrate it
    pub fn open(settings: &StoreSettings) -> Result<Self> {
        settings.validate()?;
        let path = &settings.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }

        let manager = with_pragmas(SqliteConnectionManager::file(path), &settings.pool);
        let pool = Pool::builder()
            .max_size(settings.pool.max_size)
            .min_idle(Some(settings.pool.min_idle))
            .connection_timeout(settings.pool.connection_timeout())
            .idle_timeout(settings.pool.idle_timeout())
            .max_lifetime(settings.pool.max_lifetime())
            .build(manager)
            .with_context(|| format!("opening SQLite '{}'", path.display()))?;

        tracing::debug!(
            "Connection pool ready for {}: {} warm, max {}",
            path.display(),
            settings.pool.min_idle,
            settings.pool.max_size
        );
        Self::with_pool(pool, settings.tables.clone())
    }

    /// Open a file with default pool settings and table names
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(&StoreSettings {
            path: path.as_ref().to_path_buf(),
            ..StoreSettings::default()
        })
    }

    /// Private in-memory store on a single connection
    pub fn open_in_memory() -> Result<Self> {
        let settings = PoolSettings::default();
        let manager = with_pragmas(SqliteConnectionManager::memory(), &settings);
        // Each in-memory connection is its own database: keep exactly one, forever
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .connection_timeout(settings.connection_timeout())
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .context("opening in-memory SQLite")?;
        Self::with_pool(pool, TableNames::default())
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>, tables: TableNames) -> Result<Self> {
        tables.validate()?;
        let store = Self { pool, tables };
        store.migrate()?;
        Ok(store)
    }

    /// Idempotent DDL
    fn migrate(&self) -> Result<()> {
        let m = &self.tables.markers;
        let c = &self.tables.claims;
        let conn = self.pool.get()?;
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {m} (
                id          TEXT PRIMARY KEY COLLATE NOCASE,
                world       TEXT NOT NULL,
                x           INTEGER NOT NULL,
                y           INTEGER NOT NULL,
                z           INTEGER NOT NULL,
                action      TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            -- One marker per block
            CREATE UNIQUE INDEX IF NOT EXISTS idx_{m}_block
                ON {m}(world, x, y, z);

            CREATE TABLE IF NOT EXISTS {c} (
                marker_id   TEXT NOT NULL COLLATE NOCASE,
                actor_id    TEXT NOT NULL,
                claimed_at  INTEGER NOT NULL,
                PRIMARY KEY (marker_id, actor_id),
                FOREIGN KEY (marker_id) REFERENCES {m}(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_{c}_time
                ON {c}(marker_id, claimed_at);
            "
        ))
        .context("migrating schema")?;
        Ok(())
    }

    /// Table names in use
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Row counts
    pub fn stats(&self) -> Result<serde_json::Value> {
        let conn = self.pool.get()?;
        let markers: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.tables.markers),
            [],
            |row| row.get(0),
        )?;
        let claims: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.tables.claims),
            [],
            |row| row.get(0),
        )?;

        Ok(serde_json::json!({
            "markers": markers,
            "claims": claims,
            "pool_open": self.pool.state().connections,
            "wal_mode": true
        }))
    }
}

fn with_pragmas(manager: SqliteConnectionManager, pool: &PoolSettings) -> SqliteConnectionManager {
    let busy = pool.connection_timeout();
    manager.with_init(move |conn| {
        conn.busy_timeout(busy)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
    })
}

fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

impl MarkerStore for SqliteStore {
    fn load_all_markers(&self) -> Result<Vec<Marker>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, world, x, y, z, action, created_at FROM {}",
            self.tables.markers
        ))?;

        let rows = stmt
            .query_map([], |row| -> rusqlite::Result<MarkerRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<MarkerRow>>>()
            .context("reading marker rows")?;

        let mut markers = Vec::with_capacity(rows.len());
        for (id, world, x, y, z, action, created_ms) in rows {
            match Marker::with_created_at(
                id.clone(),
                BlockLocation::new(world, x, y, z),
                action,
                types::from_millis(created_ms),
            ) {
                Ok(marker) => markers.push(marker),
                Err(e) => tracing::warn!("Skipping unreadable marker row '{}': {}", id, e),
            }
        }
        Ok(markers)
    }

    fn save_marker(&self, marker: &Marker) -> Result<SaveOutcome> {
        let conn = self.pool.get()?;
        let loc = marker.location();
        let result = conn
            .prepare_cached(&format!(
                "INSERT INTO {} (id, world, x, y, z, action, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                self.tables.markers
            ))?
            .execute(params![
                marker.id(),
                loc.world,
                loc.x,
                loc.y,
                loc.z,
                marker.action(),
                marker.created_at().timestamp_millis()
            ]);

        match result.map_err(TreasureError::from) {
            Ok(_) => Ok(SaveOutcome::Saved),
            Err(e) if e.is_constraint_violation() => {
                tracing::debug!("Marker '{}' rejected by store: {}", marker.id(), e);
                Ok(SaveOutcome::AlreadyExists)
            }
            Err(e) => Err(e.context(format!("INSERT marker '{}'", marker.id()))),
        }
    }

    fn delete_marker(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let affected = conn
            .prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", self.tables.markers))?
            .execute(params![id])
            .with_context(|| format!("DELETE marker '{}'", id))?;
        Ok(affected > 0)
    }

    fn has_claim(&self, actor: &ActorId, marker_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let found = conn
            .prepare_cached(&format!(
                "SELECT 1 FROM {} WHERE marker_id = ?1 AND actor_id = ?2",
                self.tables.claims
            ))?
            .query_row(params![marker_id, actor.as_str()], |_| Ok(()))
            .optional()
            .context("SELECT claim")?;
        Ok(found.is_some())
    }

    fn insert_claim(&self, actor: &ActorId, marker_id: &str) -> Result<ClaimInsert> {
        let conn = self.pool.get()?;
        let result = conn
            .prepare_cached(&format!(
                "INSERT INTO {} (marker_id, actor_id, claimed_at) VALUES (?1, ?2, ?3)",
                self.tables.claims
            ))?
            .execute(params![
                marker_id,
                actor.as_str(),
                types::now().timestamp_millis()
            ]);

        match result {
            Ok(_) => Ok(ClaimInsert::Inserted),
            // The marker row is gone: not a lost race, the marker no longer exists
            Err(e) if is_foreign_key_violation(&e) => {
                Err(TreasureError::NotFound(format!("marker '{}'", marker_id)))
            }
            Err(e) => match TreasureError::from(e) {
                e if e.is_constraint_violation() => Ok(ClaimInsert::Duplicate),
                e => Err(e.context("INSERT claim")),
            },
        }
    }

    fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT actor_id, claimed_at FROM {}
             WHERE marker_id = ?1
             ORDER BY claimed_at ASC, rowid ASC",
            self.tables.claims
        ))?;

        let rows = stmt
            .query_map(params![marker_id], |row| {
                let actor: String = row.get(0)?;
                let claimed_ms: i64 = row.get(1)?;
                Ok(ClaimEntry {
                    actor_id: ActorId(actor),
                    claimed_at: types::from_millis(claimed_ms),
                })
            })
            .context("SELECT claims")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("reading claim rows")
    }

    fn claim_count(&self, marker_id: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn
            .prepare_cached(&format!(
                "SELECT COUNT(*) FROM {} WHERE marker_id = ?1",
                self.tables.claims
            ))?
            .query_row(params![marker_id], |row| row.get(0))
            .context("COUNT claims")?;
        Ok(count.max(0) as usize)
    }
}
