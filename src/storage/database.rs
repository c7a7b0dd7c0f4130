//! SQLite connection pool and schema migrations for the passage store

use crate::error::{DocqaError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled SQLite handle, migrated on open
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path`
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocqaError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| DocqaError::Storage(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| DocqaError::Storage(format!("Failed to get connection: {}", e)))
    }

    /// Apply pending schema steps, each in its own transaction
    fn migrate(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied: usize = conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;

        for (step, sql) in MIGRATIONS.iter().enumerate().skip(applied) {
            let version = step as i64 + 1;
            tracing::info!("Migrating passage store to schema v{}", version);

            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
        }

        Ok(())
    }
}

/// Ordered schema steps; step N is recorded as version N
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE passages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        page INTEGER NOT NULL CHECK (page >= 1),
        chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
        text TEXT NOT NULL,
        text_hash TEXT NOT NULL,
        embedding BLOB NOT NULL,
        ingested_at TEXT NOT NULL,
        UNIQUE (source, page, chunk_index)
    );

    CREATE INDEX idx_passages_source ON passages(source);

    CREATE TABLE store_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#,
];
