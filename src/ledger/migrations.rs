//! Database lifecycle and schema migrations.

use crate::error::Result;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::Ledger;

impl Ledger {
    /// Open (or create) the ledger at `path` and bring its schema up to date
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Foreign keys cascade file/segment deletes; WAL keeps readers off writers
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        debug!("Opened ledger at {}", path.display());

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Private in-memory ledger, mostly for tests
    ///
    /// Uses a single connection so every query sees the same database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Close the pool, flushing WAL state
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_one(&mut *conn)
                .await?;

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: jobs, files and segments
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        info!("Applying ledger migration v1");

        // One transaction so a partial failure does not leave a half-built schema
        sqlx::query("BEGIN").execute(&mut *conn).await?;

        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    source_path TEXT NOT NULL,
                    stage_dir TEXT NOT NULL,
                    newsgroups TEXT NOT NULL,
                    poster TEXT NOT NULL,
                    subject TEXT NOT NULL,
                    state TEXT NOT NULL DEFAULT 'staged',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    nzb_path TEXT
                )
                "#,
            )
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    path TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    crc32 INTEGER NOT NULL,
                    part_size INTEGER NOT NULL,
                    total_parts INTEGER NOT NULL,
                    UNIQUE (job_id, name)
                )
                "#,
            )
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE segments (
                    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                    part INTEGER NOT NULL,
                    byte_offset INTEGER NOT NULL,
                    length INTEGER NOT NULL,
                    crc32 INTEGER,
                    state TEXT NOT NULL DEFAULT 'pending',
                    message_id TEXT,
                    newsgroups TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    posted_at INTEGER,
                    verified_at INTEGER,
                    PRIMARY KEY (file_id, part)
                )
                "#,
            )
            .execute(&mut *conn)
            .await?;

            sqlx::query("CREATE INDEX idx_segments_state ON segments(state, file_id, part)")
                .execute(&mut *conn)
                .await?;

            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
                .bind(super::now())
                .execute(&mut *conn)
                .await?;

            Ok::<(), sqlx::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e.into())
            }
        }
    }
}
