pub mod pool;

use std::path::Path;

use anyhow::Context;
use rusqlite::OptionalExtension;

pub use pool::DbPool;

/// A schema change, applied once and recorded in `_migrations`.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial",
    sql: include_str!("migrations/001_initial.sql"),
}];

/// Open the database at `path` and bring its schema up to date.
pub fn open(path: impl AsRef<Path>, readers: usize) -> anyhow::Result<DbPool> {
    let path = path.as_ref();
    let pool = DbPool::open(path, readers)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    run_migrations(&pool).context("failed to run database migrations")?;
    Ok(pool)
}

/// Apply every migration newer than the recorded schema version. Each one
/// commits together with its bookkeeping row, so a failure leaves the schema
/// at the last good version. Returns how many were applied.
pub fn run_migrations(pool: &DbPool) -> anyhow::Result<usize> {
    pool.write(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            )",
        )?;
        Ok(())
    })?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        let ran = pool.transaction(|tx| {
            if schema_version(tx)? >= migration.version {
                return Ok(false);
            }
            tx.execute_batch(migration.sql)
                .with_context(|| format!("migration {:03}_{}", migration.version, migration.name))?;
            tx.execute(
                "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
                rusqlite::params![migration.version, migration.name],
            )?;
            Ok(true)
        })?;
        if ran {
            tracing::info!(version = migration.version, name = migration.name, "applied migration");
            applied += 1;
        }
    }
    Ok(applied)
}

fn schema_version(conn: &rusqlite::Connection) -> anyhow::Result<i64> {
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}
