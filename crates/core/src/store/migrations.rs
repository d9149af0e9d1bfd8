//! Versioned schema for the artifacts database.
//!
//! Applied versions are recorded in `_migrations`; each pending script runs in
//! its own transaction together with its bookkeeping row.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// `(version, name, sql)` in ascending version order.
const MIGRATIONS: &[(i64, &str, &str)] = &[(1, "artifacts", include_str!("../../migrations/001_artifacts.sql"))];

/// Highest version this build knows how to apply.
pub const LATEST_VERSION: i64 = 1;

/// Apply every migration newer than the recorded version. Returns how many ran.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    conn.call(|conn| -> Result<usize, Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
        if current > LATEST_VERSION {
            return Err(Error::MigrationFailed(format!(
                "database is at version {current}, this build supports up to {LATEST_VERSION}"
            )));
        }

        let mut applied = 0;
        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version}_{name}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![version, name, super::artifacts::timestamp()],
            )?;
            tx.commit()?;

            tracing::info!(version, name, "applied migration");
            applied += 1;
        }

        Ok(applied)
    })
    .await
    .map_err(Error::from)
}
