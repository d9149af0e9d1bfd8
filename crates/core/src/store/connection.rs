//! SQLite handle for the durable store.

use std::path::Path;

use tokio_rusqlite::Connection;

use super::migrations;
use crate::Error;

/// WAL so readers serving artifacts never wait on a save.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=5000;
     PRAGMA temp_store=MEMORY;";

/// Artifact database handle.
///
/// Queries run on tokio-rusqlite's background thread. Clones share it.
#[derive(Clone, Debug)]
pub struct ArtifactDb {
    pub(crate) conn: Connection,
}

impl ArtifactDb {
    /// Open or create the database file, creating missing parent directories,
    /// then bring the schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS)).await.map_err(Error::Database)?;

        let applied = migrations::run(&conn).await?;
        tracing::debug!(applied, "artifact database ready");

        Ok(Self { conn })
    }
}
