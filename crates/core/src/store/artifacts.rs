//! Artifact CRUD operations.
//!
//! Rows are never deleted by the store: flushing marks them expired so the
//! history of a resource key stays queryable.

use super::connection::ArtifactDb;
use crate::Error;
use crate::url::ResourceKey;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Longest file name the artifacts table accepts.
pub const MAX_FILE_NAME_LEN: usize = 150;

/// A produced artifact as persisted in the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Artifact {
    pub id: String,
    pub resource_key: String,
    pub file_name: String,
    pub content: Vec<u8>,
    pub original_urls: String,
    pub is_expired: bool,
    pub last_updated: String,
}

impl Artifact {
    /// A fresh, non-expired artifact stamped with the current time.
    pub fn new(key: ResourceKey, file_name: &str, content: &[u8], original_urls: &str) -> Self {
        Self {
            id: artifact_id(file_name),
            resource_key: key.to_hex(),
            file_name: file_name.to_string(),
            content: content.to_vec(),
            original_urls: original_urls.to_string(),
            is_expired: false,
            last_updated: timestamp(),
        }
    }
}

/// Upsert key for a stored file name.
pub fn artifact_id(file_name: &str) -> String {
    hex::encode(Sha256::digest(file_name.as_bytes()))
}

/// Fixed-width RFC 3339 so timestamps sort lexically.
pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Latest live file name per resource key, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub resource_key: String,
    pub file_name: String,
    pub last_updated: String,
}

impl ArtifactDb {
    /// Insert or update an artifact.
    ///
    /// On an existing id the content, original urls and timestamp are replaced
    /// and the row is revived if it had been expired.
    pub async fn upsert_artifact(&self, artifact: &Artifact) -> Result<(), Error> {
        if artifact.file_name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(Error::FileNameTooLong(artifact.file_name.clone()));
        }

        let artifact = artifact.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO artifacts (
                    id, resource_key, file_name, content, original_urls, is_expired, last_updated
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    original_urls = excluded.original_urls,
                    is_expired = excluded.is_expired,
                    last_updated = excluded.last_updated",
                    params![
                        &artifact.id,
                        &artifact.resource_key,
                        &artifact.file_name,
                        &artifact.content,
                        &artifact.original_urls,
                        artifact.is_expired as i32,
                        &artifact.last_updated,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an artifact by id, expired or not.
    pub async fn get_artifact(&self, id: &str) -> Result<Option<Artifact>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Artifact>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, resource_key, file_name, content, original_urls, is_expired, last_updated
                FROM artifacts WHERE id = ?1",
                )?;

                let result = stmt.query_row(params![id], |row| {
                    Ok(Artifact {
                        id: row.get(0)?,
                        resource_key: row.get(1)?,
                        file_name: row.get(2)?,
                        content: row.get(3)?,
                        original_urls: row.get(4)?,
                        is_expired: row.get::<_, i32>(5)? == 1,
                        last_updated: row.get(6)?,
                    })
                });

                match result {
                    Ok(a) => Ok(Some(a)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Content of a live artifact. Expired rows are treated as absent.
    pub async fn get_live_content(&self, id: &str) -> Result<Option<Vec<u8>>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let result = conn.query_row(
                    "SELECT content FROM artifacts WHERE id = ?1 AND is_expired = 0",
                    params![id],
                    |row| row.get(0),
                );

                match result {
                    Ok(content) => Ok(Some(content)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Mark every live artifact of `key` expired; the nil key expires all.
    ///
    /// Returns the number of rows that changed.
    pub async fn expire_artifacts(&self, key: ResourceKey) -> Result<u64, Error> {
        let now = timestamp();
        let key = (!key.is_nil()).then(|| key.to_hex());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = match key {
                    Some(key) => conn.execute(
                        "UPDATE artifacts SET is_expired = 1, last_updated = ?1
                        WHERE resource_key = ?2 AND is_expired = 0",
                        params![now, key],
                    )?,
                    None => conn.execute(
                        "UPDATE artifacts SET is_expired = 1, last_updated = ?1 WHERE is_expired = 0",
                        params![now],
                    )?,
                };
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// File names stored for `key` (all keys for nil), expired or not.
    pub async fn file_names_for_key(&self, key: ResourceKey) -> Result<Vec<String>, Error> {
        let key = (!key.is_nil()).then(|| key.to_hex());
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let names = match key {
                    Some(key) => {
                        let mut stmt = conn.prepare("SELECT file_name FROM artifacts WHERE resource_key = ?1")?;
                        let names = stmt
                            .query_map(params![key], |row| row.get(0))?
                            .collect::<Result<Vec<String>, _>>()?;
                        names
                    }
                    None => {
                        let mut stmt = conn.prepare("SELECT file_name FROM artifacts")?;
                        let names = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                        names
                    }
                };
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Live artifacts ordered oldest first, so later entries supersede earlier ones per key.
    pub async fn live_files(&self) -> Result<Vec<SavedFile>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<SavedFile>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT resource_key, file_name, last_updated FROM artifacts
                    WHERE is_expired = 0 ORDER BY last_updated ASC",
                )?;
                let files = stmt
                    .query_map([], |row| {
                        Ok(SavedFile { resource_key: row.get(0)?, file_name: row.get(1)?, last_updated: row.get(2)? })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(files)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::for_urls(s)
    }

    fn make_artifact(k: ResourceKey, sig: &str) -> Artifact {
        let file_name = format!("{}-{}-RequestReducedStyle.css", k.to_hex(), sig.repeat(32));
        Artifact::new(k, &file_name, b"body{}", "a.css::b.css")
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        let artifact = make_artifact(key("a"), "1");

        db.upsert_artifact(&artifact).await.unwrap();

        let retrieved = db.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(retrieved.file_name, artifact.file_name);
        assert_eq!(retrieved.content, b"body{}");
        assert_eq!(retrieved.original_urls, "a.css::b.css");
        assert!(!retrieved.is_expired);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        assert!(db.get_artifact("nonexistent").await.unwrap().is_none());
        assert!(db.get_live_content("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        let mut artifact = make_artifact(key("a"), "1");
        db.upsert_artifact(&artifact).await.unwrap();
        db.expire_artifacts(key("a")).await.unwrap();

        artifact.content = b"body{color:red}".to_vec();
        artifact.last_updated = timestamp();
        db.upsert_artifact(&artifact).await.unwrap();

        let retrieved = db.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(retrieved.content, b"body{color:red}");
        assert!(!retrieved.is_expired);
    }

    #[tokio::test]
    async fn test_file_name_too_long() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        let artifact = Artifact::new(key("a"), &"x".repeat(151), b"", "");
        let result = db.upsert_artifact(&artifact).await;
        assert!(matches!(result, Err(Error::FileNameTooLong(_))));
    }

    #[tokio::test]
    async fn test_expire_by_key() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        let a = make_artifact(key("a"), "1");
        let b = make_artifact(key("b"), "2");
        db.upsert_artifact(&a).await.unwrap();
        db.upsert_artifact(&b).await.unwrap();

        assert_eq!(db.expire_artifacts(key("a")).await.unwrap(), 1);
        assert_eq!(db.expire_artifacts(key("a")).await.unwrap(), 0);

        assert!(db.get_live_content(&a.id).await.unwrap().is_none());
        assert!(db.get_live_content(&b.id).await.unwrap().is_some());
        assert!(db.get_artifact(&a.id).await.unwrap().unwrap().is_expired);
    }

    #[tokio::test]
    async fn test_expire_all() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        db.upsert_artifact(&make_artifact(key("a"), "1")).await.unwrap();
        db.upsert_artifact(&make_artifact(key("b"), "2")).await.unwrap();

        assert_eq!(db.expire_artifacts(ResourceKey::NIL).await.unwrap(), 2);
        assert!(db.live_files().await.unwrap().is_empty());
        assert_eq!(db.file_names_for_key(ResourceKey::NIL).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_live_files_ordering() {
        let db = ArtifactDb::open_in_memory().await.unwrap();
        let mut older = make_artifact(key("a"), "1");
        older.last_updated = "2025-01-01T00:00:00.000000Z".into();
        let mut newer = make_artifact(key("a"), "2");
        newer.last_updated = "2025-01-02T00:00:00.000000Z".into();

        db.upsert_artifact(&newer).await.unwrap();
        db.upsert_artifact(&older).await.unwrap();

        let files = db.live_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].file_name, newer.file_name);
    }

    #[test]
    fn test_artifact_id_stable() {
        assert_eq!(artifact_id("a.css"), artifact_id("a.css"));
        assert_ne!(artifact_id("a.css"), artifact_id("b.css"));
        assert_eq!(artifact_id("a.css").len(), 64);
    }
}
