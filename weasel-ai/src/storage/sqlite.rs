//! SQLite-backed blob store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use weasel_common::metadata::RawMetadata;
use weasel_common::time::{now_rfc3339, parse_rfc3339};

use super::{BlobItem, BlobProperties, BlobStore, StorageError};

/// Blob store kept in two SQLite tables (`containers`, `blobs`)
#[derive(Clone)]
pub struct SqliteBlobStore {
    pool: SqlitePool,
}

impl SqliteBlobStore {
    /// Connect using a SQLite URL and create the tables if missing
    ///
    /// For file URLs the parent directory is created first.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        if let Some(path) = database_file(url) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Backend(format!("Create {} failed: {}", parent.display(), e))
                })?;
            }
        }

        tracing::debug!("Connecting to blob database: {}", url);
        let pool = SqlitePool::connect(url).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory store; every handle shares the single connection
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn require_container(&self, container: &str) -> Result<(), StorageError> {
        if self.container_exists(container).await? {
            Ok(())
        } else {
            Err(StorageError::ContainerNotFound(container.to_string()))
        }
    }
}

/// Filesystem path named by a `sqlite://` URL, if it names a file
fn database_file(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or("");
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS containers (
            name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blobs (
            container TEXT NOT NULL,
            name TEXT NOT NULL,
            content BLOB NOT NULL,
            content_type TEXT NOT NULL,
            content_length INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (container, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Blob tables initialized (containers, blobs)");
    Ok(())
}

fn timestamp(value: &str) -> DateTime<Utc> {
    parse_rfc3339(value).unwrap_or_else(Utc::now)
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn create_container(&self, container: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("INSERT OR IGNORE INTO containers (name, created_at) VALUES (?, ?)")
            .bind(container)
            .bind(now_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StorageError> {
        let found: Option<String> = sqlx::query_scalar("SELECT name FROM containers WHERE name = ?")
            .bind(container)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn create(
        &self,
        container: &str,
        name: &str,
        content: &[u8],
        content_type: &str,
        metadata: &RawMetadata,
    ) -> Result<(), StorageError> {
        self.require_container(container).await?;

        let metadata_json = serde_json::to_string(metadata)?;
        let now = now_rfc3339();

        let inserted = sqlx::query(
            r#"
            INSERT INTO blobs (
                container, name, content, content_type, content_length,
                metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(container)
        .bind(name)
        .bind(content)
        .bind(content_type)
        .bind(content.len() as i64)
        .bind(&metadata_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed") =>
            {
                Err(StorageError::already_exists(container, name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        content: &[u8],
        content_type: &str,
        metadata: &RawMetadata,
    ) -> Result<(), StorageError> {
        self.require_container(container).await?;

        let metadata_json = serde_json::to_string(metadata)?;
        let now = now_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO blobs (
                container, name, content, content_type, content_length,
                metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(container, name) DO UPDATE SET
                content = excluded.content,
                content_type = excluded.content_type,
                content_length = excluded.content_length,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(container)
        .bind(name)
        .bind(content)
        .bind(content_type)
        .bind(content.len() as i64)
        .bind(&metadata_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        self.require_container(container).await?;

        let content: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT content FROM blobs WHERE container = ? AND name = ?")
                .bind(container)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        content.ok_or_else(|| StorageError::not_found(container, name))
    }

    async fn properties(&self, container: &str, name: &str) -> Result<BlobProperties, StorageError> {
        self.require_container(container).await?;

        let row = sqlx::query(
            r#"
            SELECT content_type, content_length, metadata, created_at, updated_at
            FROM blobs
            WHERE container = ? AND name = ?
            "#,
        )
        .bind(container)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found(container, name))?;

        let metadata: String = row.try_get("metadata")?;
        let content_length: i64 = row.try_get("content_length")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(BlobProperties {
            content_length: content_length.max(0) as u64,
            content_type: row.try_get("content_type")?,
            metadata: serde_json::from_str(&metadata)?,
            created_at: timestamp(&created_at),
            last_modified: timestamp(&updated_at),
        })
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        self.require_container(container).await?;

        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM blobs WHERE container = ? AND name = ?")
                .bind(container)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: &RawMetadata,
    ) -> Result<(), StorageError> {
        self.require_container(container).await?;

        let result = sqlx::query(
            "UPDATE blobs SET metadata = ?, updated_at = ? WHERE container = ? AND name = ?",
        )
        .bind(serde_json::to_string(metadata)?)
        .bind(now_rfc3339())
        .bind(container)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(container, name));
        }
        Ok(())
    }

    async fn list(
        &self,
        container: &str,
        prefix: &str,
        max_results: usize,
    ) -> Result<Vec<BlobItem>, StorageError> {
        self.require_container(container).await?;

        // substr comparison avoids LIKE wildcard escaping in prefixes
        let rows = sqlx::query(
            r#"
            SELECT name, content_length, updated_at
            FROM blobs
            WHERE container = ? AND substr(name, 1, ?) = ?
            ORDER BY name
            LIMIT ?
            "#,
        )
        .bind(container)
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .bind(max_results.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<BlobItem, StorageError> {
                let content_length: i64 = row.try_get("content_length")?;
                let updated_at: String = row.try_get("updated_at")?;
                Ok(BlobItem {
                    name: row.try_get("name")?,
                    content_length: content_length.max(0) as u64,
                    last_modified: timestamp(&updated_at),
                })
            })
            .collect()
    }

    async fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        self.require_container(container).await?;

        let result = sqlx::query("DELETE FROM blobs WHERE container = ? AND name = ?")
            .bind(container)
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(container, name));
        }
        Ok(())
    }

    async fn copy(
        &self,
        source_container: &str,
        source_name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), StorageError> {
        self.require_container(source_container).await?;
        self.require_container(dest_container).await?;

        let now = now_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO blobs (
                container, name, content, content_type, content_length,
                metadata, created_at, updated_at
            )
            SELECT ?, ?, content, content_type, content_length, metadata, ?, ?
            FROM blobs
            WHERE container = ? AND name = ?
            "#,
        )
        .bind(dest_container)
        .bind(dest_name)
        .bind(&now)
        .bind(&now)
        .bind(source_container)
        .bind(source_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(source_container, source_name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteBlobStore {
        let store = SqliteBlobStore::in_memory().await.unwrap();
        store.create_container("raw").await.unwrap();
        store.create_container("backups").await.unwrap();
        store
    }

    fn meta(pairs: &[(&str, &str)]) -> RawMetadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_database_file_from_url() {
        assert_eq!(
            database_file("sqlite:///var/lib/weasel/blobs.db?mode=rwc"),
            Some(Path::new("/var/lib/weasel/blobs.db"))
        );
        assert_eq!(database_file("sqlite::memory:"), None);
        assert_eq!(database_file("postgres://x"), None);
    }

    #[tokio::test]
    async fn test_create_container_reports_existing() {
        let store = store().await;
        assert!(!store.create_container("raw").await.unwrap());
        assert!(store.create_container("processed").await.unwrap());
        assert!(store.container_exists("processed").await.unwrap());
        assert!(!store.container_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_get_properties() {
        let store = store().await;
        store
            .put("raw", "a.json", b"{\"x\":1}", "application/json", &meta(&[("status", "uploaded")]))
            .await
            .unwrap();

        assert_eq!(store.get("raw", "a.json").await.unwrap(), b"{\"x\":1}");
        let props = store.properties("raw", "a.json").await.unwrap();
        assert_eq!(props.content_length, 7);
        assert_eq!(props.content_type, "application/json");
        assert_eq!(props.metadata["status"], "uploaded");
        assert!(store.exists("raw", "a.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_never_overwrites() {
        let store = store().await;
        store
            .create("raw", "a.json", b"{\"n\":1}", "application/json", &meta(&[("callid", "FIRST")]))
            .await
            .unwrap();

        let err = store
            .create("raw", "a.json", b"{\"n\":22}", "application/json", &meta(&[("callid", "SECOND")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { ref name, .. } if name == "a.json"));

        assert_eq!(store.get("raw", "a.json").await.unwrap(), b"{\"n\":1}");
        assert_eq!(store.properties("raw", "a.json").await.unwrap().metadata["callid"], "FIRST");
    }

    #[tokio::test]
    async fn test_missing_blob_and_container() {
        let store = store().await;
        assert!(store.get("raw", "missing.json").await.unwrap_err().is_not_found());
        assert!(store.delete("raw", "missing.json").await.unwrap_err().is_not_found());
        assert!(matches!(
            store.get("absent", "a.json").await,
            Err(StorageError::ContainerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_prefix_in_name_order() {
        let store = store().await;
        for name in ["2025/10/14/b.json", "2025/10/14/a.json", "2025/10/15/c.json", "flat_%.json"] {
            store.put("raw", name, b"{}", "application/json", &RawMetadata::new()).await.unwrap();
        }

        let items = store.list("raw", "2025/10/14/", 1000).await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["2025/10/14/a.json", "2025/10/14/b.json"]);

        assert_eq!(store.list("raw", "", 2).await.unwrap().len(), 2);
        assert_eq!(store.list("raw", "flat_%", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_metadata_and_copy() {
        let store = store().await;
        store.put("raw", "a.json", b"{}", "application/json", &RawMetadata::new()).await.unwrap();
        store.set_metadata("raw", "a.json", &meta(&[("status", "analyzed")])).await.unwrap();
        store.copy("raw", "a.json", "backups", "a_backup.json").await.unwrap();

        let props = store.properties("backups", "a_backup.json").await.unwrap();
        assert_eq!(props.metadata["status"], "analyzed");
        assert!(store
            .copy("raw", "missing.json", "backups", "x.json")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
