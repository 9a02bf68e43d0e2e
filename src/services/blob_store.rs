//! src/services/blob_store.rs
//!
//! BlobStore — a named key/value store of byte payloads with JSON metadata,
//! backed by SQLite for metadata rows and local disk for payload bytes
//! sharded beneath `base_path/{store}/{shard}/{shard}/{key}`. Several
//! stores can share one pool and one base directory; rows are keyed by
//! `(store, key)` so their keyspaces never collide.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("key `{key}` not found in store `{store}`")]
    KeyNotFound { store: String, key: String },
    #[error("invalid blob key")]
    InvalidKey,
    #[error("metadata for key `{key}` did not match the expected shape: {source}")]
    Metadata {
        key: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobStoreError>;

/// Embedded schema, applied statement by statement.
const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

/// Split migration SQL into executable statements.
///
/// `--` comment lines are dropped before splitting on `;`, so a semicolon
/// inside a comment cannot sever a statement. Inline trailing comments and
/// string literals containing `;` are not supported.
fn migration_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply the blob metadata schema. Every statement is idempotent, so this
/// runs on each startup as well as under `--migrate`.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = migration_statements(MIGRATION_SQL);

    tracing::info!("Running {} migration statements...", statements.len());
    for statement in &statements {
        sqlx::query(statement).execute(db).await?;
    }
    Ok(())
}

/// Metadata row as stored; `metadata` is the raw JSON column.
#[derive(sqlx::FromRow)]
struct BlobRow {
    key: String,
    size_bytes: i64,
    metadata: String,
    created_at: DateTime<Utc>,
}

/// One stored blob's metadata record.
#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub key: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl BlobRow {
    fn into_record(self) -> BlobResult<BlobRecord> {
        let metadata =
            serde_json::from_str(&self.metadata).map_err(|source| BlobStoreError::Metadata {
                key: self.key.clone(),
                source,
            })?;
        Ok(BlobRecord {
            key: self.key,
            size_bytes: self.size_bytes,
            metadata,
            created_at: self.created_at,
        })
    }
}

const MAX_KEY_LEN: usize = 1024;

/// BlobStore provides the storage operations the upload pipeline is built on:
/// - Set a blob (writes bytes to disk and upserts metadata into SQLite)
/// - Get a blob, with or without its typed metadata
/// - Open a blob for streaming out
/// - List blobs by key prefix (query SQLite)
/// - Delete a blob (removes the row and best-effort removes the file)
///
/// This struct intentionally keeps a minimal surface area so it is easy to
/// test and reason about.
#[derive(Clone)]
pub struct BlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,

    /// Store name; namespaces both the disk tree and the metadata rows.
    store: String,
}

impl BlobStore {
    /// Create a store named `store` backed by the provided SQLite pool and
    /// using `base_path` as the root directory for blob payloads.
    pub fn named(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        store: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            store: store.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that are empty, too long, begin with `/`, or contain
    /// `..`, control characters, or backslashes.
    fn ensure_key_safe(&self, key: &str) -> BlobResult<()> {
        if key.is_empty() {
            return Err(BlobStoreError::InvalidKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(BlobStoreError::InvalidKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(BlobStoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(BlobStoreError::InvalidKey);
        }
        Ok(())
    }

    /// Physical root folder for this store's payloads.
    fn store_root(&self) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(&self.store);
        path
    }

    /// Generate two-level shard identifiers for a key.
    ///
    /// Uses MD5(store/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn blob_shards(store: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", store, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified payload path.
    ///
    /// Combines base_path/store/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::blob_shards(&self.store, key);
        let mut path = self.store_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Fetch a blob's metadata row from SQLite.
    ///
    /// Returns KeyNotFound if missing.
    async fn fetch_row(&self, key: &str) -> BlobResult<BlobRow> {
        sqlx::query_as::<_, BlobRow>(
            "SELECT key, size_bytes, metadata, created_at
             FROM blobs WHERE store = ? AND key = ?",
        )
        .bind(&self.store)
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => BlobStoreError::KeyNotFound {
                store: self.store.clone(),
                key: key.to_string(),
            },
            other => BlobStoreError::Sqlx(other),
        })
    }

    /// Write a blob to disk and upsert its metadata row.
    ///
    /// - Writes bytes to a temporary file in the final directory.
    /// - Atomically renames into final location.
    /// - Upserts the metadata row, so setting an existing key overwrites
    ///   both payload and metadata.
    ///
    /// Ensures durable writes (fsync) and cleans up temp files on errors.
    pub async fn set<M: Serialize>(
        &self,
        key: &str,
        bytes: Bytes,
        meta: &M,
    ) -> BlobResult<BlobRecord> {
        self.ensure_key_safe(key)?;
        let metadata = serde_json::to_string(meta).map_err(|source| BlobStoreError::Metadata {
            key: key.to_string(),
            source,
        })?;

        let file_path = self.blob_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = file.write_all(&bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobStoreError::Io(err));
            }
        }

        let size_bytes = bytes.len() as i64;
        let created_at = Utc::now();

        let insert_result = sqlx::query_as::<_, BlobRow>(
            r#"
            INSERT INTO blobs (store, key, size_bytes, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(store, key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                metadata = excluded.metadata,
                created_at = excluded.created_at
            RETURNING key, size_bytes, metadata, created_at
            "#,
        )
        .bind(&self.store)
        .bind(key)
        .bind(size_bytes)
        .bind(&metadata)
        .bind(created_at)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(row) => {
                debug!(
                    store = %self.store,
                    key = %key,
                    size_bytes,
                    "stored blob"
                );
                row.into_record()
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(BlobStoreError::Sqlx(err))
            }
        }
    }

    /// Read a blob's payload whole.
    ///
    /// Returns KeyNotFound if either the metadata row or the physical file
    /// is missing.
    pub async fn get(&self, key: &str) -> BlobResult<Bytes> {
        self.ensure_key_safe(key)?;
        self.fetch_row(key).await?;

        let file_path = self.blob_path(key);
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobStoreError::KeyNotFound {
                store: self.store.clone(),
                key: key.to_string(),
            }),
            Err(err) => Err(BlobStoreError::Io(err)),
        }
    }

    /// Read a blob's payload together with its metadata, decoded as `M`.
    pub async fn get_with_metadata<M: DeserializeOwned>(
        &self,
        key: &str,
    ) -> BlobResult<(Bytes, M)> {
        self.ensure_key_safe(key)?;
        let row = self.fetch_row(key).await?;
        let meta = serde_json::from_str(&row.metadata).map_err(|source| {
            BlobStoreError::Metadata {
                key: key.to_string(),
                source,
            }
        })?;

        let file_path = self.blob_path(key);
        match fs::read(&file_path).await {
            Ok(bytes) => Ok((Bytes::from(bytes), meta)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobStoreError::KeyNotFound {
                store: self.store.clone(),
                key: key.to_string(),
            }),
            Err(err) => Err(BlobStoreError::Io(err)),
        }
    }

    /// Fetch a blob for reading.
    ///
    /// Returns the metadata record and an opened File handle ready for
    /// streaming out. Returns KeyNotFound if the metadata row exists but
    /// the physical file is missing.
    pub async fn reader(&self, key: &str) -> BlobResult<(BlobRecord, File)> {
        self.ensure_key_safe(key)?;
        let record = self.fetch_row(key).await?.into_record()?;

        let file_path = self.blob_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobStoreError::KeyNotFound {
                    store: self.store.clone(),
                    key: key.to_string(),
                }
            } else {
                BlobStoreError::Io(err)
            }
        })?;

        Ok((record, file))
    }

    /// List blobs whose keys start with `prefix`, in ascending key order.
    ///
    /// An empty prefix lists the whole store.
    pub async fn list(&self, prefix: &str) -> BlobResult<Vec<BlobRecord>> {
        let rows = sqlx::query_as::<_, BlobRow>(
            "SELECT key, size_bytes, metadata, created_at
             FROM blobs WHERE store = ? AND key LIKE ?
             ORDER BY key ASC",
        )
        .bind(&self.store)
        .bind(format!("{}%", prefix))
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter().map(BlobRow::into_record).collect()
    }

    /// Delete a blob's metadata row and attempt to remove its payload.
    ///
    /// - Removes the metadata row
    /// - Deletes the physical file best-effort
    /// - Prunes empty shard directories
    ///
    /// Returns KeyNotFound if the row was already gone.
    pub async fn delete(&self, key: &str) -> BlobResult<()> {
        self.ensure_key_safe(key)?;
        let result = sqlx::query("DELETE FROM blobs WHERE store = ? AND key = ?")
            .bind(&self.store)
            .bind(key)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BlobStoreError::KeyNotFound {
                store: self.store.clone(),
                key: key.to_string(),
            });
        }

        let file_path = self.blob_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(BlobStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let store_root = self.store_root();
            self.prune_empty_dirs(parent, &store_root).await;
        }

        Ok(())
    }

    /// Recursively remove empty directories up to the store root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}
