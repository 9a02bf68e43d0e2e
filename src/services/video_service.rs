//! src/services/video_service.rs
//!
//! VideoService — chunked upload intake and published-video access.
//! Chunks and finished videos live in two separate blob stores sharing
//! one pool and base directory, so a half-finished upload can never be
//! confused with a playable video.

use crate::models::chunk::ChunkMeta;
use crate::models::video::{VideoEntry, VideoMeta};
use crate::services::blob_store::{BlobRecord, BlobResult, BlobStore, BlobStoreError};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tracing::{info, warn};

/// Store holding in-flight chunk records, keyed `{uploadId}/chunk-{index}`.
pub const CHUNK_STORE: &str = "video-chunks";
/// Store holding published videos, keyed `{propertyId}/{videoType}/{filename}`.
pub const VIDEO_STORE: &str = "property-videos";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("missing chunk {0}")]
    MissingChunk(u32),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// One incoming chunk, already validated by the HTTP layer.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub property_id: String,
    pub video_type: String,
    pub filename: String,
    pub payload: Bytes,
}

/// Outcome of receiving one chunk.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    /// Chunk stored; more are expected. `received` is `chunk_index + 1`.
    Accepted { received: u32, total: u32 },
    /// The declared last index arrived and reassembly published the video
    /// under `key`.
    Complete { key: String },
}

/// VideoService owns the two blob stores backing the upload pipeline.
/// Cloning is cheap, so the router holds it as shared state.
#[derive(Clone)]
pub struct VideoService {
    chunks: BlobStore,
    videos: BlobStore,
}

impl VideoService {
    /// Create the service with both stores rooted at `base_path`.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            chunks: BlobStore::named(db.clone(), base_path.clone(), CHUNK_STORE),
            videos: BlobStore::named(db, base_path, VIDEO_STORE),
        }
    }

    /// The store holding in-flight chunks.
    pub fn chunk_store(&self) -> &BlobStore {
        &self.chunks
    }

    /// The store holding published videos.
    pub fn video_store(&self) -> &BlobStore {
        &self.videos
    }

    fn chunk_key(upload_id: &str, index: u32) -> String {
        format!("{}/chunk-{}", upload_id, index)
    }

    fn video_key(property_id: &str, video_type: &str, filename: &str) -> String {
        format!("{}/{}/{}", property_id, video_type, filename)
    }

    /// Persist one chunk and trigger reassembly when the declared last
    /// index arrives.
    ///
    /// Completion is positional: receiving `chunk_index == total_chunks - 1`
    /// starts reassembly regardless of how many chunks are actually stored,
    /// so a last chunk arriving before the others fails with a
    /// missing-chunk error. Re-sending an index overwrites the stored chunk.
    pub async fn receive_chunk(&self, upload: ChunkUpload) -> UploadResult<ChunkOutcome> {
        let meta = ChunkMeta {
            upload_id: upload.upload_id.clone(),
            chunk_index: upload.chunk_index,
            total_chunks: upload.total_chunks,
            property_id: upload.property_id.clone(),
            video_type: upload.video_type.clone(),
            filename: upload.filename.clone(),
        };
        let key = Self::chunk_key(&upload.upload_id, upload.chunk_index);
        self.chunks.set(&key, upload.payload, &meta).await?;

        // exact positional test; an index beyond the declared last one is
        // stored but never triggers reassembly
        if Some(upload.chunk_index) == upload.total_chunks.checked_sub(1) {
            let key = self
                .reassemble(
                    &upload.upload_id,
                    upload.total_chunks,
                    &upload.property_id,
                    &upload.video_type,
                    &upload.filename,
                )
                .await?;
            return Ok(ChunkOutcome::Complete { key });
        }

        Ok(ChunkOutcome::Accepted {
            received: upload.chunk_index.saturating_add(1),
            total: upload.total_chunks,
        })
    }

    /// Read chunks `0..total_chunks` in order, concatenate them into one
    /// buffer, publish the result, then clear the chunk records.
    ///
    /// Fails fast on the first absent index. A failed publish leaves every
    /// chunk in place; chunk cleanup failures after a successful publish
    /// are logged and do not fail the upload.
    async fn reassemble(
        &self,
        upload_id: &str,
        total_chunks: u32,
        property_id: &str,
        video_type: &str,
        filename: &str,
    ) -> UploadResult<String> {
        let mut parts: Vec<Bytes> = Vec::with_capacity(total_chunks as usize);
        for index in 0..total_chunks {
            let chunk_key = Self::chunk_key(upload_id, index);
            match self.chunks.get(&chunk_key).await {
                Ok(bytes) => parts.push(bytes),
                Err(BlobStoreError::KeyNotFound { .. }) => {
                    return Err(UploadError::MissingChunk(index));
                }
                Err(err) => return Err(err.into()),
            }
        }

        let total_len: usize = parts.iter().map(Bytes::len).sum();
        let mut combined = BytesMut::with_capacity(total_len);
        for part in &parts {
            combined.extend_from_slice(part);
        }

        let key = Self::video_key(property_id, video_type, filename);
        let meta = VideoMeta {
            property_id: property_id.to_string(),
            video_type: video_type.to_string(),
            filename: filename.to_string(),
            size: total_len as u64,
            uploaded_at: Utc::now(),
        };
        self.videos.set(&key, combined.freeze(), &meta).await?;

        info!(
            key = %key,
            upload_id = %upload_id,
            chunks = total_chunks,
            size_bytes = total_len,
            "reassembled video published"
        );

        for index in 0..total_chunks {
            let chunk_key = Self::chunk_key(upload_id, index);
            if let Err(err) = self.chunks.delete(&chunk_key).await {
                warn!(
                    key = %chunk_key,
                    error = %err,
                    "failed to clear chunk record after publish"
                );
            }
        }

        Ok(key)
    }

    /// Store a whole video delivered in a single request.
    pub async fn store_video(
        &self,
        property_id: &str,
        video_type: &str,
        filename: &str,
        payload: Bytes,
    ) -> UploadResult<String> {
        let key = Self::video_key(property_id, video_type, filename);
        let meta = VideoMeta {
            property_id: property_id.to_string(),
            video_type: video_type.to_string(),
            filename: filename.to_string(),
            size: payload.len() as u64,
            uploaded_at: Utc::now(),
        };
        let size_bytes = payload.len();
        self.videos.set(&key, payload, &meta).await?;

        info!(key = %key, size_bytes, "video stored");
        Ok(key)
    }

    /// Open a published video for streaming out.
    pub async fn open_video(&self, key: &str) -> BlobResult<(BlobRecord, File)> {
        self.videos.reader(key).await
    }

    /// Fetch a published video whole, with its metadata.
    pub async fn fetch_video(&self, key: &str) -> BlobResult<(Bytes, VideoMeta)> {
        self.videos.get_with_metadata(key).await
    }

    /// List published videos for one property, in key order.
    ///
    /// Rows whose metadata does not decode as [`VideoMeta`] (legacy or
    /// hand-written entries) are skipped with a warning rather than
    /// failing the whole listing.
    pub async fn list_videos(&self, property_id: &str) -> BlobResult<Vec<VideoEntry>> {
        let records = self.videos.list(&format!("{}/", property_id)).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<VideoMeta>(record.metadata) {
                Ok(meta) => entries.push(VideoEntry {
                    key: record.key,
                    meta,
                }),
                Err(err) => warn!(
                    key = %record.key,
                    error = %err,
                    "skipping listing entry with undecodable metadata"
                ),
            }
        }
        Ok(entries)
    }
}
