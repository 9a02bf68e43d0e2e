//! Chunked upload client.
//!
//! Splits a video file into fixed-size chunks and feeds them to the chunk
//! endpoint strictly one request at a time; the next chunk only goes out
//! after the previous one was acknowledged. There is no resume: any failed
//! request aborts the attempt, and a retry starts over from chunk 0 under
//! a fresh upload id.

use anyhow::{Context, Result, bail, ensure};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// Fixed chunk size: 4 MiB, comfortably under the server's request ceiling.
pub const CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Files above this are rejected before any request is made.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Number of chunks for a payload of `len` bytes. An empty file still
/// ships one (empty) chunk so the receiver sees a final index and
/// publishes the video.
pub fn chunk_count(len: u64, chunk_size: u64) -> u64 {
    if len == 0 { 1 } else { len.div_ceil(chunk_size) }
}

fn ensure_uploadable(len: u64) -> Result<()> {
    ensure!(
        len <= MAX_UPLOAD_BYTES,
        "file is {len} bytes, above the {MAX_UPLOAD_BYTES} byte (5 GiB) upload ceiling"
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ChunkUploadReply {
    complete: bool,
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectUploadReply {
    key: String,
}

/// HTTP client for the video store upload endpoints.
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload `path` in fixed-size chunks under a fresh random upload id.
    /// Returns the storage key reported by the final chunk's response.
    pub async fn upload_file(
        &self,
        path: &Path,
        property_id: &str,
        video_type: &str,
        filename: &str,
    ) -> Result<String> {
        let mut file = File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let len = file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        ensure_uploadable(len)?;

        let total_chunks = chunk_count(len, CHUNK_SIZE);
        let upload_id = Uuid::new_v4().simple().to_string();
        let url = format!("{}/api/video-upload-chunk", self.base_url);

        tracing::info!(
            file = %path.display(),
            size_bytes = len,
            chunks = total_chunks,
            upload_id = %upload_id,
            "starting chunked upload"
        );

        let mut remaining = len;
        for index in 0..total_chunks {
            let this_len = remaining.min(CHUNK_SIZE);
            let mut buf = vec![0u8; this_len as usize];
            file.read_exact(&mut buf)
                .await
                .with_context(|| format!("Failed to read chunk {index}"))?;
            remaining -= this_len;

            let part = Part::bytes(buf)
                .file_name(format!("chunk-{index}"))
                .mime_str("application/octet-stream")?;
            let form = Form::new()
                .part("chunk", part)
                .text("chunkIndex", index.to_string())
                .text("totalChunks", total_chunks.to_string())
                .text("uploadId", upload_id.clone())
                .text("propertyId", property_id.to_string())
                .text("videoType", video_type.to_string())
                .text("filename", filename.to_string());

            let response = self
                .http
                .post(&url)
                .multipart(form)
                .send()
                .await
                .with_context(|| format!("Failed to send chunk {}/{}", index + 1, total_chunks))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<no body>".to_string());
                bail!(
                    "Chunk {}/{} failed: {} - {}",
                    index + 1,
                    total_chunks,
                    status,
                    error_text
                );
            }

            let reply: ChunkUploadReply = response
                .json()
                .await
                .context("Failed to parse chunk response")?;
            tracing::info!(chunk = index + 1, total = total_chunks, "chunk acknowledged");

            if reply.complete {
                return reply
                    .key
                    .context("Server reported completion without a storage key");
            }
        }

        bail!("Upload sent every chunk but the server never reported completion")
    }

    /// Upload `path` whole, in a single request. Only suitable for files
    /// under the server's request body limit; everything else should take
    /// the chunked path.
    pub async fn upload_direct(
        &self,
        path: &Path,
        property_id: &str,
        video_type: &str,
        filename: &str,
    ) -> Result<String> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        ensure_uploadable(data.len() as u64)?;

        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("video/mp4")?;
        let form = Form::new()
            .part("video", part)
            .text("propertyId", property_id.to_string())
            .text("videoType", video_type.to_string())
            .text("filename", filename.to_string());

        let url = format!("{}/api/video-handler/upload", self.base_url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("Failed to send video")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            bail!("Upload failed: {} - {}", status, error_text);
        }

        let reply: DirectUploadReply = response
            .json()
            .await
            .context("Failed to parse upload response")?;
        Ok(reply.key)
    }
}
