//! HTTP handlers for chunked and direct video uploads.
//! Both endpoints take multipart forms and delegate storage concerns to
//! `VideoService`.

use crate::{
    errors::AppError,
    services::video_service::{ChunkOutcome, ChunkUpload, VideoService},
};
use axum::{
    Json,
    extract::{Multipart, State},
};
use bytes::Bytes;
use serde::Serialize;

/// Response body for `POST /api/video-upload-chunk`.
#[derive(Debug, Serialize)]
pub struct ChunkUploadResponse {
    pub success: bool,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
}

/// Response body for `POST /api/video-handler/upload`.
#[derive(Debug, Serialize)]
pub struct DirectUploadResponse {
    pub success: bool,
    pub key: String,
    pub message: String,
}

/// POST `/api/video-upload-chunk` — receive one chunk of a chunked upload.
///
/// Requires `chunk`, `chunkIndex`, `totalChunks`, and a non-empty
/// `uploadId`; index 0 is a valid value, only a genuinely absent field
/// rejects the request. The descriptor fields (`propertyId`, `videoType`,
/// `filename`) ride along and are read off the final chunk at publish time.
pub async fn upload_chunk(
    State(service): State<VideoService>,
    mut multipart: Multipart,
) -> Result<Json<ChunkUploadResponse>, AppError> {
    let mut chunk: Option<Bytes> = None;
    let mut chunk_index: Option<u32> = None;
    let mut total_chunks: Option<u32> = None;
    let mut upload_id: Option<String> = None;
    let mut property_id = String::new();
    let mut video_type = String::new();
    let mut filename = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Failed to read multipart form: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chunk" => {
                chunk = Some(field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("Failed to read chunk payload: {err}"))
                })?);
            }
            "chunkIndex" => chunk_index = Some(parse_count_field("chunkIndex", field).await?),
            "totalChunks" => total_chunks = Some(parse_count_field("totalChunks", field).await?),
            "uploadId" => upload_id = Some(text_field("uploadId", field).await?),
            "propertyId" => property_id = text_field("propertyId", field).await?,
            "videoType" => video_type = text_field("videoType", field).await?,
            "filename" => filename = text_field("filename", field).await?,
            _ => {}
        }
    }

    let (chunk, chunk_index, total_chunks, upload_id) =
        match (chunk, chunk_index, total_chunks, upload_id) {
            (Some(chunk), Some(index), Some(total), Some(id))
                if total >= 1 && !id.is_empty() =>
            {
                (chunk, index, total, id)
            }
            _ => return Err(AppError::bad_request("Missing required fields")),
        };

    let outcome = service
        .receive_chunk(ChunkUpload {
            upload_id,
            chunk_index,
            total_chunks,
            property_id,
            video_type,
            filename,
            payload: chunk,
        })
        .await?;

    let response = match outcome {
        ChunkOutcome::Accepted { received, total } => ChunkUploadResponse {
            success: true,
            complete: false,
            key: None,
            message: format!("Chunk {}/{} uploaded", received, total),
        },
        ChunkOutcome::Complete { key } => ChunkUploadResponse {
            success: true,
            complete: true,
            key: Some(key),
            message: "Video upload complete".into(),
        },
    };

    Ok(Json(response))
}

/// POST `/api/video-handler/upload` — receive a whole video in one request.
///
/// Requires `video` plus non-empty `propertyId`, `videoType`, and
/// `filename`. Larger files belong on the chunked path; this endpoint is
/// bounded by the request body limit.
pub async fn upload_video(
    State(service): State<VideoService>,
    mut multipart: Multipart,
) -> Result<Json<DirectUploadResponse>, AppError> {
    let mut video: Option<Bytes> = None;
    let mut property_id: Option<String> = None;
    let mut video_type: Option<String> = None;
    let mut filename: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Failed to read multipart form: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                video = Some(field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("Failed to read video payload: {err}"))
                })?);
            }
            "propertyId" => property_id = Some(text_field("propertyId", field).await?),
            "videoType" => video_type = Some(text_field("videoType", field).await?),
            "filename" => filename = Some(text_field("filename", field).await?),
            _ => {}
        }
    }

    let (video, property_id, video_type, filename) =
        match (video, property_id, video_type, filename) {
            (Some(video), Some(property), Some(kind), Some(name))
                if !property.is_empty() && !kind.is_empty() && !name.is_empty() =>
            {
                (video, property, kind, name)
            }
            _ => return Err(AppError::bad_request("Missing required fields")),
        };

    let key = service
        .store_video(&property_id, &video_type, &filename, video)
        .await?;

    Ok(Json(DirectUploadResponse {
        success: true,
        key,
        message: "Video uploaded successfully".into(),
    }))
}

async fn text_field(
    name: &str,
    field: axum::extract::multipart::Field<'_>,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("Failed to read field `{name}`: {err}")))
}

async fn parse_count_field(
    name: &str,
    field: axum::extract::multipart::Field<'_>,
) -> Result<u32, AppError> {
    let raw = text_field(name, field).await?;
    raw.trim()
        .parse::<u32>()
        .map_err(|_| AppError::bad_request(format!("Invalid {name}: `{raw}`")))
}
