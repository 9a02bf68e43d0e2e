//! Defines routes for the video upload and retrieval endpoints.
//!
//! ## Structure
//! - **Upload endpoints**
//!   - `POST /api/video-upload-chunk` — receive one chunk of a chunked upload
//!   - `POST /api/video-handler/upload` — receive a whole video in one request
//!
//! - **Retrieval endpoints**
//!   - `GET /api/video-handler/stream?key=` — playback, supports `Range` requests
//!   - `GET /api/video-handler/download?key=` — attachment download
//!   - `GET /api/video-handler/list?propertyId=` — published videos for a property
//!
//! Request bodies are capped a little above the client's chunk size; whole
//! files bigger than that belong on the chunked path.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{upload_chunk, upload_video},
        video_handlers::{download_video, list_videos, stream_video},
    },
    services::video_service::VideoService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Request body ceiling: one 4 MiB chunk plus multipart framing overhead.
pub const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Build and return the router for all video store routes.
///
/// The router carries shared state (`VideoService`) to all handlers.
pub fn routes() -> Router<VideoService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Upload routes
        .route("/api/video-upload-chunk", post(upload_chunk))
        .route("/api/video-handler/upload", post(upload_video))
        // Retrieval routes
        .route("/api/video-handler/stream", get(stream_video))
        .route("/api/video-handler/download", get(download_video))
        .route("/api/video-handler/list", get(list_videos))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
}
