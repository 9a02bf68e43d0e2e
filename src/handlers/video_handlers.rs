//! HTTP handlers for video playback, download, and listing.
//! Payloads stream from disk via `ReaderStream`; range requests seek the
//! file and stream only the requested slice so players can scrub without
//! pulling the whole object.

use crate::{errors::AppError, models::video::VideoEntry, services::video_service::VideoService};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";
const STREAM_CACHE_CONTROL: &str = "public, max-age=3600";
const FALLBACK_FILENAME: &str = "video.mp4";

/// Query params for `stream` and `download`.
#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

/// Query params for `list`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "propertyId")]
    pub property_id: Option<String>,
}

/// Response body for `GET /api/video-handler/list`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub videos: Vec<VideoEntry>,
}

/// An inclusive byte range from a `Range: bytes=start-end` header.
/// `end` is `None` for open-ended requests (`bytes=start-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteRange {
    start: u64,
    end: Option<u64>,
}

/// GET `/api/video-handler/stream?key=` — play a video, whole or ranged.
///
/// Without a `Range` header the whole payload streams back as 200. With
/// one, the requested slice streams back as 206 with `Content-Range` and
/// `Accept-Ranges` set. Ranges that start past the end of the payload get
/// 416 with the total length.
pub async fn stream_video(
    State(service): State<VideoService>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let key = require_param(query.key, "Missing video key")?;
    let range = parse_range_header(&headers)?;

    let (record, mut file) = service.open_video(&key).await?;
    let total_len = record.size_bytes.max(0) as u64;

    let Some(range) = range else {
        let stream = ReaderStream::new(file);
        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = StatusCode::OK;
        set_stream_headers(response.headers_mut(), total_len);
        return Ok(response);
    };

    let Some((start, end)) = resolve_range(range, total_len) else {
        return Ok(range_not_satisfiable(total_len));
    };

    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|err| AppError::internal(format!("Failed to seek video payload: {err}")))?;
    let slice_len = end - start + 1;
    let stream = ReaderStream::new(file.take(slice_len));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    let resp_headers = response.headers_mut();
    set_stream_headers(resp_headers, slice_len);
    resp_headers.insert(
        header::CONTENT_RANGE,
        HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, total_len))
            .unwrap_or_else(|_| HeaderValue::from_static("bytes */0")),
    );
    resp_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    Ok(response)
}

/// GET `/api/video-handler/download?key=` — download a video as an
/// attachment, named after the stored filename.
pub async fn download_video(
    State(service): State<VideoService>,
    Query(query): Query<KeyQuery>,
) -> Result<Response, AppError> {
    let key = require_param(query.key, "Missing video key")?;
    let (record, file) = service.open_video(&key).await?;

    let filename = record
        .metadata
        .get("filename")
        .and_then(|value| value.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_FILENAME)
        .replace('"', "");
    let total_len = record.size_bytes.max(0) as u64;

    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let resp_headers = response.headers_mut();
    resp_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(VIDEO_CONTENT_TYPE),
    );
    resp_headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    resp_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&total_len.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    Ok(response)
}

/// GET `/api/video-handler/list?propertyId=` — published videos for one
/// property.
pub async fn list_videos(
    State(service): State<VideoService>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let property_id = require_param(query.property_id, "Missing propertyId")?;
    let videos = service.list_videos(&property_id).await?;
    Ok(Json(ListResponse { videos }))
}

fn require_param(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(message))
}

fn set_stream_headers(headers: &mut HeaderMap, length: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(VIDEO_CONTENT_TYPE),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&length.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(STREAM_CACHE_CONTROL),
    );
}

fn range_not_satisfiable(total_len: u64) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
    response.headers_mut().insert(
        header::CONTENT_RANGE,
        HeaderValue::from_str(&format!("bytes */{}", total_len))
            .unwrap_or_else(|_| HeaderValue::from_static("bytes */0")),
    );
    response
}

/// Parse a `Range` header of the form `bytes=<start>-[<end>]`.
///
/// Returns Ok(None) when no header is present. Suffix ranges
/// (`bytes=-500`) and multi-range requests are rejected as 400; the
/// player retry path is a plain full-content request.
fn parse_range_header(headers: &HeaderMap) -> Result<Option<ByteRange>, AppError> {
    let Some(value) = headers.get(header::RANGE) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::bad_request("Invalid Range header"))?
        .trim();
    if value.is_empty() {
        return Ok(None);
    }

    let Some(raw) = value.strip_prefix("bytes=") else {
        return Err(AppError::bad_request(
            "Only bytes=start-end ranges are supported",
        ));
    };

    let mut parts = raw.splitn(2, '-');
    let start_raw = parts.next().unwrap_or_default().trim();
    let end_raw = parts.next().unwrap_or_default().trim();

    if start_raw.is_empty() {
        return Err(AppError::bad_request("Range start is required"));
    }
    let start = start_raw
        .parse::<u64>()
        .map_err(|_| AppError::bad_request("Invalid range start"))?;
    let end = if end_raw.is_empty() {
        None
    } else {
        Some(
            end_raw
                .parse::<u64>()
                .map_err(|_| AppError::bad_request("Invalid range end"))?,
        )
    };

    Ok(Some(ByteRange { start, end }))
}

/// Clamp a parsed range against the payload length, yielding the inclusive
/// slice to serve. `None` means nothing in the range is satisfiable.
fn resolve_range(range: ByteRange, total_len: u64) -> Option<(u64, u64)> {
    if total_len == 0 || range.start >= total_len {
        return None;
    }
    let end = range.end.unwrap_or(total_len - 1).min(total_len - 1);
    if range.start > end {
        return None;
    }
    Some((range.start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_range(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn no_range_header_parses_to_none() {
        let parsed = parse_range_header(&HeaderMap::new()).expect("parse");
        assert!(parsed.is_none());
    }

    #[test]
    fn bounded_range_parses() {
        let parsed = parse_range_header(&headers_with_range("bytes=0-99"))
            .expect("parse")
            .expect("range present");
        assert_eq!(parsed, ByteRange { start: 0, end: Some(99) });
    }

    #[test]
    fn open_ended_range_parses() {
        let parsed = parse_range_header(&headers_with_range("bytes=500-"))
            .expect("parse")
            .expect("range present");
        assert_eq!(parsed, ByteRange { start: 500, end: None });
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        for value in [
            "items=0-5",
            "bytes=-500",
            "bytes=abc-",
            "bytes=0-xyz",
            "bytes=0-1,5-9",
        ] {
            let err = parse_range_header(&headers_with_range(value)).expect_err("should reject");
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "value: {value}");
        }
    }

    #[test]
    fn resolve_clamps_end_to_payload() {
        assert_eq!(
            resolve_range(ByteRange { start: 0, end: Some(99) }, 1000),
            Some((0, 99))
        );
        assert_eq!(
            resolve_range(ByteRange { start: 900, end: None }, 1000),
            Some((900, 999))
        );
        assert_eq!(
            resolve_range(ByteRange { start: 990, end: Some(2000) }, 1000),
            Some((990, 999))
        );
    }

    #[test]
    fn resolve_rejects_unsatisfiable_ranges() {
        assert_eq!(resolve_range(ByteRange { start: 1000, end: None }, 1000), None);
        assert_eq!(resolve_range(ByteRange { start: 5, end: Some(2) }, 1000), None);
        assert_eq!(resolve_range(ByteRange { start: 0, end: None }, 0), None);
    }
}
