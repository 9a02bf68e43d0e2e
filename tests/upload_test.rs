//! Integration tests for the chunked and direct upload endpoints.

mod helpers;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use helpers::setup_test_app;
use serde_json::Value;

/// Build a chunk upload form, omitting whichever required fields are `None`.
/// The descriptor fields are always present; validation only looks at the
/// required four.
fn form_with(
    chunk: Option<&[u8]>,
    chunk_index: Option<&str>,
    total_chunks: Option<&str>,
    upload_id: Option<&str>,
) -> MultipartForm {
    let mut form = MultipartForm::new()
        .add_text("propertyId", "prop-1")
        .add_text("videoType", "drone")
        .add_text("filename", "clip.mp4");
    if let Some(payload) = chunk {
        form = form.add_part(
            "chunk",
            Part::bytes(payload.to_vec())
                .file_name("blob")
                .mime_type("application/octet-stream"),
        );
    }
    if let Some(value) = chunk_index {
        form = form.add_text("chunkIndex", value);
    }
    if let Some(value) = total_chunks {
        form = form.add_text("totalChunks", value);
    }
    if let Some(value) = upload_id {
        form = form.add_text("uploadId", value);
    }
    form
}

fn chunk_form(payload: &[u8], index: u32, total: u32, upload_id: &str) -> MultipartForm {
    form_with(
        Some(payload),
        Some(&index.to_string()),
        Some(&total.to_string()),
        Some(upload_id),
    )
}

#[tokio::test]
async fn chunked_upload_round_trips_through_stream() {
    let app = setup_test_app().await;

    let response = app
        .server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"aaaa", 0, 3, "upload-1"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["complete"], false);
    assert_eq!(body["message"], "Chunk 1/3 uploaded");
    assert!(body.get("key").is_none());

    app.server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"bbbb", 1, 3, "upload-1"))
        .await
        .assert_status_ok();

    let response = app
        .server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"cc", 2, 3, "upload-1"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["complete"], true);
    assert_eq!(body["key"], "prop-1/drone/clip.mp4");
    assert_eq!(body["message"], "Video upload complete");

    // published payload is the chunks in index order
    let response = app
        .server
        .get("/api/video-handler/stream")
        .add_query_param("key", "prop-1/drone/clip.mp4")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().to_vec(), b"aaaabbbbcc");

    // chunk records are cleared after publish
    let leftover = app
        .service
        .chunk_store()
        .list("")
        .await
        .expect("list chunks");
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn single_chunk_upload_completes_immediately() {
    let app = setup_test_app().await;

    let response = app
        .server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"tiny video", 0, 1, "upload-2"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["complete"], true);
    assert_eq!(body["key"], "prop-1/drone/clip.mp4");
}

#[tokio::test]
async fn empty_chunk_payload_is_accepted() {
    let app = setup_test_app().await;

    let response = app
        .server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"", 0, 1, "upload-3"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["complete"], true);

    let response = app
        .server
        .get("/api/video-handler/stream")
        .add_query_param("key", "prop-1/drone/clip.mp4")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.as_bytes().is_empty());
}

#[tokio::test]
async fn missing_required_fields_are_rejected_without_side_effects() {
    let app = setup_test_app().await;

    let cases: Vec<(&str, MultipartForm)> = vec![
        (
            "no chunk",
            form_with(None, Some("0"), Some("2"), Some("upload-4")),
        ),
        (
            "no chunkIndex",
            form_with(Some(b"data"), None, Some("2"), Some("upload-4")),
        ),
        (
            "no totalChunks",
            form_with(Some(b"data"), Some("0"), None, Some("upload-4")),
        ),
        (
            "no uploadId",
            form_with(Some(b"data"), Some("0"), Some("2"), None),
        ),
        (
            "empty uploadId",
            form_with(Some(b"data"), Some("0"), Some("2"), Some("")),
        ),
        (
            "zero totalChunks",
            form_with(Some(b"data"), Some("0"), Some("0"), Some("upload-4")),
        ),
    ];

    for (case, form) in cases {
        let response = app
            .server
            .post("/api/video-upload-chunk")
            .multipart(form)
            .await;
        assert_eq!(
            response.status_code(),
            StatusCode::BAD_REQUEST,
            "case: {case}"
        );
        let body: Value = response.json();
        assert_eq!(body["error"], "Missing required fields", "case: {case}");
    }

    // nothing was persisted by any rejected request
    let leftover = app
        .service
        .chunk_store()
        .list("")
        .await
        .expect("list chunks");
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn non_numeric_chunk_counters_are_rejected() {
    let app = setup_test_app().await;

    let response = app
        .server
        .post("/api/video-upload-chunk")
        .multipart(form_with(Some(b"data"), Some("abc"), Some("2"), Some("up")))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(
        body["error"]
            .as_str()
            .expect("error message")
            .contains("Invalid chunkIndex")
    );
}

#[tokio::test]
async fn premature_final_chunk_reports_missing_chunk() {
    let app = setup_test_app().await;

    app.server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"aa", 0, 3, "upload-5"))
        .await
        .assert_status_ok();

    // index 2 declares itself last while index 1 never arrived
    let response = app
        .server
        .post("/api/video-upload-chunk")
        .multipart(chunk_form(b"cc", 2, 3, "upload-5"))
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "missing chunk 1");

    // nothing was published, and the stored chunks are still in place
    let response = app
        .server
        .get("/api/video-handler/stream")
        .add_query_param("key", "prop-1/drone/clip.mp4")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let leftover = app
        .service
        .chunk_store()
        .list("upload-5/")
        .await
        .expect("list chunks");
    assert_eq!(leftover.len(), 2);
}

#[tokio::test]
async fn direct_upload_round_trips() {
    let app = setup_test_app().await;

    let form = MultipartForm::new()
        .add_part(
            "video",
            Part::bytes(b"a whole video".to_vec())
                .file_name("tour.mp4")
                .mime_type("video/mp4"),
        )
        .add_text("propertyId", "prop-2")
        .add_text("videoType", "property")
        .add_text("filename", "tour.mp4");

    let response = app
        .server
        .post("/api/video-handler/upload")
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["key"], "prop-2/property/tour.mp4");
    assert_eq!(body["message"], "Video uploaded successfully");

    let response = app
        .server
        .get("/api/video-handler/stream")
        .add_query_param("key", "prop-2/property/tour.mp4")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().to_vec(), b"a whole video");
}

#[tokio::test]
async fn direct_upload_requires_every_field() {
    let app = setup_test_app().await;

    // missing filename
    let form = MultipartForm::new()
        .add_part(
            "video",
            Part::bytes(b"payload".to_vec())
                .file_name("x.mp4")
                .mime_type("video/mp4"),
        )
        .add_text("propertyId", "prop-2")
        .add_text("videoType", "property");

    let response = app
        .server
        .post("/api/video-handler/upload")
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Missing required fields");

    // missing video payload
    let form = MultipartForm::new()
        .add_text("propertyId", "prop-2")
        .add_text("videoType", "property")
        .add_text("filename", "x.mp4");

    let response = app
        .server
        .post("/api/video-handler/upload")
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
