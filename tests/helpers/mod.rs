#![allow(dead_code)]

//! Shared test setup: a scratch blob root, a SQLite pool with the schema
//! applied, and a router ready to serve requests.

use axum::Router;
use axum_test::TestServer;
use property_video_store::routes::routes;
use property_video_store::services::blob_store::run_migrations;
use property_video_store::services::video_service::VideoService;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tempfile::TempDir;

/// Test application with its own scratch directory and database.
/// Dropping it tears everything down.
pub struct TestApp {
    pub server: TestServer,
    pub service: VideoService,
    pub _temp_dir: TempDir,
}

/// Build a `VideoService` rooted in `dir`, with the schema applied and the
/// blob root created.
pub async fn make_service(dir: &TempDir) -> VideoService {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("meta.db"))
        .create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("open sqlite");
    let db = Arc::new(db);
    run_migrations(&db).await.expect("run migrations");

    let blob_root = dir.path().join("blobs");
    std::fs::create_dir_all(&blob_root).expect("create blob root");
    VideoService::new(db, blob_root)
}

/// Spin up an in-process test server around a fresh `VideoService`.
pub async fn setup_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let service = make_service(&temp_dir).await;

    let app: Router = routes().with_state(service.clone());
    let server = TestServer::new(app).expect("start test server");

    TestApp {
        server,
        service,
        _temp_dir: temp_dir,
    }
}
