pub mod blob_store;
pub mod video_service;
