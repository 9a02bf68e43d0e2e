//! Property video store: chunked video ingest, reassembly, and
//! range-addressable playback on top of a disk + SQLite blob store.

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
