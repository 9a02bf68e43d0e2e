//! Core data models for the property video store.
//!
//! These entities describe in-flight chunks and published videos. They
//! serialize as JSON via `serde` both on the wire and into the blob
//! metadata column, so field names follow the upload form's camelCase.

pub mod chunk;
pub mod video;
