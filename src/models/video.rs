//! Represents a published video and its listing shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a published video blob.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VideoMeta {
    /// Property the video belongs to.
    pub property_id: String,

    /// Video category (e.g. `drone`, `property`).
    pub video_type: String,

    /// Filename the video was published under.
    pub filename: String,

    /// Payload size in bytes.
    pub size: u64,

    /// When the video was published.
    pub uploaded_at: DateTime<Utc>,
}

/// One listing entry: the storage key plus the stored metadata, flattened
/// into a single JSON object.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VideoEntry {
    pub key: String,

    #[serde(flatten)]
    pub meta: VideoMeta,
}
