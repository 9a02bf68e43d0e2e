//! Represents one stored chunk of an in-flight upload.

use serde::{Deserialize, Serialize};

/// Metadata attached to every chunk record in the chunk store.
///
/// The descriptor fields (`property_id`, `video_type`, `filename`) ride
/// along on every chunk so a stored chunk is self-describing, even though
/// reassembly takes them from the final chunk's request.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    /// Upload session token chosen by the client.
    pub upload_id: String,

    /// Zero-based position of this chunk within the upload.
    pub chunk_index: u32,

    /// Declared number of chunks in the whole upload.
    pub total_chunks: u32,

    /// Property the finished video will belong to.
    pub property_id: String,

    /// Video category (e.g. `drone`, `property`).
    pub video_type: String,

    /// Filename the finished video will be published under.
    pub filename: String,
}
