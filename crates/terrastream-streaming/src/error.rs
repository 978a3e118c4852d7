//! Error types for texture streaming.

use thiserror::Error;

/// Errors raised while loading a streamed texture.
///
/// These never reach the render path: the streamer records them and keeps
/// reporting the resource as unavailable.
#[derive(Error, Debug)]
pub enum StreamingError {
    #[error("texture source has no resource named {0}")]
    NotFound(String),

    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to upload {name}: {source}")]
    Upload {
        name: String,
        #[source]
        source: terrastream_gpu::GpuError,
    },

    #[error("failed to spawn streaming worker: {0}")]
    WorkerSpawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamingError>;
