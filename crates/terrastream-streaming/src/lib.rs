//! Asynchronous texture streaming for Terrastream.
//!
//! The render thread polls [`StreamingService::query`] once per frame; a
//! background worker reads, decodes and uploads requested textures and the
//! poll reports them `Available` only once the upload is fenced.

pub mod config;
pub mod error;
pub mod source;
pub mod state;
pub mod streamer;
pub mod upload;

pub use config::StreamingConfig;
pub use error::{Result, StreamingError};
pub use source::{decode, DecodedTexture, DirectorySource, MemorySource, TextureSource};
pub use state::{ResourceHandle, ResourceState, StreamingService};
pub use streamer::TextureStreamer;
pub use upload::{HostTextureUploader, TextureUploader, VulkanTextureUploader};
