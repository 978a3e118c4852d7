//! Core types for the Terrastream terrain renderer.
//!
//! This crate provides the foundational types shared by the GPU backend,
//! the streaming service and the terrain renderer:
//! - Tile vertex layout
//! - Pixel formats of streamed textures
//! - Tile coordinates and resource naming

pub mod coords;
pub mod format;
pub mod types;

pub use coords::{Lod, TileCoord};
pub use format::PixelFormat;
pub use types::{Vertex, TILE_VERTICES};

/// Engine-wide constants
pub mod constants {
    /// Root directory of the sample terrain texture set
    pub const DEFAULT_TERRAIN_ROOT: &str = "sample_terrain";
    /// Number of vertices in a tile's static geometry
    pub const TILE_VERTEX_COUNT: u32 = 3;
    /// Descriptor slots per tile heap
    pub const TILE_HEAP_CAPACITY: u32 = 1;
    /// Root parameter slot of the constant buffer table
    pub const CONSTANTS_ROOT_SLOT: u32 = 0;
    /// Root parameter slot of the texture table
    pub const TEXTURE_ROOT_SLOT: u32 = 1;
}
