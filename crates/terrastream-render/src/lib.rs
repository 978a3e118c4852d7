//! Streamed terrain tile rendering for Terrastream.
//!
//! This crate provides:
//! - [`TerrainTile`]: static geometry drawn untextured until its streamed
//!   texture becomes available, then textured
//! - The shader pass and shared constant buffer seams a tile draws with,
//!   with Vulkan implementations
//! - Tile configuration and error types

pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod shader_pass;
pub mod tile;

pub use config::TileConfig;
pub use constants::{ConstantBufferManager, FrameConstants, SharedConstantBuffers};
pub use error::{InitStage, Result, TileError};
pub use geometry::StaticGeometry;
pub use shader_pass::{ShaderPass, TerrainShaderPass};
pub use tile::{RenderMode, TerrainTile, TileServices};
