//! Tile vertex layout.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A single terrain tile vertex: position followed by RGBA color.
///
/// The layout is shared with the vertex shader input and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    /// Byte stride between consecutive vertices.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
    /// Byte offset of the position attribute.
    pub const POSITION_OFFSET: u32 = 0;
    /// Byte offset of the color attribute.
    pub const COLOR_OFFSET: u32 = std::mem::size_of::<[f32; 3]>() as u32;

    /// Create a new vertex
    #[inline]
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    /// Position as a glam vector
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Color as a glam vector
    #[inline]
    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }
}

/// Fixed geometry of a terrain tile.
pub const TILE_VERTICES: [Vertex; 3] = [
    Vertex::new([0.0, 0.25, 0.0], [1.0, 0.0, 0.0, 1.0]),
    Vertex::new([0.25, -0.25, 0.0], [0.0, 1.0, 0.0, 1.0]),
    Vertex::new([-0.25, -0.25, 0.0], [0.0, 0.0, 1.0, 1.0]),
];
