//! Tile coordinates and streamed resource naming.

use std::fmt;

use glam::IVec2;
use serde::{Deserialize, Serialize};

/// Level of detail of a terrain tile texture.
///
/// Lower values are finer; LOD 0 is the full-resolution texture set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Lod(pub u8);

impl Lod {
    /// Full-resolution level
    pub const FINEST: Self = Self(0);
}

impl fmt::Display for Lod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LOD{}", self.0)
    }
}

/// Position of a terrain tile in the tile grid, together with the
/// level of detail of the texture it requires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
    pub lod: Lod,
}

impl TileCoord {
    /// Create a new tile coordinate
    #[inline]
    pub const fn new(x: i32, y: i32, lod: Lod) -> Self {
        Self { x, y, lod }
    }

    /// Grid position without the level of detail
    #[inline]
    pub const fn to_ivec2(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }

    /// Logical name of the texture this tile streams, relative to the
    /// streaming service's root: `{root}/LOD{lod}/image_x{x}_y{y}.bmp`.
    pub fn resource_name(self, root: &str) -> String {
        format!("{root}/{}/image_x{}_y{}.bmp", self.lod, self.x, self.y)
    }

}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) @ {}", self.x, self.y, self.lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_name_layout() {
        let coord = TileCoord::new(0, 1, Lod(1));
        assert_eq!(
            coord.resource_name("sample_terrain"),
            "sample_terrain/LOD1/image_x0_y1.bmp"
        );
    }

    #[test]
    fn resource_name_negative_coords() {
        let coord = TileCoord::new(-3, 7, Lod::FINEST);
        assert_eq!(coord.resource_name("hills"), "hills/LOD0/image_x-3_y7.bmp");
    }

    #[test]
    fn display_includes_lod() {
        let coord = TileCoord::new(4, 5, Lod(2));
        assert_eq!(coord.to_string(), "(4, 5) @ LOD2");
        assert_eq!(coord.to_ivec2(), IVec2::new(4, 5));
    }
}
