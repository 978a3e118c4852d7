//! Tile configuration.

use serde::{Deserialize, Serialize};
use terrastream_core::constants::DEFAULT_TERRAIN_ROOT;
use terrastream_core::{Lod, TileCoord};

/// Which texture a tile streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub coord: TileCoord,
    /// Root directory of the terrain texture set.
    pub terrain_root: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            coord: TileCoord::new(0, 1, Lod(1)),
            terrain_root: DEFAULT_TERRAIN_ROOT.to_string(),
        }
    }
}

impl TileConfig {
    pub fn with_coord(mut self, coord: TileCoord) -> Self {
        self.coord = coord;
        self
    }

    pub fn with_terrain_root(mut self, root: impl Into<String>) -> Self {
        self.terrain_root = root.into();
        self
    }

    /// Logical name of the tile's texture.
    pub fn resource_name(&self) -> String {
        self.coord.resource_name(&self.terrain_root)
    }
}
