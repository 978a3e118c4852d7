//! Tile error types.

use std::fmt;

use terrastream_gpu::GpuError;
use thiserror::Error;

/// Step of tile initialization, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStage {
    ShaderPass,
    GeometryUpload,
    FrameSync,
    TextureHeap,
    ConstantsHeap,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShaderPass => "shader pass creation",
            Self::GeometryUpload => "vertex buffer upload",
            Self::FrameSync => "previous frame wait",
            Self::TextureHeap => "texture heap creation",
            Self::ConstantsHeap => "constants heap creation",
        };
        f.write_str(name)
    }
}

/// Tile errors. Only initialization can fail; per-frame calls never do.
#[derive(Error, Debug)]
pub enum TileError {
    #[error("tile initialization failed during {stage}: {source}")]
    FatalInit {
        stage: InitStage,
        #[source]
        source: GpuError,
    },
}

impl TileError {
    pub const fn stage(&self) -> InitStage {
        match self {
            Self::FatalInit { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, TileError>;
