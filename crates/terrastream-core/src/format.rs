//! Pixel formats of streamed textures.

use serde::{Deserialize, Serialize};

/// Pixel format of a GPU-resident image.
///
/// The streaming service reports the format of every resource it hands
/// out; views created over the resource reuse it unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R16Float,
    Rgba16Float,
    R32Float,
    Rgba32Float,
}

impl PixelFormat {
    /// Every supported format.
    pub const ALL: [Self; 10] = [
        Self::R8Unorm,
        Self::Rg8Unorm,
        Self::Rgba8Unorm,
        Self::Rgba8UnormSrgb,
        Self::Bgra8Unorm,
        Self::Bgra8UnormSrgb,
        Self::R16Float,
        Self::Rgba16Float,
        Self::R32Float,
        Self::Rgba32Float,
    ];

    /// Number of color channels.
    pub const fn channels(self) -> u32 {
        match self {
            Self::R8Unorm | Self::R16Float | Self::R32Float => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Rgba16Float
            | Self::Rgba32Float => 4,
        }
    }

    /// Size of one pixel in bytes.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::R32Float => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Whether texel reads are converted from sRGB.
    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// Tightly packed byte size of a `width` x `height` image.
    pub const fn image_size(self, width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * self.bytes_per_pixel() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel_matches_channels() {
        for format in PixelFormat::ALL {
            assert_eq!(format.bytes_per_pixel() % format.channels(), 0, "{format:?}");
        }
    }

    #[test]
    fn srgb_formats() {
        assert!(PixelFormat::Rgba8UnormSrgb.is_srgb());
        assert!(!PixelFormat::Rgba8Unorm.is_srgb());
    }

    #[test]
    fn image_size_is_tightly_packed() {
        assert_eq!(PixelFormat::Rgba8Unorm.image_size(4, 2), 32);
        assert_eq!(PixelFormat::Rgba32Float.image_size(1, 1), 16);
        assert_eq!(PixelFormat::R8Unorm.image_size(0, 16), 0);
    }
}
