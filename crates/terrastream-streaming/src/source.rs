//! Where texture bytes come from, and how they are decoded.

use std::io;
use std::path::{Component, Path, PathBuf};

use hashbrown::HashMap;
use parking_lot::RwLock;
use terrastream_core::PixelFormat;

use crate::error::{Result, StreamingError};

/// Supplies encoded texture files by logical name.
pub trait TextureSource: Send + Sync {
    /// Read the encoded bytes of `name`.
    fn read(&self, name: &str) -> Result<Vec<u8>>;
}

/// Reads textures from a directory tree; names are relative paths.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        (!escapes).then(|| self.root.join(relative))
    }
}

impl TextureSource for DirectorySource {
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self
            .resolve(name)
            .ok_or_else(|| StreamingError::NotFound(name.to_string()))?;

        std::fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StreamingError::NotFound(name.to_string()),
            _ => StreamingError::Io {
                name: name.to_string(),
                source,
            },
        })
    }
}

/// In-memory texture files, for tooling and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.write().insert(name.into(), bytes);
    }

    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.files.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl TextureSource for MemorySource {
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StreamingError::NotFound(name.to_string()))
    }
}

/// A texture decoded to tightly packed pixels, ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for DecodedTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pixels", &format_args!("<{} bytes>", self.pixels.len()))
            .finish()
    }
}

/// Decode any format `image` recognizes into 8-bit RGBA.
pub fn decode(name: &str, bytes: &[u8], srgb: bool) -> Result<DecodedTexture> {
    let decoded = image::load_from_memory(bytes).map_err(|source| StreamingError::Decode {
        name: name.to_string(),
        source,
    })?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let format = if srgb {
        PixelFormat::Rgba8UnormSrgb
    } else {
        PixelFormat::Rgba8Unorm
    };

    Ok(DecodedTexture {
        width,
        height,
        format,
        pixels: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_bmp(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Bmp)
            .unwrap();
        bytes
    }

    #[test]
    fn decode_bmp_to_rgba8() {
        let bytes = encode_bmp(4, 2, [10, 20, 30, 255]);
        let texture = decode("a.bmp", &bytes, false).unwrap();

        assert_eq!((texture.width, texture.height), (4, 2));
        assert_eq!(texture.format, PixelFormat::Rgba8Unorm);
        assert_eq!(texture.pixels.len(), 4 * 2 * 4);
        assert_eq!(&texture.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn decode_selects_srgb_format() {
        let bytes = encode_bmp(1, 1, [0, 0, 0, 255]);
        let texture = decode("a.bmp", &bytes, true).unwrap();
        assert_eq!(texture.format, PixelFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode("junk.bmp", b"not an image", false).unwrap_err();
        assert!(matches!(err, StreamingError::Decode { ref name, .. } if name == "junk.bmp"));
    }

    #[test]
    fn memory_source_reads_inserted_files() {
        let source = MemorySource::new();
        source.insert("t/LOD1/image_x0_y1.bmp", vec![1, 2, 3]);

        assert_eq!(source.read("t/LOD1/image_x0_y1.bmp").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            source.read("missing.bmp"),
            Err(StreamingError::NotFound(_))
        ));
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn directory_source_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("LOD1")).unwrap();
        std::fs::write(dir.path().join("LOD1/image_x0_y1.bmp"), [7u8; 5]).unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.read("LOD1/image_x0_y1.bmp").unwrap(), vec![7u8; 5]);
        assert!(matches!(
            source.read("LOD1/image_x9_y9.bmp"),
            Err(StreamingError::NotFound(_))
        ));
    }

    #[test]
    fn directory_source_refuses_to_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("root"));
        assert!(matches!(
            source.read("../secret.bmp"),
            Err(StreamingError::NotFound(_))
        ));
    }
}
