//! Image loading for texture data

use std::path::Path;

use crate::assets::AssetError;

/// Decoded RGBA8 image ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data, 4 bytes per pixel
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load and decode an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("{:?}: {}", path_ref, e)))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::info!("Loaded image {}x{} from {:?}", width, height, path_ref);

        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Decode an image from an in-memory byte buffer
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(e.to_string()))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}
