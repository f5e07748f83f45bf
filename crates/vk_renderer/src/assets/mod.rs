//! Asset loading: decoded meshes and pixel buffers
//!
//! The renderer itself only consumes decoded vertex/index arrays and RGBA
//! pixel buffers; the loaders in this module produce them from OBJ and
//! image files.

mod image_data;
mod obj;

pub use image_data::ImageData;
pub use obj::{load_obj, read_obj, ObjMesh};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File-level IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file was read but its contents could not be understood
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Image decoding failure
    #[error("Failed to load image: {0}")]
    LoadFailed(String),
}
