//! Renderer configuration
//!
//! Loaded from a TOML file when one exists, otherwise everything falls
//! back to defaults. All fields are individually optional in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Window creation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Model Viewer".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Paths to precompiled SPIR-V shader blobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex_shader_path: "target/shaders/model_vert.spv".to_string(),
            fragment_shader_path: "target/shaders/model_frag.spv".to_string(),
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Window parameters
    pub window: WindowConfig,
    /// Shader blob locations
    pub shaders: ShaderConfig,
    /// OBJ model to load at startup
    pub model_path: String,
    /// Texture image for the model
    pub texture_path: String,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether loaded textures get a full mip chain
    pub generate_mipmaps: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            shaders: ShaderConfig::default(),
            model_path: "resources/models/viking_room.obj".to_string(),
            texture_path: "resources/textures/viking_room.png".to_string(),
            max_frames_in_flight: 2,
            generate_mipmaps: true,
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration, falling back to defaults when the file is absent
    ///
    /// A file that exists but fails to parse is still an error; silently
    /// ignoring a broken config hides real mistakes.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No config file at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.max_frames_in_flight, 2);
        assert!(config.generate_mipmaps);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_text = r#"
            model_path = "assets/scene.obj"
            texture_path = "assets/scene.png"
            max_frames_in_flight = 3
            generate_mipmaps = false

            [window]
            title = "Test"
            width = 1280
            height = 720

            [shaders]
            vertex_shader_path = "a.spv"
            fragment_shader_path = "b.spv"
        "#;
        let config: RendererConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.window.title, "Test");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.shaders.vertex_shader_path, "a.spv");
        assert!(!config.generate_mipmaps);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RendererConfig = toml::from_str("model_path = \"m.obj\"").unwrap();
        assert_eq!(config.model_path, "m.obj");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.max_frames_in_flight, 2);
    }

    #[test]
    fn test_config_round_trip() {
        let config = RendererConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.window.title, config.window.title);
        assert_eq!(parsed.model_path, config.model_path);
    }
}
