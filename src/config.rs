// =============================================================================
// CONFIGURATION - Fixed core constants and the launcher's config.toml
// =============================================================================
//
// The Vulkan core is not runtime-configurable: surface format, present mode,
// image count and shader locations are constants below. Only the launcher
// reads config.toml, with defaults for anything missing.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Window size, also the swapchain extent when the surface leaves it undefined
pub const DEFAULT_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 600,
    height: 600,
};

/// Double buffering
pub const SWAPCHAIN_IMAGE_COUNT: u32 = 2;

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Vsync-locked
pub const PREFERRED_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// Opaque black
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub const VERTEX_SHADER_PATH: &str = "shaders/triangle.vert.spv";
pub const FRAGMENT_SHADER_PATH: &str = "shaders/triangle.frag.spv";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub animation: AnimationConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Spinning Triangle".to_string(),
        }
    }
}

/// Animation settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Seconds per full rotation
    pub period_secs: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self { period_secs: 3.0 }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    /// env_logger filter; RUST_LOG is used when absent
    pub log_filter: Option<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_filter: None,
        }
    }
}

impl Config {
    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Rotation period; non-finite or negative values fall back to the default
    pub fn rotation_period(&self) -> Duration {
        Duration::try_from_secs_f32(self.animation.period_secs).unwrap_or_else(|_| {
            log::warn!(
                "Invalid animation period {}, using {}s",
                self.animation.period_secs,
                AnimationConfig::default().period_secs
            );
            Duration::from_secs_f32(AnimationConfig::default().period_secs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.window.title, "Spinning Triangle");
        assert_eq!(config.animation.period_secs, 3.0);
        assert!(config.debug.validation_layers);
        assert!(config.debug.log_filter.is_none());
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [animation]
            period_secs = 1.5

            [debug]
            log_filter = "spinning_triangle=trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.animation.period_secs, 1.5);
        assert_eq!(config.debug.log_filter.as_deref(), Some("spinning_triangle=trace"));
        assert!(config.debug.validation_layers);
        assert_eq!(config.window.title, "Spinning Triangle");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("config.toml")).unwrap();
        assert_eq!(config.animation.period_secs, 3.0);
    }

    #[test]
    fn malformed_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\ntitle = 3").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn negative_period_falls_back_to_default() {
        let mut config = Config::default();
        config.animation.period_secs = -2.0;
        assert_eq!(config.rotation_period(), Duration::from_secs(3));

        config.animation.period_secs = 0.5;
        assert_eq!(config.rotation_period(), Duration::from_millis(500));
    }

    #[test]
    fn preferred_format_is_bgra_unorm_srgb() {
        assert_eq!(PREFERRED_SURFACE_FORMAT.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(
            PREFERRED_SURFACE_FORMAT.color_space,
            vk::ColorSpaceKHR::SRGB_NONLINEAR
        );
    }
}
