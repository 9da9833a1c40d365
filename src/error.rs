// Error types for the Vulkan core
//
// Every fallible step returns an `EngineError`. Nothing in the core exits the
// process; the launcher decides that every error is fatal.

use ash::prelude::VkResult;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The Vulkan loader library could not be found or opened
    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    /// A Vulkan entry point returned a non-success status
    #[error("{op} failed with {result:?}")]
    Vulkan { op: &'static str, result: vk::Result },

    /// No Vulkan surface extension exists for the window's display server
    #[error("window system has no Vulkan surface support")]
    UnsupportedWindowSystem,

    #[error("no Vulkan physical device available")]
    NoPhysicalDevice,

    #[error("none of {devices} physical device(s) has a queue family with graphics and present support")]
    NoQueueFamily { devices: usize },

    #[error("no host-visible, host-coherent memory type can back the vertex buffer")]
    NoMemoryType,

    #[error("surface does not offer format {format:?} with color space {color_space:?}")]
    SurfaceFormatUnavailable {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    #[error("swapchain needs {requested} images but the surface allows at most {max}")]
    ImageCountUnsupported { requested: u32, max: u32 },

    #[error("failed to read shader {}: {source}", .path.display())]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SPIR-V is a stream of 32-bit words
    #[error("shader {} is {len} bytes, not a multiple of 4", .path.display())]
    ShaderMisaligned { path: PathBuf, len: usize },

    #[error("acquired image index {index} has no framebuffer ({count} exist)")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Tags a raw `ash` result with the name of the Vulkan call that produced it.
pub trait VkResultExt<T> {
    fn during(self, op: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn during(self, op: &'static str) -> Result<T> {
        self.map_err(|result| EngineError::Vulkan { op, result })
    }
}
