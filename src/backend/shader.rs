// Shader module loading
//
// Vulkan consumes SPIR-V, a stream of 32-bit words. The compiled shaders are
// read from disk at startup; build.rs produces them with glslc.

use crate::error::{EngineError, Result, VkResultExt};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// Read a SPIR-V file into words.
pub fn read_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();

    let bytes = std::fs::read(path).map_err(|source| EngineError::ShaderIo {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.len() % 4 != 0 {
        return Err(EngineError::ShaderMisaligned {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    let words = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|source| {
        EngineError::ShaderIo {
            path: path.to_path_buf(),
            source,
        }
    })?;

    log::debug!("Loaded {} ({} words)", path.display(), words.len());
    Ok(words)
}

/// Shader module that is destroyed when dropped.
///
/// Modules are only needed while the pipeline is being created.
pub struct ShaderModule<'a> {
    device: &'a ash::Device,
    pub module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    pub fn load(device: &'a ash::Device, path: impl AsRef<Path>) -> Result<Self> {
        let code = read_spirv(path)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { device.create_shader_module(&create_info, None) }
            .during("vkCreateShaderModule")?;

        Ok(Self { device, module })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}
