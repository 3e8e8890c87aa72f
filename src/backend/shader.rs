// Shader module loading and management
//
// Vulkan consumes SPIR-V bytecode. Compiled binaries live next to the
// executable under shaders/ and are loaded by logical name; the pipeline
// treats them as opaque word sequences.

use crate::error::{RenderError, Result};
use ash::util::read_spv;
use ash::vk;
use std::fs::File;
use std::path::PathBuf;
use super::VulkanDevice;

/// Read a compiled SPIR-V binary by logical name (e.g. "triangle.vert").
pub fn load_shader_words(name: &str) -> Result<Vec<u32>> {
    let path = PathBuf::from("shaders").join(format!("{name}.spv"));

    let mut file = File::open(&path).map_err(|e| RenderError::ShaderLoad {
        name: name.to_string(),
        source: e,
    })?;

    read_spv(&mut file).map_err(|e| RenderError::ShaderLoad {
        name: name.to_string(),
        source: e,
    })
}

/// Wrap SPIR-V words in a shader module.
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    let module = unsafe { device.device.create_shader_module(&create_info, None) }?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shader_reports_its_name() {
        let err = load_shader_words("does-not-exist.vert").unwrap_err();
        match err {
            RenderError::ShaderLoad { name, .. } => assert_eq!(name, "does-not-exist.vert"),
            other => panic!("expected ShaderLoad, got {other:?}"),
        }
    }
}
