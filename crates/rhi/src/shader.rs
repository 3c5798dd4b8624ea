//! Shader module management.
//!
//! This module handles SPIR-V loading and VkShaderModule creation.
//!
//! # Overview
//!
//! - [`ShaderStage`] defines the type of shader (vertex or fragment)
//! - [`Shader`] wraps VkShaderModule with stage and entry point information
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ember_rhi::device::Device;
//! use ember_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/forward.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let stage_info = vertex_shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader stage - processes each vertex
    Vertex,
    /// Fragment (pixel) shader stage - processes each fragment
    Fragment,
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Returns a human-readable name for the shader stage.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Vulkan shader module wrapper.
///
/// Manages the lifecycle of a VkShaderModule and provides the stage create
/// info needed for pipeline creation.
pub struct Shader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
    /// Shader stage type.
    stage: ShaderStage,
    /// Entry point function name.
    entry_point: CString,
}

impl Shader {
    /// Creates a shader module from a SPIR-V file.
    ///
    /// # Errors
    ///
    /// Returns a descriptive [`RhiError::ShaderError`] if the file cannot be
    /// read, the SPIR-V data is invalid, or module creation fails.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte length is not a multiple of 4 (SPIR-V
    /// word alignment), the entry point name contains null bytes, or shader
    /// module creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        if !bytes.len().is_multiple_of(4) {
            return Err(RhiError::ShaderError(format!(
                "SPIR-V code must be 4-byte aligned, got {} bytes",
                bytes.len()
            )));
        }

        let code: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        let entry_point_cstring = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        info!(
            "Created {} shader module with entry point '{}'",
            stage, entry_point
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point: entry_point_cstring,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the shader stage.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the entry point function name as a C string reference.
    #[inline]
    pub fn entry_point(&self) -> &std::ffi::CStr {
        &self.entry_point
    }

    /// Creates a pipeline shader stage create info structure.
    ///
    /// The returned structure borrows from this shader and must not
    /// outlive it.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }
}
