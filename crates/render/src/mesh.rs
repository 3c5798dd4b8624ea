//! GPU mesh storage.
//!
//! [`MeshStore`] owns the vertex and index buffers for every uploaded mesh
//! and hands out [`MeshHandle`]s that scene objects reference. Renderers
//! look meshes up at record time, so the same mesh can be drawn by several
//! passes without duplicating buffers.

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::debug;

use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::device::Device;
use ember_scene::MeshHandle;

use crate::error::RenderResult;

/// Vertex format shared by all mesh pipelines.
///
/// Layout must match the vertex shader inputs: position at location 0,
/// normal at location 1, color at location 2.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: Vec3,
    /// Object-space normal.
    pub normal: Vec3,
    /// Vertex color (linear RGB).
    pub color: Vec3,
}

impl Vertex {
    /// Creates a vertex.
    pub fn new(position: Vec3, normal: Vec3, color: Vec3) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    /// Returns the vertex buffer binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Returns the vertex attribute descriptions.
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, normal) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, color) as u32),
        ]
    }
}

/// Vertex and index buffers for one uploaded mesh.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Returns the vertex buffer handle.
    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Returns the index buffer handle.
    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Returns the number of indices to draw.
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Owns all uploaded meshes.
pub struct MeshStore {
    device: Arc<Device>,
    meshes: Vec<GpuMesh>,
}

impl MeshStore {
    /// Creates an empty store.
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            meshes: Vec::new(),
        }
    }

    /// Uploads mesh data to the GPU and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the staging upload fails.
    pub fn upload(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshHandle> {
        let vertex_buffer = Buffer::new_with_data(
            self.device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index_buffer = Buffer::new_with_data(
            self.device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(indices),
        )?;

        let handle = MeshHandle(self.meshes.len() as u32);
        debug!(
            "Uploaded mesh {}: {} vertices, {} indices",
            handle.0,
            vertices.len(),
            indices.len()
        );

        self.meshes.push(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        });
        Ok(handle)
    }

    /// Looks up an uploaded mesh.
    pub fn get(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle.0 as usize)
    }

    /// Returns the number of uploaded meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Returns true when nothing has been uploaded.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Generates a unit cube centered at the origin with per-face normals.
pub fn cube(color: Vec3) -> (Vec<Vertex>, Vec<u32>) {
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        // (normal, tangent, bitangent) per face
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, tangent, bitangent) in faces {
        let base = vertices.len() as u32;
        for (u, v) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = normal * 0.5 + tangent * u + bitangent * v;
            vertices.push(Vertex::new(position, normal, color));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride_matches_binding() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride as usize, std::mem::size_of::<Vertex>());
        assert_eq!(binding.binding, 0);
    }

    #[test]
    fn test_vertex_attribute_offsets() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 24);
        for attr in &attrs {
            assert_eq!(attr.format, vk::Format::R32G32B32_SFLOAT);
        }
    }

    #[test]
    fn test_cube_geometry() {
        let (vertices, indices) = cube(Vec3::ONE);
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);

        // All positions lie on the unit cube surface.
        for v in &vertices {
            assert_eq!(v.position.abs().max_element(), 0.5);
            // Each vertex points along its face normal.
            assert!((v.normal.dot(v.position) - 0.5).abs() < 1e-6);
        }
        // Indices only reference generated vertices.
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }
}
