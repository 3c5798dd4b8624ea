//! Scene renderers.
//!
//! A [`SceneRenderer`] turns scene content into GPU work in two phases:
//! [`SceneRenderer::update`] writes the frame's uniform slices through a
//! [`FrameWriter`] and snapshots the draw list, then
//! [`SceneRenderer::record`] replays that list into a command buffer. The
//! render system begins and ends the render pass; `record` only binds and
//! draws, so the same renderer works against any
//! [`RenderTarget`](crate::target::RenderTarget) attachment setup it was
//! configured for.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::{info, warn};

use ember_rhi::command::CommandBuffer;
use ember_rhi::device::Device;
use ember_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use ember_rhi::shader::{Shader, ShaderStage};
use ember_scene::{MeshHandle, Scene};

use crate::context::{FrameWriter, RenderContext, ResourceKind, SliceIndex};
use crate::error::RenderResult;
use crate::mesh::{MeshStore, Vertex};
use crate::ubo::{CameraData, PointLightData};
use crate::MAX_FRAMES_IN_FLIGHT;

/// Per-draw push constant block.
///
/// Must match the push constant range declared in the shaders. The object
/// id feeds the picking attachment; it is 0 for pipelines that do not
/// write one, which the shader ignores.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PushConstants {
    /// Object-to-world matrix.
    pub model: Mat4,
    /// Raw object id written to the picking attachment.
    pub object_id: u32,
    /// Pad to a 16-byte multiple.
    pub _padding: [u32; 3],
}

impl PushConstants {
    /// Size of the block in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Static configuration of a renderer pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// Number of color attachments the pass renders into.
    pub color_attachment_count: u32,
    /// Whether the pass writes object ids for picking.
    pub enable_object_picking: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            color_attachment_count: 1,
            enable_object_picking: false,
        }
    }
}

impl RendererConfig {
    /// Configuration for the picking pass: color plus object-id attachment.
    pub fn picking() -> Self {
        Self {
            color_attachment_count: 2,
            enable_object_picking: true,
        }
    }
}

/// One snapshot draw taken from the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    /// Mesh to draw.
    pub mesh: MeshHandle,
    /// Object-to-world matrix.
    pub model: Mat4,
    /// Raw object id for the picking attachment.
    pub object_id: u32,
}

/// Collects a draw call for every live object with a mesh.
pub fn collect_draws(scene: &Scene) -> Vec<DrawCall> {
    scene
        .iter()
        .filter_map(|object| {
            object.mesh.map(|mesh| DrawCall {
                mesh,
                model: scene.world_matrix(object.id()),
                object_id: object.id().get(),
            })
        })
        .collect()
}

/// Builds camera uniform data from the scene's main camera.
///
/// The view matrix is the inverse of the camera object's world matrix.
/// Returns `None` when the scene has no camera.
pub fn camera_data(scene: &Scene, aspect: f32) -> Option<CameraData> {
    let id = scene.main_camera()?;
    let object = scene.get(id)?;
    let mut camera = object.camera?;
    if aspect > 0.0 {
        camera.set_aspect(aspect);
    }

    let world = scene.world_matrix(id);
    let view = world.inverse();
    let position = world.w_axis.truncate();
    Some(CameraData::new(view, camera.projection_matrix(), position))
}

/// Builds light uniform data from the scene's first point light.
///
/// Scenes without a light get a zero-intensity black light, which shades
/// as unlit ambient only.
pub fn light_data(scene: &Scene) -> PointLightData {
    for object in scene.iter() {
        if let Some(light) = object.point_light {
            let position = scene.world_matrix(object.id()).w_axis.truncate();
            return PointLightData::new(position, light.color, light.intensity);
        }
    }
    PointLightData::new(Vec3::ZERO, Vec3::ZERO, 0.0)
}

/// A pass that renders scene content.
pub trait SceneRenderer {
    /// Writes this frame's uniform slices and snapshots the draw list.
    ///
    /// # Errors
    ///
    /// Returns an error if a uniform slice write fails.
    fn update(&mut self, scene: &Scene, writer: &mut FrameWriter<'_>) -> RenderResult<()>;

    /// Records draws into an already-begun render pass.
    ///
    /// # Errors
    ///
    /// Returns an error if recording fails.
    fn record(
        &self,
        cmd: &CommandBuffer,
        frame_index: usize,
        meshes: &MeshStore,
    ) -> RenderResult<()>;

    /// Updates the viewport extent after a target resize.
    fn on_resize(&mut self, extent: vk::Extent2D);
}

/// Forward-shaded mesh renderer.
///
/// Owns one uniform slice per [`ResourceKind`] and a graphics pipeline
/// matching its target's attachment formats.
pub struct ForwardRenderer {
    config: RendererConfig,
    slice: SliceIndex,
    pipeline_layout: PipelineLayout,
    pipeline: Pipeline,
    /// Descriptor sets per frame, cached at construction; set 0 is the
    /// camera, set 1 the point light.
    frame_sets: Vec<[vk::DescriptorSet; 2]>,
    dynamic_offsets: [u32; 2],
    extent: vk::Extent2D,
    draws: Vec<DrawCall>,
}

impl ForwardRenderer {
    /// Creates a forward renderer for a target with the given attachment
    /// formats.
    ///
    /// Registers a uniform slice with the context and builds the pipeline.
    /// `shader_dir` must contain the compiled SPIR-V modules
    /// (`forward.vert.spv` plus `forward.frag.spv` or
    /// `forward_picking.frag.spv`).
    ///
    /// # Errors
    ///
    /// Returns an error if the slice capacity is exhausted, shaders cannot
    /// be loaded, or pipeline creation fails.
    pub fn new(
        device: Arc<Device>,
        context: &mut RenderContext,
        config: RendererConfig,
        color_formats: &[vk::Format],
        depth_format: vk::Format,
        shader_dir: &Path,
    ) -> RenderResult<Self> {
        debug_assert_eq!(color_formats.len(), config.color_attachment_count as usize);

        let slice = context.register_renderer()?;
        context.create_descriptor_sets(ResourceKind::Camera)?;
        context.create_descriptor_sets(ResourceKind::PointLight)?;

        let mut frame_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for frame in 0..MAX_FRAMES_IN_FLIGHT {
            frame_sets.push([
                context.descriptor_set(ResourceKind::Camera, frame)?,
                context.descriptor_set(ResourceKind::PointLight, frame)?,
            ]);
        }
        let dynamic_offsets = [
            context.dynamic_offset(ResourceKind::Camera, slice),
            context.dynamic_offset(ResourceKind::PointLight, slice),
        ];

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("forward.vert.spv"),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_name = if config.enable_object_picking {
            "forward_picking.frag.spv"
        } else {
            "forward.frag.spv"
        };
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join(fragment_name),
            ShaderStage::Fragment,
            "main",
        )?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(PushConstants::SIZE as u32);
        let set_layouts = [context.set_layout(), context.set_layout()];
        let pipeline_layout = PipelineLayout::new(device.clone(), &set_layouts, &[push_range])?;

        let mut builder = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_input(
                vec![Vertex::binding_description()],
                Vertex::attribute_descriptions(),
            )
            .depth_attachment_format(depth_format);
        for &format in color_formats {
            builder = builder.color_attachment_format(format);
        }
        let pipeline = builder.build(device, &pipeline_layout)?;

        info!(
            "Forward renderer created: slice {}, {} color attachment(s), picking={}",
            slice.get(),
            config.color_attachment_count,
            config.enable_object_picking
        );

        Ok(Self {
            config,
            slice,
            pipeline_layout,
            pipeline,
            frame_sets,
            dynamic_offsets,
            extent: vk::Extent2D::default(),
            draws: Vec::new(),
        })
    }

    /// Returns this renderer's uniform slice.
    #[inline]
    pub fn slice(&self) -> SliceIndex {
        self.slice
    }

    /// Returns the pass configuration.
    #[inline]
    pub fn config(&self) -> RendererConfig {
        self.config
    }
}

impl SceneRenderer for ForwardRenderer {
    fn update(&mut self, scene: &Scene, writer: &mut FrameWriter<'_>) -> RenderResult<()> {
        let aspect = if self.extent.height > 0 {
            self.extent.width as f32 / self.extent.height as f32
        } else {
            0.0
        };

        if let Some(camera) = camera_data(scene, aspect) {
            writer.write(
                ResourceKind::Camera,
                self.slice,
                bytemuck::bytes_of(&camera),
            )?;
        } else {
            warn!("Scene has no camera, skipping draws");
            self.draws.clear();
            return Ok(());
        }

        let light = light_data(scene);
        writer.write(
            ResourceKind::PointLight,
            self.slice,
            bytemuck::bytes_of(&light),
        )?;

        self.draws = collect_draws(scene);
        Ok(())
    }

    fn record(
        &self,
        cmd: &CommandBuffer,
        frame_index: usize,
        meshes: &MeshStore,
    ) -> RenderResult<()> {
        if self.draws.is_empty() {
            return Ok(());
        }

        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        cmd.set_viewport(&viewport);
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        });

        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &self.frame_sets[frame_index],
            &self.dynamic_offsets,
        );

        for draw in &self.draws {
            let Some(mesh) = meshes.get(draw.mesh) else {
                warn!("Draw references unknown mesh {:?}", draw.mesh);
                continue;
            };

            let constants = PushConstants {
                model: draw.model,
                object_id: if self.config.enable_object_picking {
                    draw.object_id
                } else {
                    0
                },
                _padding: [0; 3],
            };
            cmd.push_constants(
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                &constants,
            );

            cmd.bind_vertex_buffers(0, &[mesh.vertex_buffer()], &[0]);
            cmd.bind_index_buffer(mesh.index_buffer(), 0, vk::IndexType::UINT32);
            cmd.draw_indexed(mesh.index_count(), 1, 0, 0, 0);
        }

        Ok(())
    }

    fn on_resize(&mut self, extent: vk::Extent2D) {
        self.extent = extent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_scene::{Camera, PointLight, Transform};

    #[test]
    fn test_push_constants_size_is_16_byte_multiple() {
        assert_eq!(PushConstants::SIZE % 16, 0);
        assert_eq!(PushConstants::SIZE, 80);
    }

    #[test]
    fn test_collect_draws_skips_meshless_objects() {
        let mut scene = Scene::new();
        let _empty = scene.spawn("empty");
        let meshed = scene.spawn("meshed");
        scene.get_mut(meshed).unwrap().mesh = Some(MeshHandle(0));

        let draws = collect_draws(&scene);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].object_id, meshed.get());
        assert_eq!(draws[0].mesh, MeshHandle(0));
    }

    #[test]
    fn test_collect_draws_uses_world_matrix() {
        let mut scene = Scene::new();
        let parent = scene.spawn("parent");
        scene.get_mut(parent).unwrap().transform =
            Transform::from_position(Vec3::new(3.0, 0.0, 0.0));
        let child = scene.spawn_child(parent, "child");
        scene.get_mut(child).unwrap().mesh = Some(MeshHandle(1));

        let draws = collect_draws(&scene);
        let origin = draws[0].model.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_camera_data_inverts_world_matrix() {
        let mut scene = Scene::new();
        let cam = scene.spawn("camera");
        {
            let object = scene.get_mut(cam).unwrap();
            object.camera = Some(Camera::default());
            object.transform = Transform::from_position(Vec3::new(0.0, 0.0, 5.0));
        }

        let data = camera_data(&scene, 1.0).unwrap();
        assert!((data.position - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);

        // The view matrix maps the camera position to the origin.
        let eye = data.view.transform_point3(data.position);
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn test_camera_data_none_without_camera() {
        let scene = Scene::new();
        assert!(camera_data(&scene, 1.0).is_none());
    }

    #[test]
    fn test_light_data_defaults_to_dark() {
        let scene = Scene::new();
        let light = light_data(&scene);
        assert_eq!(light.intensity, 0.0);
        assert_eq!(light.color, Vec3::ZERO);
    }

    #[test]
    fn test_light_data_takes_world_position() {
        let mut scene = Scene::new();
        let lamp = scene.spawn("lamp");
        {
            let object = scene.get_mut(lamp).unwrap();
            object.point_light = Some(PointLight::new(Vec3::ONE, 4.0, 20.0));
            object.transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        }

        let light = light_data(&scene);
        assert!((light.position - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
        assert_eq!(light.intensity, 4.0);
    }

    #[test]
    fn test_picking_config() {
        let config = RendererConfig::picking();
        assert_eq!(config.color_attachment_count, 2);
        assert!(config.enable_object_picking);
        assert_eq!(RendererConfig::default().color_attachment_count, 1);
    }
}
