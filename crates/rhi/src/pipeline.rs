//! Graphics pipeline creation for dynamic rendering.
//!
//! This module provides:
//! - [`PipelineLayout`] wrapping VkPipelineLayout (descriptor set layouts + push constants)
//! - [`Pipeline`] wrapping VkPipeline
//! - [`GraphicsPipelineBuilder`] for assembling fixed-function state
//!
//! Pipelines target dynamic rendering (Vulkan 1.3): attachment formats are
//! supplied through `VkPipelineRenderingCreateInfo` instead of a render pass,
//! and viewport/scissor are always dynamic state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use ember_rhi::shader::Shader;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     vertex: &Shader,
//! #     fragment: &Shader,
//! # ) -> Result<(), ember_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(vertex)
//!     .fragment_shader(fragment)
//!     .color_attachment_format(vk::Format::B8G8R8A8_SRGB)
//!     .depth_attachment_format(vk::Format::D32_SFLOAT)
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// Pipeline layout wrapper.
///
/// Defines the descriptor set layouts and push constant ranges available to
/// pipelines created with this layout.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout: {} set layout(s), {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed pipeline layout");
    }
}

/// Primitive topology for input assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    /// Converts to the Vulkan primitive topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Self::PointList => vk::PrimitiveTopology::POINT_LIST,
            Self::LineList => vk::PrimitiveTopology::LINE_LIST,
            Self::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
}

impl PolygonMode {
    /// Converts to the Vulkan polygon mode.
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            Self::Fill => vk::PolygonMode::FILL,
            Self::Line => vk::PolygonMode::LINE,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding order that defines the front face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

impl FrontFace {
    /// Converts to the Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            Self::Clockwise => vk::FrontFace::CLOCKWISE,
            Self::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

/// Depth comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    /// Converts to the Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            Self::Never => vk::CompareOp::NEVER,
            Self::Less => vk::CompareOp::LESS,
            Self::Equal => vk::CompareOp::EQUAL,
            Self::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            Self::Greater => vk::CompareOp::GREATER,
            Self::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            Self::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Per-attachment color blend state.
#[derive(Clone, Copy, Debug)]
pub struct ColorBlendAttachment {
    /// Whether blending is enabled for this attachment.
    pub blend_enable: bool,
    /// Source color blend factor.
    pub src_color_blend_factor: vk::BlendFactor,
    /// Destination color blend factor.
    pub dst_color_blend_factor: vk::BlendFactor,
    /// Source alpha blend factor.
    pub src_alpha_blend_factor: vk::BlendFactor,
    /// Destination alpha blend factor.
    pub dst_alpha_blend_factor: vk::BlendFactor,
}

impl ColorBlendAttachment {
    /// Opaque output: blending disabled, all channels written.
    pub fn disabled() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        }
    }

    /// Standard alpha blending (src over dst).
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        }
    }

    /// Converts to the Vulkan color blend attachment state.
    pub fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color_blend_factor)
            .dst_color_blend_factor(self.dst_color_blend_factor)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(self.src_alpha_blend_factor)
            .dst_alpha_blend_factor(self.dst_alpha_blend_factor)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
    /// Bind point (always graphics for pipelines built here).
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Returns the pipeline bind point.
    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Destroyed pipeline");
    }
}

/// Builder for graphics pipelines.
///
/// Defaults: triangle list, fill mode, back-face culling with
/// counter-clockwise front faces, depth test and write enabled with
/// `Less`, no blending, single-sampled. Viewport and scissor are dynamic
/// state and must be set at record time.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: PrimitiveTopology,
    polygon_mode: PolygonMode,
    cull_mode: CullMode,
    front_face: FrontFace,
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,
    color_blend_attachments: Vec<ColorBlendAttachment>,
    color_attachment_formats: Vec<vk::Format>,
    depth_attachment_format: Option<vk::Format>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a builder with default fixed-function state.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            color_blend_attachments: Vec::new(),
            color_attachment_formats: Vec::new(),
            depth_attachment_format: None,
        }
    }

    /// Sets the vertex shader (required).
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader (required).
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Sets the vertex input bindings and attributes.
    pub fn vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }

    /// Sets the primitive topology.
    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Sets the polygon rasterization mode.
    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    /// Sets the face culling mode.
    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    /// Sets the front face winding order.
    pub fn front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    /// Configures depth testing.
    pub fn depth_state(mut self, test: bool, write: bool, compare: CompareOp) -> Self {
        self.depth_test_enable = test;
        self.depth_write_enable = write;
        self.depth_compare_op = compare;
        self
    }

    /// Adds a color attachment format for dynamic rendering.
    ///
    /// The blend state for this attachment defaults to
    /// [`ColorBlendAttachment::disabled`]; use
    /// [`color_attachment_format_blended`](Self::color_attachment_format_blended)
    /// to override it. One format must be added per color attachment of the
    /// render target this pipeline draws into, in attachment order.
    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_formats.push(format);
        self.color_blend_attachments
            .push(ColorBlendAttachment::disabled());
        self
    }

    /// Adds a color attachment format with an explicit blend state.
    pub fn color_attachment_format_blended(
        mut self,
        format: vk::Format,
        blend: ColorBlendAttachment,
    ) -> Self {
        self.color_attachment_formats.push(format);
        self.color_blend_attachments.push(blend);
        self
    }

    /// Sets the depth attachment format for dynamic rendering.
    pub fn depth_attachment_format(mut self, format: vk::Format) -> Self {
        self.depth_attachment_format = Some(format);
        self
    }

    /// Builds the graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a required shader is missing or
    /// no color attachment format was set, or the Vulkan error if pipeline
    /// creation fails.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        if self.color_attachment_formats.is_empty() {
            return Err(RhiError::PipelineError(
                "At least one color attachment format is required".to_string(),
            ));
        }

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        // Counts only; actual viewport/scissor come from dynamic state.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode.to_vk())
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = self
            .color_blend_attachments
            .iter()
            .map(|a| a.to_vk())
            .collect();

        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.color_attachment_formats);
        if let Some(depth_format) = self.depth_attachment_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| e)?
        };

        info!(
            "Created graphics pipeline: {} color attachment(s), depth={:?}",
            self.color_attachment_formats.len(),
            self.depth_attachment_format
        );

        Ok(Pipeline {
            device,
            pipeline: pipelines[0],
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::TriangleList.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(
            PrimitiveTopology::LineList.to_vk(),
            vk::PrimitiveTopology::LINE_LIST
        );
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_compare_op_to_vk() {
        assert_eq!(CompareOp::Less.to_vk(), vk::CompareOp::LESS);
        assert_eq!(
            CompareOp::GreaterOrEqual.to_vk(),
            vk::CompareOp::GREATER_OR_EQUAL
        );
    }

    #[test]
    fn test_blend_disabled_by_default() {
        let blend = ColorBlendAttachment::default();
        assert!(!blend.blend_enable);

        let state = blend.to_vk();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_alpha_blend_state() {
        let state = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology, PrimitiveTopology::TriangleList);
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::CounterClockwise);
        assert!(builder.depth_test_enable);
        assert!(builder.depth_write_enable);
        assert!(builder.color_attachment_formats.is_empty());
    }

    #[test]
    fn test_builder_tracks_one_blend_state_per_format() {
        let builder = GraphicsPipelineBuilder::new()
            .color_attachment_format(vk::Format::B8G8R8A8_SRGB)
            .color_attachment_format_blended(
                vk::Format::R32_UINT,
                ColorBlendAttachment::disabled(),
            );
        assert_eq!(
            builder.color_attachment_formats.len(),
            builder.color_blend_attachments.len()
        );
    }
}
