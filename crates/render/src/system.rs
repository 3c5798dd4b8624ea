//! Top-level render system.
//!
//! [`RenderSystem`] owns the whole GPU stack for one window: instance,
//! device, swapchain target, optional offscreen picking target, the
//! frames-in-flight machinery, and the scene renderers. One call to
//! [`RenderSystem::draw_frame`] runs a complete frame:
//!
//! 1. wait for the current slot's fence and acquire a swapchain image
//! 2. service any pending pick against the slot's last completed id image
//! 3. write this frame's uniform slices
//! 4. record the picking pass, then the swapchain pass
//! 5. submit and present
//!
//! Out-of-date or suboptimal results mark the swapchain dirty; the rebuild
//! happens at the top of the next frame, never mid-frame.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use ember_platform::{Surface, Window};
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::RhiError;
use ember_scene::{GameObjectId, MeshHandle, Scene};

use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::frame::{FrameAcquire, FrameContext, PresentOutcome};
use crate::mesh::{MeshStore, Vertex};
use crate::picking::Picker;
use crate::renderer::{ForwardRenderer, RendererConfig, SceneRenderer};
use crate::target::{OffscreenTarget, RenderTarget, SwapchainTarget};

/// Uniform slices reserved per resource kind. Two passes today; headroom
/// for overlays and debug views.
const SLICE_CAPACITY: u32 = 8;

/// Owns all rendering state for one window.
///
/// Field order doubles as teardown order: renderers and frame resources
/// drop before the targets, targets before the surface, the surface before
/// the instance.
pub struct RenderSystem {
    scene_renderer: ForwardRenderer,
    picking_renderer: Option<ForwardRenderer>,
    meshes: MeshStore,
    picker: Option<Picker>,
    context: RenderContext,
    offscreen: Option<OffscreenTarget>,
    target: SwapchainTarget,
    frames: FrameContext,
    _surface: Surface,
    device: Arc<Device>,
    /// Kept alive past the surface and swapchain that were created from it.
    _instance: Arc<Instance>,
    swapchain_dirty: bool,
}

impl RenderSystem {
    /// Brings up the full Vulkan stack for `window`.
    ///
    /// `shader_dir` must contain the compiled SPIR-V modules. Picking
    /// resources are only created when `enable_picking` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage of device or resource creation fails.
    pub fn new(window: &Window, shader_dir: &Path, enable_picking: bool) -> RenderResult<Self> {
        let (width, height) = window.extent();
        info!("Initializing render system ({}x{})", width, height);

        let instance = Arc::new(Instance::new(cfg!(debug_assertions))?);
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or_else(|| RhiError::SwapchainError("Device has no graphics queue".to_string()))?;

        let target = SwapchainTarget::new(
            instance.clone(),
            device.clone(),
            surface.handle(),
            width,
            height,
        )?;
        let frames = FrameContext::new(device.clone(), graphics_family)?;
        let mut context = RenderContext::new(device.clone(), SLICE_CAPACITY)?;

        let extent = target.extent();
        let mut scene_renderer = ForwardRenderer::new(
            device.clone(),
            &mut context,
            RendererConfig::default(),
            &target.color_formats(),
            target.depth_format(),
            shader_dir,
        )?;
        scene_renderer.on_resize(extent);

        let (offscreen, picking_renderer, picker) = if enable_picking {
            let offscreen = OffscreenTarget::new(
                device.clone(),
                target.depth_format(),
                extent.width,
                extent.height,
            )?;
            let mut picking_renderer = ForwardRenderer::new(
                device.clone(),
                &mut context,
                RendererConfig::picking(),
                &offscreen.color_formats(),
                offscreen.depth_format(),
                shader_dir,
            )?;
            picking_renderer.on_resize(extent);
            let picker = Picker::new(device.clone())?;
            (Some(offscreen), Some(picking_renderer), Some(picker))
        } else {
            (None, None, None)
        };

        let meshes = MeshStore::new(device.clone());

        info!(
            "Render system initialized: {} swapchain images, picking={}",
            target.image_count(),
            enable_picking
        );

        Ok(Self {
            scene_renderer,
            picking_renderer,
            meshes,
            picker,
            context,
            offscreen,
            target,
            frames,
            _surface: surface,
            device,
            _instance: instance,
            swapchain_dirty: false,
        })
    }

    /// Uploads mesh data and returns a handle scene objects can reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the GPU upload fails.
    pub fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshHandle> {
        self.meshes.upload(vertices, indices)
    }

    /// Requests a pick at window coordinates; resolved a frame or two later.
    ///
    /// A no-op when picking was not enabled.
    pub fn request_pick(&mut self, x: u32, y: u32) {
        if let Some(picker) = &mut self.picker {
            picker.request(x, y);
        }
    }

    /// Hands out a resolved pick exactly once; inner `None` is a miss.
    pub fn poll_pick(&mut self) -> Option<Option<GameObjectId>> {
        self.picker.as_mut().and_then(Picker::poll)
    }

    /// Renders one frame of `scene` at the window's current extent.
    ///
    /// A zero extent (minimized window) skips the frame. Swapchain
    /// recreation is handled internally; only unrecoverable errors, such as
    /// a surface format change, propagate.
    ///
    /// # Errors
    ///
    /// Returns an error if a Vulkan operation or uniform write fails.
    pub fn draw_frame(&mut self, scene: &Scene, window_extent: (u32, u32)) -> RenderResult<()> {
        let extent = vk::Extent2D {
            width: window_extent.0,
            height: window_extent.1,
        };
        if extent.width == 0 || extent.height == 0 {
            debug!("Window minimized, skipping frame");
            return Ok(());
        }

        if self.swapchain_dirty {
            self.target.rebuild(extent)?;
            self.handle_new_extent(extent)?;
            self.swapchain_dirty = false;
        } else if extent != self.target.extent() {
            self.target.on_resize(extent)?;
            self.handle_new_extent(extent)?;
        }

        let frame_index = self.frames.current_frame();

        let (image_index, suboptimal_acquire) =
            match self.frames.acquire(self.target.swapchain())? {
                FrameAcquire::Ready {
                    image_index,
                    suboptimal,
                } => (image_index, suboptimal),
                FrameAcquire::OutOfDate => {
                    debug!("Swapchain out of date on acquire");
                    self.swapchain_dirty = true;
                    return Ok(());
                }
            };

        // The slot's fence has been waited, so the id image written the
        // last time this slot ran is complete and safe to read back.
        if let (Some(picker), Some(offscreen)) = (&mut self.picker, &mut self.offscreen) {
            picker.service(offscreen, frame_index)?;
        }

        {
            let mut writer = self.context.begin_frame(frame_index)?;
            self.scene_renderer.update(scene, &mut writer)?;
            if let Some(picking_renderer) = &mut self.picking_renderer {
                picking_renderer.update(scene, &mut writer)?;
            }
        }

        let cmd = self.frames.current_slot().command_buffer();

        if let (Some(offscreen), Some(picking_renderer)) =
            (&mut self.offscreen, &self.picking_renderer)
        {
            offscreen.begin_rendering(cmd, frame_index);
            picking_renderer.record(cmd, frame_index, &self.meshes)?;
            offscreen.end_rendering(cmd, frame_index);
        }

        self.target.begin_rendering(cmd, image_index as usize);
        self.scene_renderer
            .record(cmd, frame_index, &self.meshes)?;
        self.target.end_rendering(cmd, image_index as usize);

        match self
            .frames
            .submit_and_present(self.target.swapchain(), image_index)?
        {
            PresentOutcome::Presented { suboptimal } => {
                if suboptimal || suboptimal_acquire {
                    debug!("Swapchain suboptimal, scheduling rebuild");
                    self.swapchain_dirty = true;
                }
            }
            PresentOutcome::OutOfDate => {
                debug!("Swapchain out of date on present");
                self.swapchain_dirty = true;
            }
        }

        Ok(())
    }

    fn handle_new_extent(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        let actual = self.target.extent();
        self.scene_renderer.on_resize(actual);
        if let Some(offscreen) = &mut self.offscreen {
            offscreen.on_resize(extent)?;
            if let Some(picking_renderer) = &mut self.picking_renderer {
                picking_renderer.on_resize(offscreen.extent());
            }
        }
        Ok(())
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.target.extent()
    }

    /// Blocks until every in-flight frame has finished on the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the fence wait fails.
    pub fn wait_for_all_frames(&mut self) -> RenderResult<()> {
        self.frames.wait_for_all_frames()
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        // All owned resources drop after this, so nothing may still be in
        // flight on the GPU.
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during teardown: {:?}", e);
        }
        info!("Render system destroyed");
    }
}
