//! Window management using winit.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use ember_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// Owns a `vk::SurfaceKHR` and destroys it on drop. The Vulkan instance
/// the surface was created from must outlive this struct.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Returns the raw Vulkan surface handle.
    ///
    /// Valid only as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Returns the surface loader, for capability and format queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface and
        // the loader comes from the same instance; this is the only place
        // the surface is destroyed.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Window wrapper providing the raw handles Vulkan surface creation needs.
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Creates a window with the given dimensions and title.
    ///
    /// # Errors
    ///
    /// Returns an error if window creation fails.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Returns a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Returns the current framebuffer size.
    ///
    /// Queried live from the window, so a minimized window reports (0, 0)
    /// and the caller can skip the frame.
    pub fn extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Requests a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// The instance must outlive the returned [`Surface`].
    ///
    /// # Errors
    ///
    /// Returns an error if the window handles are unavailable or Vulkan
    /// surface creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: The handles come from a live winit window; the surface is
        // destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}
