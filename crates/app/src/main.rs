//! Ember engine demo application.
//!
//! Renders a small scene of cubes with a point light and click picking:
//! left-click an object to select it, printed with its name and id.

use std::path::Path;

use anyhow::Result;
use glam::Vec3;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use ember_core::Timer;
use ember_platform::{InputState, MouseButton, Window};
use ember_render::mesh;
use ember_render::system::RenderSystem;
use ember_scene::{Camera, GameObjectId, PointLight, Scene, Transform};

struct App {
    window: Option<Window>,
    render_system: Option<RenderSystem>,
    scene: Scene,
    spinner: Option<GameObjectId>,
    input: InputState,
    timer: Timer,
    /// Set when an unrecoverable error ends the loop; returned from `main`.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            render_system: None,
            scene: Scene::new(),
            spinner: None,
            input: InputState::new(),
            timer: Timer::new(),
            fatal: None,
        }
    }

    /// Records a fatal error and stops the event loop.
    fn abort(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("Fatal: {:?}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }

    /// Uploads the demo meshes and populates the scene.
    fn build_scene(&mut self, render_system: &mut RenderSystem) -> Result<()> {
        let (vertices, indices) = mesh::cube(Vec3::new(0.8, 0.2, 0.2));
        let red_cube = render_system.upload_mesh(&vertices, &indices)?;
        let (vertices, indices) = mesh::cube(Vec3::new(0.2, 0.3, 0.9));
        let blue_cube = render_system.upload_mesh(&vertices, &indices)?;

        let camera = self.scene.spawn("main camera");
        if let Some(object) = self.scene.get_mut(camera) {
            object.camera = Some(Camera::default());
            object.transform = Transform::from_position(Vec3::new(0.0, 1.5, 6.0));
        }

        let lamp = self.scene.spawn("lamp");
        if let Some(object) = self.scene.get_mut(lamp) {
            object.point_light = Some(PointLight::new(Vec3::ONE, 8.0, 30.0));
            object.transform = Transform::from_position(Vec3::new(2.0, 4.0, 3.0));
        }

        let spinner = self.scene.spawn("spinner");
        if let Some(object) = self.scene.get_mut(spinner) {
            object.mesh = Some(red_cube);
        }
        self.spinner = Some(spinner);

        // A child riding on the spinner, and a free-standing cube.
        let satellite = self.scene.spawn_child(spinner, "satellite");
        if let Some(object) = self.scene.get_mut(satellite) {
            object.mesh = Some(blue_cube);
            object.transform = Transform::from_position(Vec3::new(2.0, 0.0, 0.0))
                .with_scale(Vec3::splat(0.5));
        }

        let floor_cube = self.scene.spawn("pedestal");
        if let Some(object) = self.scene.get_mut(floor_cube) {
            object.mesh = Some(blue_cube);
            object.transform = Transform::from_position(Vec3::new(0.0, -1.5, 0.0))
                .with_scale(Vec3::new(4.0, 0.3, 4.0));
        }

        info!("Scene built: {} objects", self.scene.len());
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(window) = &self.window else {
            return Ok(());
        };
        let Some(render_system) = &mut self.render_system else {
            return Ok(());
        };

        let delta = self.timer.delta_secs();
        if let Some(spinner) = self.spinner {
            if let Some(object) = self.scene.get_mut(spinner) {
                object.transform.rotate_axis(Vec3::Y, delta * 0.8);
            }
        }

        if self.input.is_mouse_just_pressed(MouseButton::Left) {
            let (x, y) = self.input.cursor_position();
            if x >= 0.0 && y >= 0.0 {
                render_system.request_pick(x as u32, y as u32);
            }
        }

        render_system.draw_frame(&self.scene, window.extent())?;

        if let Some(hit) = render_system.poll_pick() {
            match hit.and_then(|id| self.scene.get(id)) {
                Some(object) => info!("Picked '{}' (id {})", object.name, object.id().get()),
                None => info!("Picked nothing"),
            }
        }

        self.input.begin_frame();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, 1280, 720, "Ember") {
            Ok(window) => window,
            Err(e) => {
                self.abort(event_loop, anyhow::Error::new(e).context("creating window"));
                return;
            }
        };

        let mut render_system = match RenderSystem::new(&window, Path::new("shaders"), true) {
            Ok(render_system) => render_system,
            Err(e) => {
                self.abort(
                    event_loop,
                    anyhow::Error::new(e).context("creating render system"),
                );
                return;
            }
        };

        if let Err(e) = self.build_scene(&mut render_system) {
            self.abort(event_loop, e.context("building scene"));
            return;
        }

        info!("Initialization complete, entering main loop");
        self.render_system = Some(render_system);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.abort(event_loop, e.context("rendering frame"));
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        if key == KeyCode::Escape {
                            event_loop.exit();
                            return;
                        }
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    ember_core::init_logging();
    info!("Starting Ember");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    exit_result(app.fatal)
}

/// Maps a stored fatal error to the process exit result.
fn exit_result(fatal: Option<anyhow::Error>) -> Result<()> {
    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_result_propagates_fatal_error() {
        assert!(exit_result(None).is_ok());

        let result = exit_result(Some(anyhow::anyhow!("device lost")));
        assert!(result.is_err());
    }
}
