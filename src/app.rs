use std::sync::Arc;
use std::thread::JoinHandle;

use pollster::FutureExt as _;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalPosition,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::camera::OrbitCamera;
use crate::config::RendererConfig;
use crate::demo;
use crate::error::RendererError;
use crate::renderer::{Renderer, WgpuBackend, WgpuContext};
use crate::scheduler::{PlaybackClock, TickOutcome};

const DRAG_SENSITIVITY: f32 = 0.3;

pub struct ViewerOptions {
    pub config: RendererConfig,
    /// Publish the synthetic scene at this rate.
    pub demo_rate: Option<f64>,
}

struct ViewerState {
    window: Arc<Window>,
    renderer: Renderer<WgpuBackend<'static>>,
    demo: Option<JoinHandle<()>>,
}

struct Viewer {
    config: Option<RendererConfig>,
    demo_rate: Option<f64>,
    state: Option<ViewerState>,
    camera: OrbitCamera,
    clock: PlaybackClock,
    dragging: bool,
    cursor: Option<PhysicalPosition<f64>>,
    fatal: Option<RendererError>,
}

impl Viewer {
    fn new(options: ViewerOptions) -> Self {
        Self {
            config: Some(options.config),
            demo_rate: options.demo_rate,
            state: None,
            camera: OrbitCamera::default(),
            clock: PlaybackClock::new(0),
            dragging: false,
            cursor: None,
            fatal: None,
        }
    }

    fn create_state(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RendererConfig,
    ) -> Result<ViewerState, RendererError> {
        let attributes = Window::default_attributes().with_title("tf-scene");
        let window = Arc::new(event_loop.create_window(attributes)?);
        let context = WgpuContext::new(window.clone()).block_on()?;
        let backend = WgpuBackend::new(context)?;
        let renderer = Renderer::new(config, backend);
        let demo = self.demo_rate.map(|rate| demo::spawn(renderer.sender(), rate));
        Ok(ViewerState {
            window,
            renderer,
            demo,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RendererError) {
        log::error!("{}", err);
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let time = self.clock.advance();
        let aspect = state.renderer.backend().context().aspect();
        state.renderer.set_view_projection(self.camera.view_proj(aspect));
        match state.renderer.tick(time) {
            Ok(TickOutcome::Continue) => state.window.request_redraw(),
            Ok(TickOutcome::Stopped) => event_loop.exit(),
            // lost or outdated surfaces are reconfigured by the backend
            Err(RendererError::Surface(_)) => state.window.request_redraw(),
            Err(err) => self.fail(event_loop, err),
        }
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };
        match self.create_state(event_loop, config) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::Resized(size) => {
                if let Some(state) = self.state.as_mut() {
                    state.renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (true, Some(last)) = (self.dragging, self.cursor) {
                    self.camera.rotate(
                        -(position.x - last.x) as f32 * DRAG_SENSITIVITY,
                        (position.y - last.y) as f32 * DRAG_SENSITIVITY,
                    );
                }
                self.cursor = Some(position);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                self.camera.zoom(steps);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Space),
                        state: ElementState::Released,
                        ..
                    },
                ..
            } => {
                if self.clock.is_paused() {
                    self.clock.resume();
                } else {
                    self.clock.pause();
                }
                let label = if self.clock.is_paused() {
                    "paused"
                } else {
                    "resumed"
                };
                log::info!("playback {}", label);
            }
            _ => (),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.renderer.dispose();
            // dropping the renderer closes the inbox, which stops the publisher
            drop(state.renderer);
            if let Some(demo) = state.demo {
                let _ = demo.join();
            }
        }
    }
}

pub fn run(options: ViewerOptions) -> Result<(), RendererError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    let mut viewer = Viewer::new(options);
    event_loop.run_app(&mut viewer)?;
    match viewer.fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
