//! Application state and the winit event loop.
//!
//! Single-threaded and frame-driven: the loop blocks waiting for input,
//! and every cache mutation (shaping lookups, atlas uploads, rasterization)
//! happens on this thread between the event wait and the buffer swap.

use std::sync::Arc;

use anyhow::Context as _;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::config::Config;
use crate::document::Document;
use crate::font::{FaceCollection, ShapingCache};
use crate::gpu::{Gpu, Renderer};
use crate::viewport::Viewport;

pub struct App {
    config: Config,
    document: Document,
    fonts: FaceCollection,
    shaping: ShapingCache,
    viewport: Viewport,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    renderer: Option<Renderer>,
}

impl App {
    /// Build the application and run the event loop to completion.
    pub fn run(config: Config, document: Document) -> anyhow::Result<()> {
        let face_paths = if config.font.faces.is_empty() {
            crate::font::discovery::default_faces()
                .context("no usable monospace font found on this system")?
        } else {
            config.font.faces.clone()
        };
        let fonts = FaceCollection::load(&face_paths, config.font.effective_size())?;

        let visible = (config.window.height as usize / config.font.line_height()).max(1);
        let viewport = Viewport::new(document.len(), visible);

        let event_loop = EventLoop::new().context("could not create event loop")?;

        let mut app = Self {
            config,
            document,
            fonts,
            shaping: ShapingCache::new(),
            viewport,
            window: None,
            gpu: None,
            renderer: None,
        };
        event_loop.run_app(&mut app).context("event loop failed")?;
        Ok(())
    }

    fn render(&mut self) {
        let (Some(gpu), Some(renderer)) = (self.gpu.as_ref(), self.renderer.as_mut()) else {
            return;
        };
        renderer.draw_frame(
            gpu,
            &self.document,
            &self.viewport,
            &mut self.fonts,
            &mut self.shaping,
        );
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(size.width, size.height);
        }
        let visible = (size.height as usize / self.config.font.line_height()).max(1);
        self.viewport.set_visible_lines(visible);
    }

    /// Apply a key press. Returns true when the viewport changed.
    fn handle_key(&mut self, key: &Key, event_loop: &ActiveEventLoop) -> bool {
        match key {
            Key::Named(NamedKey::ArrowDown) => {
                self.viewport.scroll(1);
                true
            }
            Key::Named(NamedKey::ArrowUp) => {
                self.viewport.scroll(-1);
                true
            }
            Key::Named(NamedKey::PageDown) => {
                self.viewport.scroll(self.viewport.visible_lines() as isize);
                true
            }
            Key::Named(NamedKey::PageUp) => {
                self.viewport.scroll(-(self.viewport.visible_lines() as isize));
                true
            }
            Key::Named(NamedKey::Home) => {
                self.viewport.jump_to_start();
                true
            }
            Key::Named(NamedKey::End) => {
                self.viewport.jump_to_end();
                true
            }
            Key::Named(NamedKey::Escape) => {
                event_loop.exit();
                false
            }
            Key::Character(s) => match s.as_str() {
                "j" => {
                    self.viewport.scroll(1);
                    true
                }
                "k" => {
                    self.viewport.scroll(-1);
                    true
                }
                "q" => {
                    event_loop.exit();
                    false
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fully event-driven: sleep until input arrives, render on demand.
        event_loop.set_control_flow(ControlFlow::Wait);

        let title = format!(
            "folio — {}",
            self.document
                .path()
                .file_name()
                .map_or_else(|| "untitled".into(), |n| n.to_string_lossy()),
        );
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("could not create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let gpu = match Gpu::new(window.clone()) {
            Ok(g) => g,
            Err(e) => {
                log::error!("could not initialize GPU: {e:#}");
                event_loop.exit();
                return;
            }
        };
        let renderer = Renderer::new(&gpu, &self.fonts, &self.config);

        let visible = (gpu.surface_config.height as usize
            / self.config.font.line_height())
        .max(1);
        self.viewport.set_visible_lines(visible);

        window.request_redraw();
        self.window = Some(window);
        self.gpu = Some(gpu);
        self.renderer = Some(renderer);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::RedrawRequested => self.render(),

            WindowEvent::Resized(size) => {
                self.handle_resize(size);
                self.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                if self.handle_key(&event.logical_key, event_loop) {
                    self.request_redraw();
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y.round() as isize,
                    MouseScrollDelta::PixelDelta(pos) => {
                        let lh = self.config.font.line_height() as f64;
                        -(pos.y / lh).round() as isize
                    }
                };
                if lines != 0 {
                    self.viewport.scroll(lines);
                    self.request_redraw();
                }
            }

            _ => {}
        }
    }
}
