use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::camera::Camera;
use crate::engine::Engine;
use crate::protocol::{Command, Metrics};
use crate::renderer::Renderer;
use crate::rules::Ruleset;

/// Initial simulation cadence in steps per second.
const INITIAL_SPEED: f64 = 10.0;

/// Fill density used by the randomize key.
const RANDOM_DENSITY: f64 = 0.3;

/// The available rulesets for exploration.
fn ruleset_catalogue() -> Vec<(&'static str, Ruleset)> {
    vec![
        ("Conway", Ruleset::conway()),
        ("Immigration", Ruleset::immigration()),
        ("Seeds", Ruleset::seeds()),
        ("Predation", Ruleset::predation()),
    ]
}

/// Host application: owns the window, the GPU surface, and the engine, and
/// translates raw input into protocol commands. All engine state changes go
/// through the command channel; the host only mirrors the camera so it can
/// do zoom/pan math locally.
pub struct App {
    gpu: Option<GpuState>,
    engine: Option<Engine>,
    command_tx: Sender<Command>,
    /// Handed to the engine at initialization.
    command_rx: Option<Receiver<Command>>,
    metrics_rx: Option<Receiver<Metrics>>,
    last_metrics: Option<Metrics>,

    catalogue: Vec<(&'static str, Ruleset)>,
    current_ruleset: usize,
    /// Index into the current ruleset's tribes used for painting.
    paint_tribe: usize,

    /// Host-side mirror of the engine camera, used for input math.
    camera: Camera,
    running: bool,
    speed: f64,
    uncapped: bool,

    painting: bool,
    panning: bool,
    cursor: (f64, f64),
    last_mouse_pos: Option<(f64, f64)>,
}

struct GpuState {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    renderer: Renderer,
}

impl App {
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::channel();
        let catalogue = ruleset_catalogue();
        Self {
            gpu: None,
            engine: None,
            command_tx,
            command_rx: Some(command_rx),
            metrics_rx: None,
            last_metrics: None,
            catalogue,
            current_ruleset: 0,
            paint_tribe: 1,
            camera: Camera {
                scale: 1.0,
                offset_x: 0.0,
                offset_y: 0.0,
                min_scale: 1.0,
            },
            running: true,
            speed: INITIAL_SPEED,
            uncapped: false,
            painting: false,
            panning: false,
            cursor: (0.0, 0.0),
            last_mouse_pos: None,
        }
    }

    fn send(&self, command: Command) {
        // The engine lives in this struct; a send can only fail mid-teardown.
        let _ = self.command_tx.send(command);
    }

    fn current_dims(&self) -> (u32, u32) {
        let rs = &self.catalogue[self.current_ruleset].1;
        (rs.cols, rs.rows)
    }

    /// Build the GPU surface, the renderer, and the engine. All fatal setup
    /// failures surface here, before the loop starts.
    fn initialize(&mut self, window: Arc<Window>) -> Result<()> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;

        log::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .context("failed to create device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let ruleset = &self.catalogue[self.current_ruleset].1;
        let command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| anyhow!("engine already initialized"))?;
        let (metrics_tx, metrics_rx) = mpsc::channel();

        let engine = Engine::new(
            ruleset,
            (config.width, config.height),
            self.speed,
            self.running,
            command_rx,
            metrics_tx,
        )
        .context("initial ruleset rejected")?;

        let renderer = Renderer::new(&device, surface_format, ruleset.cols, ruleset.rows);

        self.camera = engine.camera().clone();
        self.metrics_rx = Some(metrics_rx);
        self.engine = Some(engine);
        self.gpu = Some(GpuState {
            window,
            surface,
            device,
            queue,
            config,
            renderer,
        });
        Ok(())
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let Some(ref mut gpu) = self.gpu else { return };
        gpu.config.width = new_size.width;
        gpu.config.height = new_size.height;
        gpu.surface.configure(&gpu.device, &gpu.config);

        self.send(Command::Resize {
            width: new_size.width,
            height: new_size.height,
        });

        // The lower zoom bound follows the viewport (contain policy); the
        // view itself is kept and may now clip.
        let (cols, rows) = self.current_dims();
        self.camera
            .update_bounds(new_size.width as f32, new_size.height as f32, cols, rows);
        self.send_camera();
    }

    fn send_camera(&self) {
        self.send(Command::Camera {
            scale: self.camera.scale,
            offset_x: self.camera.offset_x,
            offset_y: self.camera.offset_y,
        });
    }

    /// One display frame: drive the engine, then draw whatever grid it has.
    fn render_frame(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let Some(gpu) = self.gpu.as_mut() else { return };

        engine.tick(Instant::now());

        if engine.take_layout_changed() {
            let grid = engine.grid();
            gpu.renderer.rebuild_grid(&gpu.device, grid.cols, grid.rows);
            // The engine reset its camera for the new dimensions; adopt it.
            self.camera = engine.camera().clone();
        }

        if let Some(rx) = &self.metrics_rx {
            while let Ok(metrics) = rx.try_recv() {
                self.last_metrics = Some(metrics);
            }
        }

        let output = match gpu.surface.get_current_texture() {
            Ok(tex) => tex,
            Err(wgpu::SurfaceError::Lost) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of GPU memory");
                return;
            }
            Err(e) => {
                log::warn!("Surface error: {e:?}");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let grid = engine.grid();
        let uniform = engine.camera().uniform(
            gpu.config.width as f32,
            gpu.config.height as f32,
            grid.cols,
            grid.rows,
        );
        gpu.renderer.update_camera(&gpu.queue, &uniform);
        gpu.renderer
            .upload_colors(&gpu.queue, grid, &engine.ruleset().tribes);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        gpu.renderer.render(&mut encoder, &view);
        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        let status = if self.running { "▶" } else { "⏸" };
        let name = self.catalogue[self.current_ruleset].0;
        let generation = engine.generation();
        let sim_fps = self.last_metrics.map(|m| m.sim_fps).unwrap_or(0.0);
        let speed = if self.uncapped {
            "max".to_string()
        } else {
            format!("{:.1}/s", self.speed)
        };
        let paint = &engine.ruleset().tribes[self.paint_tribe.min(engine.ruleset().tribe_count() - 1)].id;
        gpu.window.set_title(&format!(
            "tribelife | {status} Gen {generation} | {name} | {sim_fps:.0} sim/s | speed {speed} | paint {paint}",
        ));

        gpu.window.request_redraw();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }

        match event.logical_key {
            Key::Named(NamedKey::Space) => {
                self.running = !self.running;
                self.send(Command::SetRunning {
                    running: self.running,
                });
                log::info!(
                    "Simulation {}",
                    if self.running { "resumed" } else { "paused" }
                );
            }
            Key::Named(NamedKey::ArrowUp) => {
                self.speed = (self.speed * 1.5).min(480.0);
                if !self.uncapped {
                    self.send(Command::SetSpeed { speed: self.speed });
                }
                log::info!("Speed: {:.1} steps/s", self.speed);
            }
            Key::Named(NamedKey::ArrowDown) => {
                self.speed = (self.speed / 1.5).max(0.25);
                if !self.uncapped {
                    self.send(Command::SetSpeed { speed: self.speed });
                }
                log::info!("Speed: {:.1} steps/s", self.speed);
            }
            Key::Named(NamedKey::Escape) => {
                event_loop.exit();
            }
            Key::Character(ref c) => match c.as_str() {
                "m" => {
                    self.uncapped = !self.uncapped;
                    let speed = if self.uncapped { -1.0 } else { self.speed };
                    self.send(Command::SetSpeed { speed });
                    log::info!(
                        "Speed: {}",
                        if self.uncapped { "uncapped" } else { "capped" }
                    );
                }
                "h" => {
                    self.reset_camera();
                    log::info!("Camera reset");
                }
                "n" => {
                    self.current_ruleset = (self.current_ruleset + 1) % self.catalogue.len();
                    let (name, ruleset) = &self.catalogue[self.current_ruleset];
                    self.paint_tribe = 1.min(ruleset.tribes.len() - 1);
                    self.send(Command::SetRuleset {
                        ruleset: ruleset.clone(),
                    });
                    log::info!("Ruleset: {name}");
                }
                "r" => {
                    self.randomize();
                    log::info!("Grid randomized");
                }
                "c" => {
                    self.clear();
                    log::info!("Grid cleared");
                }
                digit if digit.len() == 1 && digit.chars().all(|ch| ch.is_ascii_digit()) => {
                    let index = digit.parse::<usize>().unwrap_or(0);
                    let tribes = &self.catalogue[self.current_ruleset].1.tribes;
                    if index < tribes.len() {
                        self.paint_tribe = index;
                        log::info!("Painting with '{}'", tribes[index].id);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn reset_camera(&mut self) {
        let Some(ref gpu) = self.gpu else { return };
        let (cols, rows) = self.current_dims();
        self.camera = Camera::fit_cover(
            gpu.config.width as f32,
            gpu.config.height as f32,
            cols,
            rows,
        );
        self.send_camera();
    }

    /// Replace the grid with random noise, expressed purely as draw
    /// commands so the engine surface stays the wire protocol.
    fn randomize(&mut self) {
        self.clear();

        let ruleset = &self.catalogue[self.current_ruleset].1;
        let live_tribes = ruleset.tribes.len() - 1;
        if live_tribes == 0 {
            return;
        }

        let mut rng = rand::thread_rng();
        let mut per_tribe: Vec<Vec<(i32, i32)>> = vec![Vec::new(); ruleset.tribes.len()];
        for y in 0..ruleset.rows as i32 {
            for x in 0..ruleset.cols as i32 {
                if rng.gen_bool(RANDOM_DENSITY) {
                    per_tribe[rng.gen_range(1..=live_tribes)].push((x, y));
                }
            }
        }
        for (index, cells) in per_tribe.into_iter().enumerate() {
            if !cells.is_empty() {
                self.send(Command::Draw {
                    tribe: ruleset.tribes[index].id.clone(),
                    cells,
                });
            }
        }
    }

    fn clear(&mut self) {
        let ruleset = &self.catalogue[self.current_ruleset].1;
        let cells = (0..ruleset.rows as i32)
            .flat_map(|y| (0..ruleset.cols as i32).map(move |x| (x, y)))
            .collect();
        self.send(Command::Draw {
            tribe: crate::rules::DEAD_TRIBE_ID.to_string(),
            cells,
        });
    }

    /// Paint at the cursor. When zoomed out below one pixel per cell, widen
    /// the brush so a stroke still leaves a visible trail.
    fn paint_at(&mut self, px: f64, py: f64) {
        let (world_x, world_y) = self.camera.screen_to_world(px as f32, py as f32);
        let span = (1.0 / self.camera.scale).ceil().max(1.0) as i32;
        let start_x = world_x.floor() as i32 - span / 2;
        let start_y = world_y.floor() as i32 - span / 2;

        let mut cells = Vec::with_capacity((span * span) as usize);
        for dy in 0..span {
            for dx in 0..span {
                cells.push((start_x + dx, start_y + dy));
            }
        }

        let tribes = &self.catalogue[self.current_ruleset].1.tribes;
        let tribe = tribes[self.paint_tribe.min(tribes.len() - 1)].id.clone();
        self.send(Command::Draw { tribe, cells });
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_none() {
            let attrs = WindowAttributes::default()
                .with_title("tribelife")
                .with_inner_size(PhysicalSize::new(1024u32, 768));

            let window = Arc::new(
                event_loop
                    .create_window(attrs)
                    .expect("Failed to create window"),
            );

            if let Err(err) = self.initialize(window) {
                log::error!("Engine setup failed: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.resize(size);
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key(event_loop, event);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y as f64,
                    MouseScrollDelta::PixelDelta(pos) => pos.y / 50.0,
                };
                let direction = if scroll > 0.0 { 1 } else { -1 };
                self.camera
                    .zoom(direction, self.cursor.0 as f32, self.cursor.1 as f32);
                self.send_camera();
            }
            WindowEvent::MouseInput { state, button, .. } => match button {
                MouseButton::Left => {
                    self.painting = state == ElementState::Pressed;
                    if self.painting {
                        let (px, py) = self.cursor;
                        self.paint_at(px, py);
                    }
                }
                MouseButton::Right => {
                    self.panning = state == ElementState::Pressed;
                    if !self.panning {
                        self.last_mouse_pos = None;
                    }
                }
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                if self.panning {
                    if let Some((lx, ly)) = self.last_mouse_pos {
                        let (cols, rows) = self.current_dims();
                        self.camera.pan(
                            (lx - position.x) as f32,
                            (ly - position.y) as f32,
                            cols,
                            rows,
                        );
                        self.send_camera();
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                } else if self.painting {
                    self.paint_at(position.x, position.y);
                }
            }
            _ => {}
        }
    }
}
