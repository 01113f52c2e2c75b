use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use cgmath::{Deg, Matrix4, Point3, Quaternion, Vector3};
use log::{debug, error, info, warn};
use wgpu::util::DeviceExt;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use tumble_simulator::{EngineError, Reset, SimulationConfig, SimulationEngine, SimulationSnapshot};

/// Factor applied to the cube size per arrow key press.
const SIZE_STEP: f64 = 1.1;
/// Seed angular velocity change per key press, rad/s.
const SEED_STEP: f64 = 0.5;
/// Factor applied to the density per `-`/`=` press.
const DENSITY_STEP: f64 = 1.25;

#[rustfmt::skip]
const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    view_proj_model: [[f32; 4]; 4],
}

struct Face {
    normal: [f32; 3],
    // u × v = normal, so corners listed -u-v, +u-v, +u+v, -u+v wind CCW from outside.
    u: [f32; 3],
    v: [f32; 3],
    color: [f32; 3],
}

#[rustfmt::skip]
const FACES: [Face; 6] = [
    Face { normal: [1.0, 0.0, 0.0], u: [0.0, 1.0, 0.0], v: [0.0, 0.0, 1.0], color: [0.85, 0.25, 0.2] },
    Face { normal: [-1.0, 0.0, 0.0], u: [0.0, 0.0, 1.0], v: [0.0, 1.0, 0.0], color: [0.45, 0.12, 0.1] },
    Face { normal: [0.0, 1.0, 0.0], u: [0.0, 0.0, 1.0], v: [1.0, 0.0, 0.0], color: [0.25, 0.75, 0.3] },
    Face { normal: [0.0, -1.0, 0.0], u: [1.0, 0.0, 0.0], v: [0.0, 0.0, 1.0], color: [0.12, 0.4, 0.15] },
    Face { normal: [0.0, 0.0, 1.0], u: [1.0, 0.0, 0.0], v: [0.0, 1.0, 0.0], color: [0.25, 0.4, 0.9] },
    Face { normal: [0.0, 0.0, -1.0], u: [0.0, 1.0, 0.0], v: [1.0, 0.0, 0.0], color: [0.12, 0.2, 0.5] },
];

/// Unit cube centred on the origin, one flat colour per face.
fn cube_mesh() -> (Vec<Vertex>, Vec<u16>) {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (i, face) in FACES.iter().enumerate() {
        let base = (i * 4) as u16;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position =
                std::array::from_fn(|k| 0.5 * (face.normal[k] + su * face.u[k] + sv * face.v[k]));
            vertices.push(Vertex {
                position,
                color: face.color,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

pub struct WindowOptions {
    pub width: u32,
    pub height: u32,
    pub camera_distance: f32,
}

struct Camera {
    distance: f32,
}

impl Camera {
    fn view_projection(&self, aspect: f32) -> Matrix4<f32> {
        let view = Matrix4::look_at_rh(
            Point3::new(0.0, 0.0, self.distance),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        );
        let projection = cgmath::perspective(Deg(45.0), aspect, 0.1, self.distance * 10.0);
        OPENGL_TO_WGPU_MATRIX * projection * view
    }
}

/// Poses the unit cube: scale to the body's edges, then rotate body to world.
fn model_matrix(snapshot: &SimulationSnapshot) -> Matrix4<f32> {
    let q = snapshot.orientation;
    let rotation = Quaternion::new(q.s as f32, q.v.x as f32, q.v.y as f32, q.v.z as f32);
    let edges = snapshot.edges;
    Matrix4::from(rotation)
        * Matrix4::from_nonuniform_scale(edges.x as f32, edges.y as f32, edges.z as f32)
}

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    render_pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

impl Gpu {
    fn new(window: Arc<Window>) -> anyhow::Result<Gpu> {
        let wgpu_instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            dx12_shader_compiler: wgpu::Dx12Compiler::Fxc,
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        for adapter in wgpu_instance.enumerate_adapters(wgpu::Backends::PRIMARY) {
            debug!("available GPU: {:?}", adapter.get_info());
        }

        let size = window.inner_size();
        let surface = wgpu_instance
            .create_surface(window)
            .context("failed to create a surface for the window")?;

        let adapter =
            pollster::block_on(wgpu_instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            }))
            .context("no GPU adapter can present to this window")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Tumble device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .context("failed to open the GPU device")?;

        info!("selected GPU: {:?}", adapter.get_info());

        let surface_capabilities = surface.get_capabilities(&adapter);
        let surface_format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_capabilities
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform buffer"),
            contents: bytemuck::cast_slice(&[Uniforms {
                view_proj_model: Matrix4::<f32>::from_scale(1.0).into(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform bind group layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform bind group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&uniform_bind_group_layout],
                push_constant_ranges: &[],
            });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            // The box is convex, so back-face culling alone resolves visibility.
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let (vertices, indices) = cube_mesh();

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Gpu {
            surface,
            device,
            queue,
            config,
            render_pipeline,
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
            uniform_buffer,
            uniform_bind_group,
        })
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn render(&self, view_proj_model: Matrix4<f32>) -> Result<(), wgpu::SurfaceError> {
        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::cast_slice(&[Uniforms {
                view_proj_model: view_proj_model.into(),
            }]),
        );

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.08,
                            g: 0.08,
                            b: 0.1,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..self.num_indices, 0, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

/// Counts frames and reports the rate about once a second.
struct FrameCounter {
    since: Instant,
    frames: u32,
}

impl FrameCounter {
    fn tick(&mut self) -> Option<f64> {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return None;
        }
        let fps = f64::from(self.frames) / elapsed;
        self.since = Instant::now();
        self.frames = 0;
        Some(fps)
    }
}

struct WGPUApp {
    engine: Arc<SimulationEngine>,
    options: WindowOptions,
    camera: Camera,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    frames: FrameCounter,
}

impl ApplicationHandler for WGPUApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Tumble")
            .with_inner_size(LogicalSize::new(self.options.width, self.options.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        match Gpu::new(Arc::clone(&window)) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(err) => {
                error!("failed to initialise rendering: {err:#}");
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("window closed; stopping");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                debug!("window resized to {new_size:?}");
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(new_size);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Err(err) = self.input(&logical_key) {
                    warn!("ignored input: {err}");
                }
            }
            WindowEvent::RedrawRequested => {
                let snapshot = self.engine.snapshot();
                self.update(&snapshot);

                let Some(gpu) = self.gpu.as_mut() else {
                    return;
                };
                let aspect = gpu.config.width as f32 / gpu.config.height as f32;
                let view_proj_model =
                    self.camera.view_projection(aspect) * model_matrix(&snapshot);
                match gpu.render(view_proj_model) {
                    Ok(_) => {}
                    // Reconfigure the surface if lost
                    Err(wgpu::SurfaceError::Lost) => {
                        let size = PhysicalSize::new(gpu.config.width, gpu.config.height);
                        gpu.resize(size);
                    }
                    // The system is out of memory, we should probably quit
                    Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                    // All other errors (Outdated, Timeout) should be resolved by the next frame
                    Err(e) => warn!("{e:?}"),
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

impl WGPUApp {
    fn new(engine: Arc<SimulationEngine>, options: WindowOptions) -> WGPUApp {
        WGPUApp {
            engine,
            camera: Camera {
                distance: options.camera_distance,
            },
            options,
            window: None,
            gpu: None,
            frames: FrameCounter {
                since: Instant::now(),
                frames: 0,
            },
        }
    }

    /// Keyboard controls. Every change goes through the engine's
    /// configuration entry points.
    fn input(&self, key: &Key) -> Result<(), EngineError> {
        match key.as_ref() {
            Key::Named(NamedKey::Space) => {
                self.engine.set_paused(!self.engine.is_paused());
                Ok(())
            }
            Key::Character("r" | "R") => self.engine.reset(),
            key => match edit_config(self.engine.config(), key) {
                Some(config) => self.apply(config),
                None => Ok(()),
            },
        }
    }

    /// Shape and seed edits restart the tumble from the new seed.
    fn apply(&self, config: SimulationConfig) -> Result<(), EngineError> {
        self.engine.reconfigure(config, Reset::Seed)?;
        info!(
            "size {:.3}, density {:.3}, seed ω = ({:.2}, {:.2}) rad/s",
            config.cube_size,
            config.cube_density,
            config.seed_angular_velocity_x,
            config.seed_angular_velocity_y
        );
        Ok(())
    }

    fn update(&mut self, snapshot: &SimulationSnapshot) {
        let Some(fps) = self.frames.tick() else {
            return;
        };
        let Some(window) = self.window.as_ref() else {
            return;
        };

        let w = snapshot.angular_velocity;
        let mut title = format!(
            "Tumble [{fps:.0} FPS]  t = {:.1} s  E = {:.3}  ω = ({:.2}, {:.2}, {:.2})",
            snapshot.time, snapshot.kinetic_energy, w.x, w.y, w.z
        );
        if snapshot.paused {
            title.push_str("  (paused)");
        }
        if snapshot.is_faulted() {
            title.push_str("  (unstable, press R)");
        }
        window.set_title(&title);
    }
}

/// The shape or seed change bound to `key`, if any.
fn edit_config(config: SimulationConfig, key: Key<&str>) -> Option<SimulationConfig> {
    let edited = match key {
        Key::Named(NamedKey::ArrowUp) => SimulationConfig {
            cube_size: config.cube_size * SIZE_STEP,
            ..config
        },
        Key::Named(NamedKey::ArrowDown) => SimulationConfig {
            cube_size: config.cube_size / SIZE_STEP,
            ..config
        },
        Key::Character("=" | "+") => SimulationConfig {
            cube_density: config.cube_density * DENSITY_STEP,
            ..config
        },
        Key::Character("-") => SimulationConfig {
            cube_density: config.cube_density / DENSITY_STEP,
            ..config
        },
        Key::Named(NamedKey::ArrowRight) => SimulationConfig {
            seed_angular_velocity_x: config.seed_angular_velocity_x + SEED_STEP,
            ..config
        },
        Key::Named(NamedKey::ArrowLeft) => SimulationConfig {
            seed_angular_velocity_x: config.seed_angular_velocity_x - SEED_STEP,
            ..config
        },
        Key::Character("]") => SimulationConfig {
            seed_angular_velocity_y: config.seed_angular_velocity_y + SEED_STEP,
            ..config
        },
        Key::Character("[") => SimulationConfig {
            seed_angular_velocity_y: config.seed_angular_velocity_y - SEED_STEP,
            ..config
        },
        _ => return None,
    };
    Some(edited)
}

/// Opens the window and draws the engine's latest snapshot every frame
/// until the window is closed.
pub fn run_wgpu_window(engine: Arc<SimulationEngine>, options: WindowOptions) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("failed to create the event loop")?;

    // ControlFlow::Poll continuously runs the event loop, even if the OS hasn't
    // dispatched any events. This is ideal for games and similar applications.
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = WGPUApp::new(engine, options);

    event_loop
        .run_app(&mut app)
        .context("event loop terminated with an error")
}
