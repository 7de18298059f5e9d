use wgpu::util::DeviceExt;

use crate::camera::CameraUniform;
use crate::grid::Grid;
use crate::rules::Tribe;

/// Manages the GPU render pipeline that visualizes the grid.
///
/// Each cell is one instance of a small quad: a static per-instance position
/// buffer holds the cell centers (rebuilt only when grid dimensions change)
/// and a streamed per-instance color buffer is refilled from tribe colors
/// every frame. One instanced draw call renders the whole grid.
pub struct Renderer {
    render_pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    position_buffer: wgpu::Buffer,
    color_buffer: wgpu::Buffer,
    cell_count: u32,
    /// Scratch for color uploads, reused across frames.
    color_staging: Vec<f32>,
}

impl Renderer {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        cols: u32,
        rows: u32,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Render Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/render.wgsl").into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Render BGL"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    // Per-instance cell centers (static per ruleset).
                    wgpu::VertexBufferLayout {
                        array_stride: 2 * std::mem::size_of::<f32>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        }],
                    },
                    // Per-instance colors (streamed per frame).
                    wgpu::VertexBufferLayout {
                        array_stride: 3 * std::mem::size_of::<f32>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform"),
            contents: bytemuck::bytes_of(&CameraUniform {
                canvas: [1.0, 1.0],
                grid: [1.0, 1.0],
                offset: [0.0, 0.0],
                scale: 1.0,
                _pad0: 0.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Render BG"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let (position_buffer, color_buffer, cell_count) = build_grid_buffers(device, cols, rows);

        Self {
            render_pipeline,
            camera_buffer,
            bind_group,
            position_buffer,
            color_buffer,
            cell_count,
            color_staging: Vec::new(),
        }
    }

    /// Recreate the per-cell buffers after a ruleset install changed the
    /// grid dimensions. Cell centers never move otherwise.
    pub fn rebuild_grid(&mut self, device: &wgpu::Device, cols: u32, rows: u32) {
        let (position_buffer, color_buffer, cell_count) = build_grid_buffers(device, cols, rows);
        self.position_buffer = position_buffer;
        self.color_buffer = color_buffer;
        self.cell_count = cell_count;
    }

    /// Refill the color buffer from the current grid and tribe palette.
    pub fn upload_colors(&mut self, queue: &wgpu::Queue, grid: &Grid, tribes: &[Tribe]) {
        debug_assert_eq!(grid.len() as u32, self.cell_count);
        self.color_staging.clear();
        self.color_staging.reserve(grid.len() * 3);
        for &cell in &grid.cells {
            let [r, g, b] = tribes[cell as usize].color;
            self.color_staging.push(r as f32 / 255.0);
            self.color_staging.push(g as f32 / 255.0);
            self.color_staging.push(b as f32 / 255.0);
        }
        queue.write_buffer(
            &self.color_buffer,
            0,
            bytemuck::cast_slice(&self.color_staging),
        );
    }

    /// Upload new camera uniform data.
    pub fn update_camera(&self, queue: &wgpu::Queue, uniform: &CameraUniform) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(uniform));
    }

    /// Encode the render pass: clear, then one instanced draw for all cells.
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.02,
                        g: 0.02,
                        b: 0.03,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.render_pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.position_buffer.slice(..));
        pass.set_vertex_buffer(1, self.color_buffer.slice(..));
        pass.draw(0..4, 0..self.cell_count);
    }
}

/// Build the static cell-center buffer and an empty color buffer for a
/// `cols` x `rows` grid, row-major to match the grid layout.
fn build_grid_buffers(
    device: &wgpu::Device,
    cols: u32,
    rows: u32,
) -> (wgpu::Buffer, wgpu::Buffer, u32) {
    let cell_count = cols * rows;
    let mut positions = Vec::with_capacity(cell_count as usize * 2);
    for y in 0..rows {
        for x in 0..cols {
            positions.push(x as f32 + 0.5);
            positions.push(y as f32 + 0.5);
        }
    }

    let position_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Cell Positions"),
        contents: bytemuck::cast_slice(&positions),
        usage: wgpu::BufferUsages::VERTEX,
    });

    let color_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Cell Colors"),
        size: cell_count as u64 * 3 * std::mem::size_of::<f32>() as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    (position_buffer, color_buffer, cell_count)
}
