use std::collections::HashMap;
use std::mem;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt as _;

use super::backend::{BufferView, DrawItem, FrameDraw, RenderBackend, Topology};
use super::utils::{self, align_to_256, align_to_copy};
use super::wgpu_context::WgpuContext;
use crate::error::RendererError;
use crate::resources::BufferId;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SHADER: &str = include_str!("shaders/scene.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DrawUniform {
    model: [[f32; 4]; 4],
    tint: [f32; 4],
}

const DRAW_STRIDE: usize = align_to_256(mem::size_of::<DrawUniform>());

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    topology: Topology,
    transparent: bool,
    depth_test: bool,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    version: u64,
    len: u64,
}

struct DepthTexture {
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        }
    }
}

/// Draws frames through a wgpu surface.
pub struct WgpuBackend<'surface> {
    context: WgpuContext<'surface>,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    draw_layout: wgpu::BindGroupLayout,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
    draw_capacity: usize,
    buffers: HashMap<BufferId, GpuBuffer>,
    depth: DepthTexture,
}

fn uniform_layout_entry(
    dynamic: bool,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: wgpu::BufferSize::new(mem::size_of::<DrawUniform>() as u64)
                .filter(|_| dynamic),
        },
        count: None,
    }
}

fn create_draw_uniforms(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Draw Uniform Buffer"),
        size: (capacity * DRAW_STRIDE) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Draw Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(mem::size_of::<DrawUniform>() as u64),
            }),
        }],
    });
    (buffer, bind_group)
}

impl<'surface> WgpuBackend<'surface> {
    pub fn new(context: WgpuContext<'surface>) -> Result<Self, RendererError> {
        let device = &context.device;
        let shader = utils::create_shader_module(device, "scene", SHADER)?;

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[uniform_layout_entry(false, wgpu::ShaderStages::VERTEX)],
        });
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Bind Group Layout"),
            entries: &[uniform_layout_entry(true, wgpu::ShaderStages::VERTEX)],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &draw_layout],
            push_constant_ranges: &[],
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("View Projection Buffer"),
            contents: bytemuck::cast_slice(&glam::Mat4::IDENTITY.to_cols_array_2d()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let draw_capacity = 64;
        let (draw_buffer, draw_bind_group) =
            create_draw_uniforms(device, &draw_layout, draw_capacity);
        let depth = DepthTexture::new(device, &context.surface_config);

        Ok(Self {
            context,
            shader,
            pipeline_layout,
            pipelines: HashMap::new(),
            camera_buffer,
            camera_bind_group,
            draw_layout,
            draw_buffer,
            draw_bind_group,
            draw_capacity,
            buffers: HashMap::new(),
            depth,
        })
    }

    pub fn context(&self) -> &WgpuContext<'surface> {
        &self.context
    }

    fn build_pipeline(&self, key: PipelineKey) -> wgpu::RenderPipeline {
        let vertex_buffer_layouts = &[
            wgpu::VertexBufferLayout {
                array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                }],
            },
            wgpu::VertexBufferLayout {
                array_stride: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                }],
            },
        ];
        let topology = match key.topology {
            Topology::Points => wgpu::PrimitiveTopology::PointList,
            Topology::Lines => wgpu::PrimitiveTopology::LineList,
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        };
        let blend = if key.transparent {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        };
        self.context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Scene Pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: "vs_main",
                    buffers: vertex_buffer_layouts,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.context.surface_config.format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: !key.transparent && key.depth_test,
                    depth_compare: if key.depth_test {
                        wgpu::CompareFunction::Less
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
    }

    /// Creates the buffer when missing or too small, otherwise writes in place.
    fn upload(&mut self, view: &BufferView<'_>, usage: wgpu::BufferUsages) {
        let len = view.bytes.len() as u64;
        let existing = self
            .buffers
            .get(&view.id)
            .map(|gpu| (gpu.version == view.version && gpu.len == len, gpu.capacity >= len));
        match existing {
            Some((true, _)) => {}
            Some((false, true)) => {
                if let Some(gpu) = self.buffers.get_mut(&view.id) {
                    if len > 0 {
                        self.context.queue.write_buffer(&gpu.buffer, 0, view.bytes);
                    }
                    gpu.version = view.version;
                    gpu.len = len;
                }
            }
            _ => {
                let capacity = align_to_copy(len);
                let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Geometry Buffer"),
                    size: capacity,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                if len > 0 {
                    self.context.queue.write_buffer(&buffer, 0, view.bytes);
                }
                self.buffers.insert(
                    view.id,
                    GpuBuffer {
                        buffer,
                        capacity,
                        version: view.version,
                        len,
                    },
                );
            }
        }
    }

    fn prepare(&mut self, frame: &FrameDraw<'_>) {
        for item in &frame.items {
            self.upload(&item.positions, wgpu::BufferUsages::VERTEX);
            self.upload(&item.colors, wgpu::BufferUsages::VERTEX);
            if let Some(indices) = &item.indices {
                self.upload(indices, wgpu::BufferUsages::INDEX);
            }
            let key = pipeline_key(item);
            if !self.pipelines.contains_key(&key) {
                let pipeline = self.build_pipeline(key);
                self.pipelines.insert(key, pipeline);
            }
        }

        if frame.items.len() > self.draw_capacity {
            self.draw_capacity = frame.items.len().next_power_of_two();
            let (buffer, bind_group) =
                create_draw_uniforms(&self.context.device, &self.draw_layout, self.draw_capacity);
            self.draw_buffer = buffer;
            self.draw_bind_group = bind_group;
        }
        let mut uniforms = vec![0u8; frame.items.len() * DRAW_STRIDE];
        for (i, item) in frame.items.iter().enumerate() {
            let uniform = DrawUniform {
                model: item.model.to_cols_array_2d(),
                tint: item.tint,
            };
            let start = i * DRAW_STRIDE;
            uniforms[start..start + mem::size_of::<DrawUniform>()]
                .copy_from_slice(bytemuck::bytes_of(&uniform));
        }
        if !uniforms.is_empty() {
            self.context.queue.write_buffer(&self.draw_buffer, 0, &uniforms);
        }
        self.context.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&frame.view_proj.to_cols_array_2d()),
        );
    }
}

fn pipeline_key(item: &DrawItem<'_>) -> PipelineKey {
    PipelineKey {
        topology: item.topology,
        transparent: item.material.transparent,
        depth_test: item.material.depth_test,
    }
}

impl RenderBackend for WgpuBackend<'_> {
    fn render(&mut self, frame: &FrameDraw<'_>) -> Result<(), RendererError> {
        self.prepare(frame);

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                if matches!(e, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) {
                    self.context.reconfigure();
                }
                return Err(e.into());
            }
        };
        let output_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let [r, g, b, a] = frame.background;
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

            for (i, item) in frame.items.iter().enumerate() {
                let count = item.element_count();
                let (Some(pipeline), Some(positions), Some(colors)) = (
                    self.pipelines.get(&pipeline_key(item)),
                    self.buffers.get(&item.positions.id),
                    self.buffers.get(&item.colors.id),
                ) else {
                    continue;
                };
                if count == 0 || positions.len == 0 || colors.len == 0 {
                    continue;
                }
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &self.draw_bind_group, &[(i * DRAW_STRIDE) as u32]);
                render_pass.set_vertex_buffer(0, positions.buffer.slice(..positions.len));
                render_pass.set_vertex_buffer(1, colors.buffer.slice(..colors.len));
                match item.indices.as_ref().and_then(|view| self.buffers.get(&view.id)) {
                    Some(indices) => {
                        render_pass.set_index_buffer(
                            indices.buffer.slice(..indices.len),
                            wgpu::IndexFormat::Uint32,
                        );
                        render_pass.draw_indexed(0..count, 0, 0..1);
                    }
                    None => render_pass.draw(0..count, 0..1),
                }
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        output.present();
        Ok(())
    }

    fn release_buffers(&mut self, ids: &[BufferId]) {
        for id in ids {
            if let Some(gpu) = self.buffers.remove(id) {
                gpu.buffer.destroy();
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.context.resize(width, height) {
            self.depth = DepthTexture::new(&self.context.device, &self.context.surface_config);
        }
    }
}
