//! Rendering system with wgpu pipeline and shader management.
//!
//! Two passes share one render pass: a fullscreen backdrop (sky, sun,
//! mountains, grid, scanlines) and instanced cubes for the bar rows.
//! The renderer only reads [`SceneState`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::error::RenderError;
use crate::params::SceneMapping;
use crate::scene::{hsl_to_rgb, SceneState};

/// Distance of the back row behind the front row (meters)
const BACK_ROW_DEPTH_M: f32 = 0.6;

/// Bar colour saturation and lightness
const BAR_SATURATION: f32 = 0.9;
const BAR_LIGHTNESS: f32 = 0.55;

/// Uniform buffer for the backdrop shader. Mirrors `Backdrop` in backdrop.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BackdropUniforms {
    pub time: f32,
    pub sun_scale: f32,
    pub base_hue: f32,
    pub aspect: f32,
    pub grid_scale: f32,
    pub grid_scroll: f32,
    pub grid_roll: f32,
    pub mountain_time: f32,
    pub audio_level: f32,
    pub peak_level: f32,
    pub bass_pulse: f32,
    pub scan_intensity: f32,
    pub scan_distortion: f32,
    pub glitch: f32,
    pub beat_level: f32,
    pub _padding: f32,
}

impl BackdropUniforms {
    pub fn from_scene(scene: &SceneState, aspect: f32) -> Self {
        Self {
            time: scene.elapsed,
            sun_scale: scene.sun_scale,
            base_hue: scene.base_hue,
            aspect,
            grid_scale: scene.grid.scale_xz,
            grid_scroll: scene.grid.scroll,
            grid_roll: scene.grid.roll,
            mountain_time: scene.mountains.time,
            audio_level: scene.mountains.audio_level,
            peak_level: scene.mountains.peak_level,
            bass_pulse: scene.mountains.bass_pulse,
            scan_intensity: scene.scanlines.intensity,
            scan_distortion: scene.scanlines.distortion,
            glitch: scene.scanlines.glitch,
            beat_level: scene.scanlines.beat_level,
            _padding: 0.0,
        }
    }
}

/// Uniform buffer for the bar shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct BarUniforms {
    pub view_proj: [[f32; 4]; 4],
}

/// Cube vertex (position + normal)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BarVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Per-bar instance data: model matrix and colour (alpha carries emissive)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BarInstance {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

/// Unit cube standing on y = 0: x and z in [-0.5, 0.5], y in [0, 1].
///
/// Four vertices per face so each face has a flat normal; counter-clockwise
/// winding seen from outside.
pub fn cube_mesh() -> (Vec<BarVertex>, Vec<u16>) {
    // (normal, u, v) with u x v = normal
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    let center = Vec3::new(0.0, 0.5, 0.0);

    for (normal, u, v) in faces {
        let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
        let face_center = center + n * 0.5;
        let base = vertices.len() as u16;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            vertices.push(BarVertex {
                position: (face_center + u * su + v * sv).to_array(),
                normal,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Build instances for both rows: back row first so the front row draws
/// over it.
pub fn bar_instances(scene: &SceneState, mapping: &SceneMapping, out: &mut Vec<BarInstance>) {
    out.clear();
    let group = Mat4::from_scale(Vec3::splat(scene.group.scale))
        * Mat4::from_rotation_y(scene.group.rotation_y)
        * Mat4::from_rotation_x(scene.group.rotation_x);
    let width = mapping.bar_width;

    for bar in &scene.bars {
        let model = group
            * Mat4::from_translation(Vec3::new(bar.x, 0.0, -BACK_ROW_DEPTH_M))
            * Mat4::from_scale(Vec3::new(width, bar.back_height, width));
        let [r, g, b] = hsl_to_rgb(bar.back_hue, BAR_SATURATION, BAR_LIGHTNESS);
        out.push(BarInstance {
            model: model.to_cols_array_2d(),
            color: [r, g, b, bar.back_emissive],
        });
    }

    for bar in &scene.bars {
        let model = group
            * Mat4::from_translation(Vec3::new(bar.x, 0.0, bar.z_offset))
            * Mat4::from_rotation_z(bar.roll)
            * Mat4::from_scale(Vec3::new(width, bar.front_height, width));
        let [r, g, b] = hsl_to_rgb(bar.front_hue, BAR_SATURATION, BAR_LIGHTNESS);
        out.push(BarInstance {
            model: model.to_cols_array_2d(),
            color: [r, g, b, bar.front_emissive],
        });
    }
}

const BAR_VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

const BAR_INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    2 => Float32x4,
    3 => Float32x4,
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32x4
];

/// Rendering system managing wgpu device, pipelines, and buffers
pub struct RenderSystem {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    backdrop_pipeline: wgpu::RenderPipeline,
    bar_pipeline: wgpu::RenderPipeline,
    backdrop_uniform_buffer: wgpu::Buffer,
    backdrop_bind_group: wgpu::BindGroup,
    bar_uniform_buffer: wgpu::Buffer,
    bar_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    instance_count: u32,
    instances: Vec<BarInstance>,
}

/// Bind group layout with a single uniform buffer at binding 0
fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

impl RenderSystem {
    /// Create new rendering system with room for `bar_count` bars per row
    pub async fn new(
        window: Arc<winit::window::Window>,
        bar_count: usize,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();

        // Create wgpu instance
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Create surface (window must have 'static lifetime via Arc)
        let surface = instance.create_surface(window)?;

        // Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        // Request device
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(RenderError::NoSurfaceFormat)?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        // Load shaders
        let backdrop_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Backdrop Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("backdrop.wgsl").into()),
        });

        let bar_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bar Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("bars.wgsl").into()),
        });

        // Backdrop uniforms and bind group
        let backdrop_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Backdrop Uniform Buffer"),
            contents: bytemuck::cast_slice(&[BackdropUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let backdrop_bind_group_layout = uniform_layout(&device, "Backdrop Bind Group Layout");
        let backdrop_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Backdrop Bind Group"),
            layout: &backdrop_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: backdrop_uniform_buffer.as_entire_binding(),
            }],
        });

        let backdrop_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Backdrop Pipeline Layout"),
                bind_group_layouts: &[&backdrop_bind_group_layout],
                push_constant_ranges: &[],
            });

        let backdrop_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Backdrop Pipeline"),
            layout: Some(&backdrop_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &backdrop_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &backdrop_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Bar geometry and instances
        let (vertices, indices) = cube_mesh();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bar Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bar Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Two rows
        let instance_capacity = bar_count.max(1) * 2;
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bar Instance Buffer"),
            size: (instance_capacity * std::mem::size_of::<BarInstance>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bar_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bar Uniform Buffer"),
            contents: bytemuck::cast_slice(&[BarUniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bar_bind_group_layout = uniform_layout(&device, "Bar Bind Group Layout");
        let bar_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bar Bind Group"),
            layout: &bar_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: bar_uniform_buffer.as_entire_binding(),
            }],
        });

        let bar_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bar Pipeline Layout"),
            bind_group_layouts: &[&bar_bind_group_layout],
            push_constant_ranges: &[],
        });

        let bar_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Bar Render Pipeline"),
            layout: Some(&bar_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &bar_shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<BarVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &BAR_VERTEX_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<BarInstance>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &BAR_INSTANCE_ATTRIBUTES,
                    },
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &bar_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        debug!(
            "Renderer ready: {:?} {}x{}, {} bar instances",
            surface_config.format, surface_config.width, surface_config.height, instance_capacity
        );

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            backdrop_pipeline,
            bar_pipeline,
            backdrop_uniform_buffer,
            backdrop_bind_group,
            bar_uniform_buffer,
            bar_bind_group,
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            instance_buffer,
            instance_capacity,
            instance_count: 0,
            instances: Vec::with_capacity(instance_capacity),
        })
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.surface_config.width as f32 / self.surface_config.height.max(1) as f32
    }

    /// Reconfigure the surface after a window resize
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Upload this frame's scene
    pub fn apply_scene(&mut self, scene: &SceneState, mapping: &SceneMapping, view_proj: Mat4) {
        let backdrop = BackdropUniforms::from_scene(scene, self.aspect_ratio());
        self.queue.write_buffer(
            &self.backdrop_uniform_buffer,
            0,
            bytemuck::cast_slice(&[backdrop]),
        );

        let bar_uniforms = BarUniforms {
            view_proj: view_proj.to_cols_array_2d(),
        };
        self.queue.write_buffer(
            &self.bar_uniform_buffer,
            0,
            bytemuck::cast_slice(&[bar_uniforms]),
        );

        bar_instances(scene, mapping, &mut self.instances);
        self.instances.truncate(self.instance_capacity);
        self.queue.write_buffer(
            &self.instance_buffer,
            0,
            bytemuck::cast_slice(&self.instances),
        );
        self.instance_count = self.instances.len() as u32;
    }

    /// Render a frame
    pub fn render(&self) -> Result<(), wgpu::SurfaceError> {
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
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Render backdrop first
            render_pass.set_pipeline(&self.backdrop_pipeline);
            render_pass.set_bind_group(0, &self.backdrop_bind_group, &[]);
            render_pass.draw(0..3, 0..1); // Fullscreen triangle

            // Render bars
            if self.instance_count > 0 {
                render_pass.set_pipeline(&self.bar_pipeline);
                render_pass.set_bind_group(0, &self.bar_bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
                render_pass
                    .set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
