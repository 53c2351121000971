//! Camera-facing quads for every particle and photo panel.
//!
//! Each frame the world is flattened into a few sprite batches, one per blend
//! mode run, which are uploaded as instance buffers and drawn as six-vertex
//! quads. Group transforms are applied on the CPU so a single camera uniform
//! serves every batch.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::config::{BlendMode, CameraOptions};
use crate::orbit::PANEL_HEIGHT;
use crate::world::World;

const SHADER: &str = include_str!("particles.wgsl");
const BORDER_COLOR: [f32; 4] = [1.0, 215.0 / 255.0, 0.0, 1.0];
const BORDER_WIDTH: f32 = 0.5;
const MIN_PANEL_SCALE: f32 = 0.01;

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sprite {
    pub center: [f32; 3],
    /// 1 draws a soft disc, 0 a solid rectangle.
    pub round: f32,
    pub half_size: [f32; 2],
    pub color: [f32; 4],
}

impl Sprite {
    fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32,
            2 => Float32x2,
            3 => Float32x4
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Sprite>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    right: [f32; 4],
    up: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub blend: BlendMode,
    pub sprites: Vec<Sprite>,
}

/// Perspective camera on the +Z axis looking at the origin.
pub fn view_projection(camera: &CameraOptions, aspect: f32) -> Mat4 {
    let proj = Mat4::perspective_rh(
        camera.fov_degrees.to_radians(),
        aspect.max(1e-3),
        camera.near,
        camera.far,
    );
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, camera.distance), Vec3::ZERO, Vec3::Y);
    proj * view
}

/// World units per unit of particle size, matching size-attenuated points
/// whose pixel size is `size * height / (2 * depth)`.
pub fn point_half_extent(camera: &CameraOptions) -> f32 {
    (camera.fov_degrees.to_radians() * 0.5).tan() * 0.5
}

/// Flatten the visible parts of `world` into draw batches, back to front:
/// photo panels, static groups, then the gallery.
pub fn collect_batches(world: &World, point_half: f32) -> Vec<Batch> {
    let mut batches = Vec::with_capacity(5);

    let mut panels = Vec::new();
    for panel in world.orbit().panels() {
        if !panel.visible || panel.scale < MIN_PANEL_SCALE {
            continue;
        }
        let half_h = PANEL_HEIGHT * 0.5 * panel.scale;
        let half_w = half_h * panel.look.aspect;
        let border = BORDER_WIDTH * panel.scale;
        panels.push(Sprite {
            center: panel.position.to_array(),
            round: 0.0,
            half_size: [half_w + border, half_h + border],
            color: BORDER_COLOR,
        });
        let [r, g, b] = panel.look.color;
        panels.push(Sprite {
            center: (panel.position + Vec3::Z * 0.1).to_array(),
            round: 0.0,
            half_size: [half_w, half_h],
            color: [r, g, b, 1.0],
        });
    }
    if !panels.is_empty() {
        batches.push(Batch {
            blend: BlendMode::Normal,
            sprites: panels,
        });
    }

    for group in world.groups() {
        if !group.is_visible() {
            continue;
        }
        let model = Mat4::from_scale_rotation_translation(
            Vec3::splat(group.scale()),
            Quat::from_rotation_y(group.rotation_y()),
            Vec3::ZERO,
        );
        let half_scale = point_half * group.scale();
        let sprites: Vec<Sprite> = group
            .positions()
            .iter()
            .zip(group.sizes())
            .zip(group.colors())
            .filter(|((_, size), _)| **size > 0.0)
            .map(|((pos, size), color)| Sprite {
                center: model.transform_point3(*pos).to_array(),
                round: 1.0,
                half_size: [size * half_scale; 2],
                color: [color[0], color[1], color[2], 1.0],
            })
            .collect();
        if !sprites.is_empty() {
            batches.push(Batch {
                blend: group.blend(),
                sprites,
            });
        }
    }

    let gallery = world.gallery();
    if gallery.is_visible() {
        let sprites: Vec<Sprite> = gallery
            .positions()
            .iter()
            .zip(gallery.sizes())
            .zip(gallery.colors())
            .filter(|((_, size), _)| **size > 0.0)
            .map(|((pos, size), color)| Sprite {
                center: pos.to_array(),
                round: 1.0,
                half_size: [size * point_half; 2],
                color: [color[0], color[1], color[2], 1.0],
            })
            .collect();
        if !sprites.is_empty() {
            batches.push(Batch {
                blend: BlendMode::Additive,
                sprites,
            });
        }
    }

    batches
}

struct GpuBatch {
    buffer: wgpu::Buffer,
    capacity: usize,
    len: u32,
    blend: BlendMode,
}

pub struct SpriteRenderer {
    additive: wgpu::RenderPipeline,
    normal: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    batches: Vec<GpuBatch>,
}

impl SpriteRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite-shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
        });
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite-camera"),
            size: std::mem::size_of::<CameraUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite-camera-layout"),
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
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite-camera"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            additive: create_pipeline(device, &layout, &shader, format, ADDITIVE, "sprite-additive"),
            normal: create_pipeline(
                device,
                &layout,
                &shader,
                format,
                wgpu::BlendState::ALPHA_BLENDING,
                "sprite-normal",
            ),
            camera_buffer,
            bind_group,
            batches: Vec::new(),
        }
    }

    /// Upload the camera and this frame's batches, growing buffers as needed.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        view_proj: Mat4,
        batches: &[Batch],
    ) {
        let uniform = CameraUniform {
            view_proj: view_proj.to_cols_array_2d(),
            right: [1.0, 0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0, 0.0],
        };
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniform));

        self.batches.truncate(batches.len());
        for (idx, batch) in batches.iter().enumerate() {
            let needed = batch.sprites.len().max(1);
            let reuse = self
                .batches
                .get(idx)
                .is_some_and(|gpu| gpu.capacity >= needed);
            if !reuse {
                let capacity = needed.next_power_of_two();
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("sprite-instances"),
                    size: (capacity * std::mem::size_of::<Sprite>()) as wgpu::BufferAddress,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let gpu = GpuBatch {
                    buffer,
                    capacity,
                    len: 0,
                    blend: batch.blend,
                };
                if idx < self.batches.len() {
                    self.batches[idx] = gpu;
                } else {
                    self.batches.push(gpu);
                }
            }
            let gpu = &mut self.batches[idx];
            gpu.blend = batch.blend;
            gpu.len = batch.sprites.len() as u32;
            if !batch.sprites.is_empty() {
                queue.write_buffer(&gpu.buffer, 0, bytemuck::cast_slice(&batch.sprites));
            }
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(0, &self.bind_group, &[]);
        for batch in &self.batches {
            if batch.len == 0 {
                continue;
            }
            let pipeline = match batch.blend {
                BlendMode::Additive => &self.additive,
                BlendMode::Normal => &self.normal,
            };
            let bytes = u64::from(batch.len) * std::mem::size_of::<Sprite>() as u64;
            pass.set_pipeline(pipeline);
            pass.set_vertex_buffer(0, batch.buffer.slice(..bytes));
            pass.draw(0..6, 0..batch.len);
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs"),
            buffers: &[Sprite::layout()],
            compilation_options: Default::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        multiview: None,
        cache: None,
    })
}
