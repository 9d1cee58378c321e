//! Scene rendering into the swapchain and the collision G-buffer
//!
//! The scene pass writes lit color plus four attribute targets (albedo,
//! specular, encoded normal, emission) and depth. Those targets are what
//! the particle system captures for the next frame's collisions.

use glam::Vec3;
use ricochet_core::{CameraView, SurfaceExtent, ATTRIBUTE_COUNT};
use ricochet_gpu::{CaptureSource, ViewUniforms, ATTRIBUTE_FORMAT, DEPTH_FORMAT, SOURCE_USAGE};
use wgpu::util::DeviceExt;

use crate::scene::{Scene, SceneVertex};

const SCENE_SHADER: &str = r#"
struct ViewUniforms {
    view_proj: mat4x4<f32>,
    light_dir: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: ViewUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) color: vec3<f32>,
}

struct SceneOutput {
    @location(0) color: vec4<f32>,
    @location(1) albedo: vec4<f32>,
    @location(2) specular: vec4<f32>,
    @location(3) normal: vec4<f32>,
    @location(4) emission: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = camera.view_proj * vec4<f32>(in.position, 1.0);
    out.normal = in.normal;
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> SceneOutput {
    let n = normalize(in.normal);
    let diffuse = max(dot(n, normalize(-camera.light_dir.xyz)), 0.0);

    var out: SceneOutput;
    out.color = vec4<f32>(in.color * (0.25 + 0.75 * diffuse), 1.0);
    out.albedo = vec4<f32>(in.color, 1.0);
    out.specular = vec4<f32>(0.04, 0.04, 0.04, 0.5);
    out.normal = vec4<f32>(n * 0.5 + 0.5, 1.0);
    out.emission = vec4<f32>(0.0, 0.0, 0.0, 1.0);
    return out;
}
"#;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x3,
];

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.06,
    b: 0.08,
    a: 1.0,
};

/// Depth and attribute targets at the window size
pub struct SceneTargets {
    pub extent: SurfaceExtent,
    pub depth: wgpu::TextureView,
    pub attributes: [wgpu::TextureView; ATTRIBUTE_COUNT],
    /// Depth for the mirror inset, which must not test against the scene
    pub mirror_depth: wgpu::TextureView,
}

impl SceneTargets {
    pub fn new(device: &wgpu::Device, extent: SurfaceExtent) -> Self {
        let create = |format: wgpu::TextureFormat, usage: wgpu::TextureUsages, label: &str| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: extent.width,
                        height: extent.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };

        Self {
            extent,
            depth: create(DEPTH_FORMAT, SOURCE_USAGE, "Scene Depth"),
            attributes: [
                create(ATTRIBUTE_FORMAT, SOURCE_USAGE, "Scene Albedo"),
                create(ATTRIBUTE_FORMAT, SOURCE_USAGE, "Scene Specular"),
                create(ATTRIBUTE_FORMAT, SOURCE_USAGE, "Scene Normal"),
                create(ATTRIBUTE_FORMAT, SOURCE_USAGE, "Scene Emission"),
            ],
            mirror_depth: create(
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
                "Mirror Depth",
            ),
        }
    }

    pub fn source(&self) -> CaptureSource<'_> {
        CaptureSource {
            depth: &self.depth,
            attributes: [
                &self.attributes[0],
                &self.attributes[1],
                &self.attributes[2],
                &self.attributes[3],
            ],
            extent: self.extent,
        }
    }
}

/// Pipeline and geometry of the demo scene
pub struct ScenePass {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ScenePass {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat, scene: &Scene) -> Self {
        let (vertices, indices) = scene.mesh();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene View Uniforms"),
            size: std::mem::size_of::<ViewUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
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
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let attribute_target = Some(wgpu::ColorTargetState {
            format: ATTRIBUTE_FORMAT,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SceneVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[
                    Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    attribute_target.clone(),
                    attribute_target.clone(),
                    attribute_target.clone(),
                    attribute_target,
                ],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            uniforms,
            bind_group,
        }
    }

    /// Clear every target and draw the scene from `view`
    pub fn draw(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        color: &wgpu::TextureView,
        targets: &SceneTargets,
        view: &CameraView,
        light_dir: Vec3,
    ) {
        queue.write_buffer(
            &self.uniforms,
            0,
            bytemuck::bytes_of(&ViewUniforms::new(view, light_dir)),
        );

        let color_attachments = [
            clear_attachment(color, CLEAR_COLOR),
            clear_attachment(&targets.attributes[0], wgpu::Color::TRANSPARENT),
            clear_attachment(&targets.attributes[1], wgpu::Color::TRANSPARENT),
            clear_attachment(&targets.attributes[2], wgpu::Color::TRANSPARENT),
            clear_attachment(&targets.attributes[3], wgpu::Color::TRANSPARENT),
        ];

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

fn clear_attachment(
    view: &wgpu::TextureView,
    color: wgpu::Color,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(color),
            store: wgpu::StoreOp::Store,
        },
    })
}
