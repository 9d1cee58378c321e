//! Pseudo-instanced particle renderer
//!
//! The particle mesh is replicated into one combined vertex/index buffer
//! (see [`CombinedMesh`]), each copy tagged with its batch-local id. One
//! indexed draw covers `particles_per_mesh` slots; the batch's id offset
//! comes from a dynamic-offset uniform. The vertex shader reads the pool
//! read-only and parks inactive slots outside the clip volume.

use std::num::NonZeroU64;
use std::sync::Arc;

use glam::Vec3;
use ricochet_core::{
    BatchLayout, CameraView, CombinedMesh, CombinedVertex, MeshData, ParticleDevice,
};
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error::Result;
use crate::pool::GpuParticlePool;
use crate::shaders::PARTICLE_RENDER_SHADER;
use crate::uniforms::{BatchUniforms, ViewUniforms};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Uint32,
];

/// Per-camera uniforms and bind group
///
/// A renderer can draw the same pool through several bindings, e.g. the main
/// camera and a mirror camera.
#[derive(Debug)]
pub struct ViewBinding {
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct ParticleBinding {
    generation: u64,
    bind_group: wgpu::BindGroup,
}

/// Draws every slot of a pool with a handful of indexed draws
pub struct PseudoInstancedRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    particle_layout: wgpu::BindGroupLayout,
    view_layout: wgpu::BindGroupLayout,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    layout: BatchLayout,
    capacity: u32,
    batch_bind_group: wgpu::BindGroup,
    /// Distance between batch slots in the batch buffer
    batch_stride: u32,
    particle_binding: Option<ParticleBinding>,
}

impl PseudoInstancedRenderer {
    /// Build the combined mesh for `capacity` slots and the draw pipeline
    ///
    /// `depth_format` enables depth testing against the scene's depth
    /// buffer.
    pub fn new(
        context: &GpuContext,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
        mesh: &MeshData,
        capacity: u32,
    ) -> Result<Self> {
        let device = &context.device;
        let combined = CombinedMesh::build(mesh, capacity)?;
        let layout = combined.layout;

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Combined Vertex Buffer"),
            contents: bytemuck::cast_slice(&combined.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Combined Index Buffer"),
            contents: bytemuck::cast_slice(&combined.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let particle_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Render Storage Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Render View Layout"),
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
        let batch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Render Batch Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<BatchUniforms>() as u64),
                },
                count: None,
            }],
        });

        // One aligned slot per batch, addressed by dynamic offset
        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        let batch_stride = (std::mem::size_of::<BatchUniforms>() as u32).next_multiple_of(alignment);
        let mut batch_data = vec![0u8; (batch_stride * layout.batch_count) as usize];
        for (batch, id_offset) in layout.id_offsets().enumerate() {
            let start = batch * batch_stride as usize;
            let uniforms = BatchUniforms {
                id_offset,
                _pad: [0; 3],
            };
            batch_data[start..start + std::mem::size_of::<BatchUniforms>()]
                .copy_from_slice(bytemuck::bytes_of(&uniforms));
        }
        let batch_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Batch Uniforms"),
            contents: &batch_data,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let batch_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Batch Bind Group"),
            layout: &batch_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &batch_buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<BatchUniforms>() as u64),
                }),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Render Shader"),
            source: wgpu::ShaderSource::Wgsl(PARTICLE_RENDER_SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Render Pipeline Layout"),
            bind_group_layouts: &[&particle_layout, &view_layout, &batch_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<CombinedVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None, // Mirror views flip winding
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        tracing::info!(
            "particle renderer: {} slots as {} batches of {} ({} vertices each)",
            capacity,
            layout.batch_count,
            layout.particles_per_mesh,
            combined.vertices.len()
        );

        Ok(Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            pipeline,
            particle_layout,
            view_layout,
            vertex_buffer,
            index_buffer,
            index_count: combined.indices.len() as u32,
            layout,
            capacity,
            batch_bind_group,
            batch_stride,
            particle_binding: None,
        })
    }

    pub fn layout(&self) -> BatchLayout {
        self.layout
    }

    /// Create uniforms for one more camera
    pub fn create_view_binding(&self, label: &str) -> ViewBinding {
        let uniforms = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<ViewUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        ViewBinding {
            uniforms,
            bind_group,
        }
    }

    pub fn update_view(&self, binding: &ViewBinding, view: &CameraView, light_dir: Vec3) {
        self.queue.write_buffer(
            &binding.uniforms,
            0,
            bytemuck::bytes_of(&ViewUniforms::new(view, light_dir)),
        );
    }

    /// Point the renderer at the pool's current record buffer
    ///
    /// Cheap when the pool has not been re-initialized since the last call.
    pub fn prepare(&mut self, pool: &GpuParticlePool) {
        let Some(particles) = pool.particle_buffer() else {
            self.particle_binding = None;
            return;
        };
        if self
            .particle_binding
            .as_ref()
            .is_some_and(|b| b.generation == pool.generation())
        {
            return;
        }

        if pool.capacity() > self.capacity {
            tracing::warn!(
                "pool holds {} slots but the renderer was built for {}; the rest are not drawn",
                pool.capacity(),
                self.capacity
            );
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Render Storage Bind Group"),
            layout: &self.particle_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: particles.as_entire_binding(),
            }],
        });
        self.particle_binding = Some(ParticleBinding {
            generation: pool.generation(),
            bind_group,
        });
    }

    /// Record every batch into `pass`
    ///
    /// Does nothing until [`prepare`](Self::prepare) has seen an initialized
    /// pool.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, view: &ViewBinding) {
        let Some(particles) = &self.particle_binding else {
            return;
        };

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &particles.bind_group, &[]);
        pass.set_bind_group(1, &view.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        for batch in 0..self.layout.batch_count {
            pass.set_bind_group(2, &self.batch_bind_group, &[batch * self.batch_stride]);
            pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
    }
}

impl std::fmt::Debug for PseudoInstancedRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoInstancedRenderer")
            .field("layout", &self.layout)
            .field("capacity", &self.capacity)
            .field("index_count", &self.index_count)
            .finish()
    }
}
