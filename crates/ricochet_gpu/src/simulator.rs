//! GPU particle simulator
//!
//! Records the Update kernel into the frame's encoder. When no capture
//! exists for the current camera extent, 1x1 placeholder textures are bound
//! and the collision step is switched off for the frame.

use std::sync::Arc;

use glam::Vec3;
use ricochet_core::{dispatch_groups, CameraView, ParticleConfig, ParticleDevice};

use crate::context::GpuContext;
use crate::gbuffer::{CollisionSnapshot, ATTRIBUTE_FORMAT, DEPTH_FORMAT};
use crate::pool::GpuParticlePool;
use crate::shaders::{compute_shader, UPDATE_KERNEL};
use crate::uniforms::UpdateUniforms;

/// Runs the Update kernel over every slot of a [`GpuParticlePool`]
pub struct GpuParticleSimulator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    group_size: u32,
    pipeline: wgpu::ComputePipeline,
    frame_layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    placeholder_depth: wgpu::TextureView,
    placeholder_normal: wgpu::TextureView,
    gravity: Vec3,
    damping: f32,
    depth_epsilon: f32,
}

impl GpuParticleSimulator {
    pub fn new(context: &GpuContext, pool: &GpuParticlePool, config: &ParticleConfig) -> Self {
        let device = &context.device;
        let group_size = pool.group_size();

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Update Bind Group Layout"),
            entries: &[
                // Update uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Scene depth
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Scene normals
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Update Shader"),
            source: wgpu::ShaderSource::Wgsl(compute_shader(UPDATE_KERNEL, group_size).into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Update Pipeline Layout"),
            bind_group_layouts: &[pool.storage_layout(), &frame_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Particle Update Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("update"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Update Uniforms"),
            size: std::mem::size_of::<UpdateUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let placeholder_depth = placeholder_view(device, DEPTH_FORMAT, "Placeholder Depth");
        let placeholder_normal = placeholder_view(device, ATTRIBUTE_FORMAT, "Placeholder Normal");

        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            group_size,
            pipeline,
            frame_layout,
            uniforms,
            placeholder_depth,
            placeholder_normal,
            gravity: config.gravity_vector(),
            damping: config.damping,
            depth_epsilon: config.depth_epsilon,
        }
    }

    /// Record one Update dispatch over all slots
    ///
    /// `snapshot` is used only if it was captured at `view.extent`.
    pub fn update(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pool: &GpuParticlePool,
        delta_time: f32,
        view: &CameraView,
        snapshot: Option<CollisionSnapshot<'_>>,
    ) {
        let Some(storage) = pool.storage_bind_group() else {
            return;
        };
        let capacity = pool.capacity();

        let snapshot = snapshot.filter(|s| s.extent == view.extent && !s.extent.is_empty());
        let (depth, normal, extent, collision_enabled) = match &snapshot {
            Some(s) => (s.depth, s.normal, [s.extent.width, s.extent.height], 1),
            None => (&self.placeholder_depth, &self.placeholder_normal, [1, 1], 0),
        };

        let uniforms = UpdateUniforms {
            view_proj: view.view_proj.to_cols_array_2d(),
            gravity: self.gravity.into(),
            delta_time,
            extent,
            capacity,
            collision_enabled,
            damping: self.damping,
            depth_epsilon: self.depth_epsilon,
            _pad: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let frame_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Update Bind Group"),
            layout: &self.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(normal),
                },
            ],
        });

        let groups = dispatch_groups(capacity, self.group_size);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Particle Update Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, storage, &[]);
        pass.set_bind_group(1, &frame_bind_group, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
        tracing::trace!(
            "update dispatch: {} groups, collision {}",
            groups,
            if collision_enabled != 0 { "on" } else { "off" }
        );
    }
}

fn placeholder_view(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl std::fmt::Debug for GpuParticleSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuParticleSimulator")
            .field("group_size", &self.group_size)
            .field("gravity", &self.gravity)
            .field("damping", &self.damping)
            .field("depth_epsilon", &self.depth_epsilon)
            .finish()
    }
}
