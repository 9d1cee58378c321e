//! GPU particle pool
//!
//! ```text
//! GpuParticlePool
//!        │
//!        ├── particle buffer   array<Particle>, one record per slot
//!        ├── free-list buffer  { count: atomic<u32>, indices: array<u32> }
//!        └── count readback    4 bytes, MAP_READ
//! ```
//!
//! Init and Emit are recorded and submitted by the pool itself. Update is
//! recorded by [`GpuParticleSimulator`](crate::GpuParticleSimulator) into
//! the frame's encoder and reaches the buffers through
//! [`GpuParticlePool::storage_bind_group`].

use std::sync::Arc;

use ricochet_core::{dispatch_groups, Particle, ParticleConfig, ParticleDevice, SpawnParams};

use crate::context::{read_buffer, GpuContext};
use crate::error::{GpuError, Result};
use crate::shaders::{compute_shader, EMIT_KERNEL, INIT_KERNEL};
use crate::uniforms::EmitUniforms;

/// Size of the free-list header (the atomic count)
const FREE_LIST_HEADER: u64 = 4;

struct PoolBuffers {
    capacity: u32,
    particles: wgpu::Buffer,
    free_list: wgpu::Buffer,
    count_readback: wgpu::Buffer,
    storage_bind_group: wgpu::BindGroup,
}

/// Fixed-capacity particle pool on the GPU
pub struct GpuParticlePool {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    group_size: u32,
    storage_layout: wgpu::BindGroupLayout,
    init_pipeline: wgpu::ComputePipeline,
    emit_pipeline: wgpu::ComputePipeline,
    emit_uniforms: wgpu::Buffer,
    emit_bind_group: wgpu::BindGroup,
    buffers: Option<PoolBuffers>,
    available_hint: u32,
    seed: u32,
    generation: u64,
}

impl GpuParticlePool {
    /// Build the pool's pipelines; storage is allocated by [`init`](Self::init)
    pub fn new(context: &GpuContext, group_size: u32) -> Self {
        assert!(group_size > 0, "group size must be greater than zero");
        let device = &context.device;

        let storage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Storage Bind Group Layout"),
            entries: &[
                // Particles (storage, read_write)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Free-list (storage, read_write)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let emit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Emit Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let init_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Init Shader"),
            source: wgpu::ShaderSource::Wgsl(compute_shader(INIT_KERNEL, group_size).into()),
        });
        let emit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Emit Shader"),
            source: wgpu::ShaderSource::Wgsl(compute_shader(EMIT_KERNEL, group_size).into()),
        });

        let init_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Init Pipeline Layout"),
            bind_group_layouts: &[&storage_layout],
            push_constant_ranges: &[],
        });
        let emit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Emit Pipeline Layout"),
            bind_group_layouts: &[&storage_layout, &emit_layout],
            push_constant_ranges: &[],
        });

        let init_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Particle Init Pipeline"),
            layout: Some(&init_pipeline_layout),
            module: &init_shader,
            entry_point: Some("init"),
            compilation_options: Default::default(),
            cache: None,
        });
        let emit_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Particle Emit Pipeline"),
            layout: Some(&emit_pipeline_layout),
            module: &emit_shader,
            entry_point: Some("emit"),
            compilation_options: Default::default(),
            cache: None,
        });

        let emit_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Emit Uniforms"),
            size: std::mem::size_of::<EmitUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let emit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Emit Bind Group"),
            layout: &emit_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: emit_uniforms.as_entire_binding(),
            }],
        });

        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            group_size,
            storage_layout,
            init_pipeline,
            emit_pipeline,
            emit_uniforms,
            emit_bind_group,
            buffers: None,
            available_hint: 0,
            seed: 0,
            generation: 0,
        }
    }

    /// Create and initialize a pool from a validated config
    pub fn from_config(context: &GpuContext, config: &ParticleConfig) -> Self {
        let mut pool = Self::new(context, config.group_size);
        pool.init(config.capacity);
        pool
    }

    /// Allocate `capacity` slots and run the Init kernel
    ///
    /// Re-initializing without a teardown drops the old buffers first.
    pub fn init(&mut self, capacity: u32) {
        assert!(capacity > 0, "pool capacity must be greater than zero");
        assert!(
            capacity % self.group_size == 0,
            "pool capacity {capacity} is not a multiple of group size {}",
            self.group_size
        );
        if self.buffers.take().is_some() {
            tracing::warn!("particle pool re-initialized without teardown");
        }

        let particles = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Buffer"),
            size: (Particle::SIZE * capacity as usize) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let free_list = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Free List"),
            size: FREE_LIST_HEADER + 4 * capacity as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let count_readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Free Count Readback"),
            size: FREE_LIST_HEADER,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let storage_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Storage Bind Group"),
            layout: &self.storage_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: free_list.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Init Encoder"),
            });
        encoder.clear_buffer(&free_list, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Particle Init Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.init_pipeline);
            pass.set_bind_group(0, &storage_bind_group, &[]);
            pass.dispatch_workgroups(dispatch_groups(capacity, self.group_size), 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.buffers = Some(PoolBuffers {
            capacity,
            particles,
            free_list,
            count_readback,
            storage_bind_group,
        });
        self.available_hint = capacity;
        self.generation += 1;
        tracing::info!(
            "GPU particle pool initialized: {} slots, {} groups of {}",
            capacity,
            dispatch_groups(capacity, self.group_size),
            self.group_size
        );
    }

    /// Release the record, free-list and readback buffers
    ///
    /// Safe to call when never initialized and safe to call twice.
    pub fn teardown(&mut self) {
        if self.buffers.take().is_some() {
            tracing::info!("GPU particle pool torn down");
        }
        self.available_hint = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.buffers.is_some()
    }

    /// Cached bound from the last query, lowered by every grant since
    pub fn available_hint(&self) -> u32 {
        self.available_hint
    }

    /// Bumped on every init; bind groups over the particle buffer are stale
    /// once it changes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Layout of bind group 0 of every particle kernel
    pub fn storage_layout(&self) -> &wgpu::BindGroupLayout {
        &self.storage_layout
    }

    pub fn storage_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.buffers.as_ref().map(|b| &b.storage_bind_group)
    }

    /// Record buffer, read-only for renderers
    pub fn particle_buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffers.as_ref().map(|b| &b.particles)
    }

    /// Copy the free-list count to the host
    pub fn try_query_available_count(&mut self) -> Result<u32> {
        let Some(buffers) = &self.buffers else {
            self.available_hint = 0;
            return Ok(0);
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Count Query Encoder"),
            });
        encoder.copy_buffer_to_buffer(
            &buffers.free_list,
            0,
            &buffers.count_readback,
            0,
            FREE_LIST_HEADER,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = read_buffer(&self.device, &buffers.count_readback)?;
        let count: u32 = bytemuck::pod_read_unaligned(&data[..4]);
        self.available_hint = count.min(buffers.capacity);
        Ok(self.available_hint)
    }

    /// Copy every record back to the host
    pub fn read_particles(&self) -> Result<Vec<Particle>> {
        let buffers = self.buffers.as_ref().ok_or(GpuError::NotInitialized)?;
        let data = self.read_whole(&buffers.particles, "Particle Readback Buffer")?;
        Ok(bytemuck::pod_collect_to_vec(&data))
    }

    /// Copy the live free-list entries back to the host, bottom first
    pub fn read_free_list(&self) -> Result<Vec<u32>> {
        let buffers = self.buffers.as_ref().ok_or(GpuError::NotInitialized)?;
        let data = self.read_whole(&buffers.free_list, "Free List Readback Buffer")?;
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&data);
        let count = words[0].min(buffers.capacity) as usize;
        Ok(words[1..1 + count].to_vec())
    }

    fn read_whole(&self, source: &wgpu::Buffer, label: &str) -> Result<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: source.size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, source.size());
        self.queue.submit(std::iter::once(encoder.finish()));
        read_buffer(&self.device, &staging)
    }
}

impl ParticleDevice for GpuParticlePool {
    fn capacity(&self) -> u32 {
        self.buffers.as_ref().map_or(0, |b| b.capacity)
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }

    fn query_available_count(&mut self) -> u32 {
        match self.try_query_available_count() {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("free-slot readback failed: {}", e);
                self.available_hint = 0;
                0
            }
        }
    }

    fn acquire(&mut self, requested: u32, spawn: &SpawnParams) -> u32 {
        let granted = requested.min(self.available_hint);
        if granted == 0 {
            return 0;
        }
        let Some(buffers) = &self.buffers else {
            return 0;
        };

        let seed = self.seed;
        self.seed = self.seed.wrapping_add(1);
        self.queue.write_buffer(
            &self.emit_uniforms,
            0,
            bytemuck::bytes_of(&EmitUniforms::new(spawn, granted, seed)),
        );

        let groups = dispatch_groups(granted, self.group_size);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Emit Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Particle Emit Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.emit_pipeline);
            pass.set_bind_group(0, &buffers.storage_bind_group, &[]);
            pass.set_bind_group(1, &self.emit_bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!("emit dispatch: {} invocations in {} groups", granted, groups);

        self.available_hint -= granted;
        granted
    }
}

impl std::fmt::Debug for GpuParticlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuParticlePool")
            .field("capacity", &self.capacity())
            .field("group_size", &self.group_size)
            .field("available_hint", &self.available_hint)
            .field("generation", &self.generation)
            .finish()
    }
}
