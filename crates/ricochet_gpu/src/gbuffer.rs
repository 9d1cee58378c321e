//! Scene collision buffers
//!
//! Copies the scene's depth and its four geometry attribute targets into
//! textures owned by the particle system, so the next frame's Update can
//! sample them while the scene targets are being redrawn.
//!
//! ```text
//! scene pass ──► CaptureSource ──capture()──► SceneCollisionBuffers
//!                                                    │
//!                                   snapshot(extent) ▼
//!                                         GpuParticleSimulator::update
//! ```
//!
//! Only one instance may be active per [`CaptureRegistry`].

use std::sync::Arc;

use ricochet_core::{
    CaptureRegistry, CollisionSurface, ProviderId, SurfaceExtent, ATTRIBUTE_COUNT,
    NORMAL_ATTRIBUTE,
};

use crate::context::{read_texture, GpuContext};
use crate::error::Result;
use crate::shaders::GBUFFER_COPY_SHADER;

/// Format of every captured attribute plane
pub const ATTRIBUTE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Format of the captured depth plane
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Usage the scene's own targets need so they can be captured
pub const SOURCE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING);

/// Views of the scene targets to capture from
#[derive(Clone, Copy, Debug)]
pub struct CaptureSource<'a> {
    /// Depth written by the scene pass, `DEPTH_FORMAT`
    pub depth: &'a wgpu::TextureView,
    /// Albedo, specular, normal and emission, all `ATTRIBUTE_FORMAT`
    pub attributes: [&'a wgpu::TextureView; ATTRIBUTE_COUNT],
    pub extent: SurfaceExtent,
}

/// What the simulator samples for one frame
#[derive(Clone, Copy, Debug)]
pub struct CollisionSnapshot<'a> {
    pub depth: &'a wgpu::TextureView,
    pub normal: &'a wgpu::TextureView,
    pub extent: SurfaceExtent,
}

struct CaptureTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Captured textures, reallocated whenever the source extent changes
struct CaptureTargets {
    extent: SurfaceExtent,
    depth: CaptureTarget,
    attributes: [CaptureTarget; ATTRIBUTE_COUNT],
    /// Set once a capture has been recorded into these textures
    captured: bool,
}

/// Owner of the collision capture textures
pub struct SceneCollisionBuffers {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    registry: Arc<CaptureRegistry>,
    id: ProviderId,
    active: bool,
    source_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    targets: Option<CaptureTargets>,
}

impl SceneCollisionBuffers {
    pub fn new(context: &GpuContext, registry: Arc<CaptureRegistry>) -> Self {
        let device = &context.device;

        let mut entries = Vec::with_capacity(1 + ATTRIBUTE_COUNT);
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        for i in 0..ATTRIBUTE_COUNT {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let source_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("G-Buffer Capture Source Layout"),
            entries: &entries,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("G-Buffer Capture Shader"),
            source: wgpu::ShaderSource::Wgsl(GBUFFER_COPY_SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("G-Buffer Capture Pipeline Layout"),
            bind_group_layouts: &[&source_layout],
            push_constant_ranges: &[],
        });

        let color_target = Some(wgpu::ColorTargetState {
            format: ATTRIBUTE_FORMAT,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("G-Buffer Capture Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[
                    color_target.clone(),
                    color_target.clone(),
                    color_target.clone(),
                    color_target,
                ],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let id = registry.register();
        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            registry,
            id,
            active: false,
            source_layout,
            pipeline,
            targets: None,
        }
    }

    /// Become the registry's active provider and allocate for `extent`
    ///
    /// Activating an already active instance does nothing.
    ///
    /// # Panics
    ///
    /// Panics if a different provider is active in the same registry.
    pub fn activate(&mut self, extent: SurfaceExtent) {
        if self.active {
            return;
        }
        self.registry.activate(self.id);
        self.active = true;
        self.targets = Some(self.create_targets(extent));
    }

    /// Release the textures and the registry slot
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.targets = None;
        self.registry.deactivate(self.id);
        self.active = false;
        tracing::info!("collision capture released");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Extent of the current textures, if any
    pub fn extent(&self) -> Option<SurfaceExtent> {
        self.targets.as_ref().map(|t| t.extent)
    }

    /// Record the copy of `source` into the capture textures
    ///
    /// An empty source (a minimized window) is skipped and the previous
    /// capture is kept.
    ///
    /// # Panics
    ///
    /// Panics if the buffers are not active.
    pub fn capture(&mut self, encoder: &mut wgpu::CommandEncoder, source: &CaptureSource<'_>) {
        assert!(self.active, "capture called on inactive collision buffers");
        if source.extent.is_empty() {
            tracing::trace!("skipping collision capture of an empty surface");
            return;
        }

        if self.targets.as_ref().map(|t| t.extent) != Some(source.extent) {
            if let Some(old) = &self.targets {
                tracing::debug!(
                    "collision capture resized {}x{} -> {}x{}",
                    old.extent.width,
                    old.extent.height,
                    source.extent.width,
                    source.extent.height
                );
            }
            self.targets = Some(self.create_targets(source.extent));
        }
        let Some(targets) = self.targets.as_mut() else {
            return;
        };

        let mut entries = Vec::with_capacity(1 + ATTRIBUTE_COUNT);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(source.depth),
        });
        for (i, view) in source.attributes.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("G-Buffer Capture Source Bind Group"),
            layout: &self.source_layout,
            entries: &entries,
        });

        let color_attachments: Vec<_> = targets
            .attributes
            .iter()
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("G-Buffer Capture Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.view,
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
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        targets.captured = true;
        tracing::trace!(
            "collision capture recorded at {}x{}",
            source.extent.width,
            source.extent.height
        );
    }

    /// Captured depth
    ///
    /// # Panics
    ///
    /// Panics if the buffers are not active.
    pub fn depth(&self) -> &wgpu::TextureView {
        &self.active_targets().depth.view
    }

    /// Captured attribute plane `index`
    ///
    /// # Panics
    ///
    /// Panics if the buffers are not active or `index >= ATTRIBUTE_COUNT`.
    pub fn attribute(&self, index: usize) -> &wgpu::TextureView {
        assert!(
            index < ATTRIBUTE_COUNT,
            "attribute index {index} out of range (0..{ATTRIBUTE_COUNT})"
        );
        &self.active_targets().attributes[index].view
    }

    /// Views for the simulator, only when a capture exists at `extent`
    pub fn snapshot(&self, extent: SurfaceExtent) -> Option<CollisionSnapshot<'_>> {
        if !self.active {
            return None;
        }
        let targets = self.targets.as_ref()?;
        if !targets.captured || targets.extent != extent {
            return None;
        }
        Some(CollisionSnapshot {
            depth: &targets.depth.view,
            normal: &targets.attributes[NORMAL_ATTRIBUTE].view,
            extent,
        })
    }

    /// Copy the captured planes back to the host
    ///
    /// Blocks until the device is idle.
    ///
    /// # Panics
    ///
    /// Panics if the buffers are not active.
    pub fn read_snapshot(&self) -> Result<CollisionSurface> {
        let targets = self.active_targets();
        let mut surface = CollisionSurface::new(targets.extent);

        let depth = read_texture(
            &self.device,
            &self.queue,
            &targets.depth.texture,
            wgpu::TextureAspect::DepthOnly,
            4,
        )?;
        surface
            .depth_mut()
            .copy_from_slice(bytemuck::cast_slice(&depth));

        for (i, target) in targets.attributes.iter().enumerate() {
            let bytes = read_texture(
                &self.device,
                &self.queue,
                &target.texture,
                wgpu::TextureAspect::All,
                4,
            )?;
            for (texel, rgba) in surface.attribute_mut(i).iter_mut().zip(bytes.chunks_exact(4)) {
                *texel = std::array::from_fn(|c| rgba[c] as f32 / 255.0);
            }
        }
        Ok(surface)
    }

    fn active_targets(&self) -> &CaptureTargets {
        assert!(self.active, "collision buffers accessed before activation");
        match &self.targets {
            Some(targets) => targets,
            None => panic!("active collision buffers have no textures"),
        }
    }

    fn create_targets(&self, extent: SurfaceExtent) -> CaptureTargets {
        let extent = SurfaceExtent::new(extent.width.max(1), extent.height.max(1));
        tracing::info!(
            "allocating collision capture {}x{}",
            extent.width,
            extent.height
        );
        let depth = self.create_target(extent, DEPTH_FORMAT, "Collision Depth");
        let attributes = std::array::from_fn(|i| {
            self.create_target(extent, ATTRIBUTE_FORMAT, ATTRIBUTE_LABELS[i])
        });
        CaptureTargets {
            extent,
            depth,
            attributes,
            captured: false,
        }
    }

    fn create_target(
        &self,
        extent: SurfaceExtent,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> CaptureTarget {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
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
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        CaptureTarget { texture, view }
    }
}

const ATTRIBUTE_LABELS: [&str; ATTRIBUTE_COUNT] = [
    "Collision Albedo",
    "Collision Specular",
    "Collision Normal",
    "Collision Emission",
];

impl Drop for SceneCollisionBuffers {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for SceneCollisionBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneCollisionBuffers")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("extent", &self.extent())
            .finish()
    }
}
