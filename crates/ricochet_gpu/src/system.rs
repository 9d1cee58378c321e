//! Frame orchestration
//!
//! Per frame, in queue order:
//!
//! ```text
//! begin_frame   Emit (if a trigger is pending) → Update
//! scene pass    (caller)
//! capture       scene depth + attributes → SceneCollisionBuffers
//! draw          particles, once per ViewBinding
//! ```
//!
//! The capture recorded this frame is what the next frame's Update
//! collides against.

use std::sync::Arc;

use glam::Vec3;
use ricochet_core::{
    CameraView, CaptureRegistry, EmissionController, EmissionTrigger, MeshData, ParticleConfig,
};

use crate::context::GpuContext;
use crate::error::Result;
use crate::gbuffer::{CaptureSource, SceneCollisionBuffers};
use crate::pool::GpuParticlePool;
use crate::renderer::{PseudoInstancedRenderer, ViewBinding};
use crate::simulator::GpuParticleSimulator;

/// Render target formats the particle system draws into
#[derive(Clone, Copy, Debug)]
pub struct TargetFormats {
    pub color: wgpu::TextureFormat,
    pub depth: Option<wgpu::TextureFormat>,
}

/// Pool, simulator, emitter, renderer and collision capture for one scene
#[derive(Debug)]
pub struct ParticleSystem {
    config: ParticleConfig,
    pool: GpuParticlePool,
    simulator: GpuParticleSimulator,
    emitter: EmissionController,
    renderer: PseudoInstancedRenderer,
    collision: SceneCollisionBuffers,
    /// At most one emission per frame; a newer trigger replaces an older one
    pending: Option<EmissionTrigger>,
}

impl ParticleSystem {
    /// Validate `config` and build every component with a unit cube mesh
    pub fn new(
        context: &GpuContext,
        config: ParticleConfig,
        registry: Arc<CaptureRegistry>,
        formats: TargetFormats,
    ) -> Result<Self> {
        Self::with_mesh(context, config, registry, formats, &MeshData::cube(1.0))
    }

    pub fn with_mesh(
        context: &GpuContext,
        config: ParticleConfig,
        registry: Arc<CaptureRegistry>,
        formats: TargetFormats,
        mesh: &MeshData,
    ) -> Result<Self> {
        config.validate()?;

        let pool = GpuParticlePool::from_config(context, &config);
        let simulator = GpuParticleSimulator::new(context, &pool, &config);
        let renderer = PseudoInstancedRenderer::new(
            context,
            formats.color,
            formats.depth,
            mesh,
            config.capacity,
        )?;
        let collision = SceneCollisionBuffers::new(context, registry);
        let emitter = EmissionController::new(config.clone());

        Ok(Self {
            config,
            pool,
            simulator,
            emitter,
            renderer,
            collision,
            pending: None,
        })
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    pub fn pool(&self) -> &GpuParticlePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut GpuParticlePool {
        &mut self.pool
    }

    pub fn collision(&self) -> &SceneCollisionBuffers {
        &self.collision
    }

    /// Queue an emission for the next [`begin_frame`](Self::begin_frame)
    pub fn trigger(&mut self, trigger: EmissionTrigger) {
        self.pending = Some(trigger);
    }

    /// Emit any pending trigger, then record Update into `encoder`
    ///
    /// Returns the number of particles emitted.
    pub fn begin_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        delta_time: f32,
        view: &CameraView,
    ) -> u32 {
        let emitted = match self.pending.take() {
            Some(trigger) => self.emitter.emit(&mut self.pool, &trigger),
            None => 0,
        };

        let snapshot = self.collision.snapshot(view.extent);
        self.simulator
            .update(encoder, &self.pool, delta_time, view, snapshot);
        self.renderer.prepare(&self.pool);
        emitted
    }

    /// Capture the scene for the next frame's collisions
    ///
    /// Activates the collision buffers on first use.
    ///
    /// # Panics
    ///
    /// Panics if another capture provider is active in the same registry.
    pub fn capture(&mut self, encoder: &mut wgpu::CommandEncoder, source: &CaptureSource<'_>) {
        if !self.collision.is_active() {
            self.collision.activate(source.extent);
        }
        self.collision.capture(encoder, source);
    }

    pub fn create_view_binding(&self, label: &str) -> ViewBinding {
        self.renderer.create_view_binding(label)
    }

    pub fn update_view(&self, binding: &ViewBinding, view: &CameraView, light_dir: Vec3) {
        self.renderer.update_view(binding, view, light_dir);
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, binding: &ViewBinding) {
        self.renderer.draw(pass, binding);
    }

    /// Release the pool buffers and the collision capture
    pub fn shutdown(&mut self) {
        self.pending = None;
        self.collision.deactivate();
        self.pool.teardown();
    }
}
