//! Ricochet GPU backend
//!
//! wgpu implementation of the Ricochet particle system.
//!
//! # Features
//!
//! - **Particle pool**: fixed-capacity record buffer with an atomic free-list
//!   consumed by Emit and refilled by Update
//! - **Simulation**: gravity, lifetime and screen-space collision against the
//!   previous frame's G-buffer
//! - **Collision capture**: single-provider copy of scene depth and attributes
//! - **Pseudo-instancing**: combined-mesh batches drawn per camera view

pub mod context;
pub mod error;
pub mod gbuffer;
pub mod pool;
pub mod renderer;
pub mod shaders;
pub mod simulator;
pub mod system;
pub mod uniforms;

#[cfg(test)]
mod tests;

pub use context::GpuContext;
pub use error::{GpuError, Result};
pub use gbuffer::{
    CaptureSource, CollisionSnapshot, SceneCollisionBuffers, ATTRIBUTE_FORMAT, DEPTH_FORMAT,
    SOURCE_USAGE,
};
pub use pool::GpuParticlePool;
pub use renderer::{PseudoInstancedRenderer, ViewBinding};
pub use simulator::GpuParticleSimulator;
pub use system::{ParticleSystem, TargetFormats};
pub use uniforms::{BatchUniforms, EmitUniforms, UpdateUniforms, ViewUniforms};
