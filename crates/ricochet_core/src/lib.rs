//! Ricochet core
//!
//! Device-independent half of the Ricochet particle system: session config,
//! the particle record, the atomic free-list, host implementations of the
//! Init/Emit/Update kernels, screen-space collision math, the capture
//! provider registry, the emission controller and combined-mesh building
//! for pseudo-instanced drawing.
//!
//! The GPU implementation in `ricochet_gpu` runs the same kernels in WGSL
//! and implements the same [`ParticleDevice`] contract.

pub mod camera;
pub mod config;
pub mod emission;
pub mod error;
pub mod free_list;
pub mod kernels;
pub mod mesh;
pub mod particle;
pub mod pool;
pub mod random;
pub mod registry;
pub mod simulator;
pub mod surface;

pub use camera::{Camera, CameraView, SurfaceExtent};
pub use config::{ParticleConfig, MAX_BURST_GROUPS, MAX_GROUP_SIZE, MAX_POOL_BYTES};
pub use emission::{EmissionController, EmissionTrigger};
pub use error::{ConfigError, MeshError, Result};
pub use free_list::FreeList;
pub use kernels::{SpawnParams, UpdateParams};
pub use mesh::{BatchLayout, CombinedMesh, CombinedVertex, MeshData, MAX_VERTEX_NUM};
pub use particle::Particle;
pub use pool::{dispatch_groups, CpuParticlePool, ParticleDevice};
pub use registry::{CaptureRegistry, ProviderId};
pub use simulator::CpuSimulator;
pub use surface::{
    decode_normal, encode_normal, CollisionParams, CollisionSurface, ATTRIBUTE_COUNT,
    NORMAL_ATTRIBUTE,
};
