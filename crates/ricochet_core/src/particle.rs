//! Particle record shared by the host kernels and the GPU buffers

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One particle slot
///
/// Must match the WGSL `Particle` struct layout exactly (80 bytes,
/// 16-byte aligned rows).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// World-space position
    pub position: [f32; 3],
    /// 1 while the slot holds a live particle, 0 otherwise
    pub active: u32,
    /// World-space velocity
    pub velocity: [f32; 3],
    /// Uniform scale
    pub scale: f32,
    /// Euler angles in radians
    pub rotation: [f32; 3],
    /// Seconds since spawn
    pub age: f32,
    /// Euler angle rates in radians per second
    pub angular_velocity: [f32; 3],
    /// Seconds until the particle is retired
    pub lifetime: f32,
    /// Color (rgba)
    pub color: [f32; 4],
}

impl Default for Particle {
    fn default() -> Self {
        Self::INACTIVE
    }
}

impl Particle {
    /// The state Init writes into every slot
    pub const INACTIVE: Particle = Particle {
        position: [0.0; 3],
        active: 0,
        velocity: [0.0; 3],
        scale: 0.0,
        rotation: [0.0; 3],
        age: 0.0,
        angular_velocity: [0.0; 3],
        lifetime: 0.0,
        color: [0.0; 4],
    };

    /// Size of one record in bytes
    pub const SIZE: usize = std::mem::size_of::<Particle>();

    pub fn is_active(&self) -> bool {
        self.active != 0
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from(self.velocity)
    }

    /// Clear the slot, keeping the last payload around for inspection
    pub fn retire(&mut self) {
        self.active = 0;
    }
}
