//! Uniform blocks shared with the WGSL kernels
//!
//! Every struct here must match its WGSL counterpart byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use ricochet_core::{CameraView, SpawnParams};

/// Emit kernel parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct EmitUniforms {
    pub anchor: [f32; 3],
    /// Invocations allowed to take a slot
    pub granted: u32,
    pub velocity: [f32; 3],
    pub seed: u32,
    pub velocity_spread: [f32; 3],
    pub scale: f32,
    pub range: [f32; 3],
    pub lifetime: f32,
    /// Radians per second
    pub angular_velocity: [f32; 3],
    pub _pad: f32,
    pub color: [f32; 4],
}

impl EmitUniforms {
    pub fn new(spawn: &SpawnParams, granted: u32, seed: u32) -> Self {
        Self {
            anchor: spawn.anchor.into(),
            granted,
            velocity: spawn.velocity.into(),
            seed,
            velocity_spread: spawn.velocity_spread.into(),
            scale: spawn.scale,
            range: spawn.range.into(),
            lifetime: spawn.lifetime,
            angular_velocity: spawn.angular_velocity.into(),
            _pad: 0.0,
            color: spawn.color,
        }
    }
}

/// Update kernel parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct UpdateUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub gravity: [f32; 3],
    pub delta_time: f32,
    /// Collision surface size in pixels
    pub extent: [u32; 2],
    pub capacity: u32,
    /// 0 skips the collision step for this frame
    pub collision_enabled: u32,
    pub damping: f32,
    pub depth_epsilon: f32,
    pub _pad: [f32; 2],
}

/// Per-camera render parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ViewUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// Direction light travels in (xyz), w unused
    pub light_dir: [f32; 4],
}

impl ViewUniforms {
    pub fn new(view: &CameraView, light_dir: Vec3) -> Self {
        Self {
            view_proj: view.view_proj.to_cols_array_2d(),
            light_dir: light_dir.normalize_or(Vec3::NEG_Y).extend(0.0).into(),
        }
    }
}

/// Per-batch render parameters, one dynamic-offset slot per draw
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BatchUniforms {
    /// First particle slot drawn by the batch
    pub id_offset: u32,
    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<EmitUniforms>(), 96);
        assert_eq!(std::mem::offset_of!(EmitUniforms, color), 80);
        assert_eq!(std::mem::size_of::<UpdateUniforms>(), 112);
        assert_eq!(std::mem::offset_of!(UpdateUniforms, extent), 80);
        assert_eq!(std::mem::offset_of!(UpdateUniforms, damping), 96);
        assert_eq!(std::mem::size_of::<ViewUniforms>(), 80);
        assert_eq!(std::mem::size_of::<BatchUniforms>(), 16);
    }
}
