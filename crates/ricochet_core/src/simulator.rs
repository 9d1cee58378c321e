//! Host reference simulator

use glam::Vec3;

use crate::camera::CameraView;
use crate::config::ParticleConfig;
use crate::kernels::{update_particles, UpdateParams};
use crate::pool::CpuParticlePool;
use crate::surface::{CollisionParams, CollisionSurface};

/// Advances every slot of a [`CpuParticlePool`] once per frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CpuSimulator {
    gravity: Vec3,
    collision: CollisionParams,
}

impl CpuSimulator {
    pub fn new(config: &ParticleConfig) -> Self {
        Self {
            gravity: config.gravity_vector(),
            collision: CollisionParams {
                damping: config.damping,
                depth_epsilon: config.depth_epsilon,
            },
        }
    }

    /// Run the Update kernel over all slots; returns how many retired
    ///
    /// Collision runs only when `surface` was captured at the view's
    /// extent. Otherwise particles integrate without it for this frame.
    pub fn update(
        &self,
        pool: &mut CpuParticlePool,
        delta_time: f32,
        view: &CameraView,
        surface: Option<&CollisionSurface>,
    ) -> u32 {
        let Some((particles, free_list)) = pool.storage_mut() else {
            return 0;
        };

        let surface = surface.filter(|s| s.extent() == view.extent);
        let params = UpdateParams {
            delta_time,
            gravity: self.gravity,
            view_proj: view.view_proj,
            collision: self.collision,
        };
        update_particles(particles, free_list, &params, surface)
    }
}
