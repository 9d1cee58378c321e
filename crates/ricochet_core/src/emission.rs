//! Trigger-to-emission mapping

use glam::{Quat, Vec3};

use crate::config::ParticleConfig;
use crate::kernels::SpawnParams;
use crate::pool::ParticleDevice;

/// A request to spawn particles off a surface point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmissionTrigger {
    /// World-space hit point
    pub position: Vec3,
    /// Surface normal at the hit point
    pub normal: Vec3,
    /// Requested number of particles
    pub burst: u32,
}

/// Turns triggers into bounded acquire dispatches
#[derive(Clone, Debug)]
pub struct EmissionController {
    config: ParticleConfig,
}

impl EmissionController {
    pub fn new(config: ParticleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Spawn parameters for a trigger: pushed-out anchor, velocity rotated
    /// so that +Y follows the surface normal
    pub fn spawn_params(&self, trigger: &EmissionTrigger) -> SpawnParams {
        let normal = trigger.normal.normalize_or(Vec3::Y);
        let anchor = trigger.position + normal * self.config.spawn_offset;
        let orientation = Quat::from_rotation_arc(Vec3::Y, normal);
        let velocity = orientation * Vec3::from(self.config.velocity);
        SpawnParams::from_config(&self.config, anchor, velocity)
    }

    /// Emit for one trigger; returns the number of particles requested
    ///
    /// Queries the device's free-slot count first and requests nothing when
    /// it is zero. Otherwise the request is `burst`, clamped to the burst
    /// bound and to the queried count.
    pub fn emit<D: ParticleDevice + ?Sized>(
        &mut self,
        device: &mut D,
        trigger: &EmissionTrigger,
    ) -> u32 {
        let available = device.query_available_count();
        if available == 0 {
            tracing::debug!("emission skipped: no free slots");
            return 0;
        }

        let requested = trigger
            .burst
            .min(self.config.max_burst())
            .min(available);
        if requested == 0 {
            return 0;
        }

        let spawn = self.spawn_params(trigger);
        let granted = device.acquire(requested, &spawn);
        tracing::debug!(
            "emitted {} particles at ({:.2}, {:.2}, {:.2}), {} were free",
            granted,
            spawn.anchor.x,
            spawn.anchor.y,
            spawn.anchor.z,
            available
        );
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CpuParticlePool;

    fn controller(capacity: u32) -> (EmissionController, CpuParticlePool) {
        let config = ParticleConfig {
            capacity,
            group_size: 8,
            max_burst_groups: 1,
            ..Default::default()
        };
        (
            EmissionController::new(config.clone()),
            CpuParticlePool::from_config(&config),
        )
    }

    #[test]
    fn test_velocity_follows_normal() {
        let (controller, _) = controller(8);
        let trigger = EmissionTrigger {
            position: Vec3::ZERO,
            normal: Vec3::NEG_Z,
            burst: 1,
        };
        let spawn = controller.spawn_params(&trigger);
        // (2, 5, 2) with +Y turned onto -Z
        assert!((spawn.velocity.z - -5.0).abs() < 1e-5);
        assert!((spawn.velocity.length() - Vec3::new(2.0, 5.0, 2.0).length()).abs() < 1e-5);
        assert!((spawn.anchor - Vec3::new(0.0, 0.0, -0.1)).length() < 1e-6);
    }

    #[test]
    fn test_up_normal_keeps_base_velocity() {
        let (controller, _) = controller(8);
        let trigger = EmissionTrigger {
            position: Vec3::ONE,
            normal: Vec3::Y,
            burst: 1,
        };
        let spawn = controller.spawn_params(&trigger);
        assert!((spawn.velocity - Vec3::new(2.0, 5.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_burst_clamped_to_bound() {
        let (mut controller, mut pool) = controller(64);
        let trigger = EmissionTrigger {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            burst: 1000,
        };
        // One group of eight per trigger
        assert_eq!(controller.emit(&mut pool, &trigger), 8);
        assert_eq!(pool.active_count(), 8);
    }

    #[test]
    fn test_burst_larger_than_available() {
        let (mut controller, mut pool) = controller(16);
        let trigger = EmissionTrigger {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            burst: 8,
        };
        assert_eq!(controller.emit(&mut pool, &trigger), 8);
        let trigger = EmissionTrigger { burst: 5, ..trigger };
        assert_eq!(controller.emit(&mut pool, &trigger), 5);
        assert_eq!(controller.emit(&mut pool, &trigger), 3);
        assert_eq!(controller.emit(&mut pool, &trigger), 0);

        assert_eq!(pool.active_count(), 16);
        assert!(pool.is_consistent());
    }
}
