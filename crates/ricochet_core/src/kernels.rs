//! Host implementations of the Init, Emit and Update kernels
//!
//! Each function is the body of one device invocation. The pool and the
//! simulator run them over all slots with rayon, sharing the atomic
//! [`FreeList`].

use std::f32::consts::TAU;

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::config::ParticleConfig;
use crate::free_list::FreeList;
use crate::particle::Particle;
use crate::random::InvocationRng;
use crate::surface::{resolve_collision, CollisionParams, CollisionSurface};

/// Payload parameters of one emission dispatch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnParams {
    /// Centre of the spawn box
    pub anchor: Vec3,
    /// Oriented base velocity
    pub velocity: Vec3,
    /// Per-axis velocity jitter
    pub velocity_spread: Vec3,
    /// Size of the spawn box
    pub range: Vec3,
    /// Angular velocity maxima in radians per second
    pub angular_velocity: Vec3,
    pub scale: f32,
    pub lifetime: f32,
    pub color: [f32; 4],
}

impl SpawnParams {
    /// Spawn parameters from config, with an already oriented velocity
    pub fn from_config(config: &ParticleConfig, anchor: Vec3, velocity: Vec3) -> Self {
        Self {
            anchor,
            velocity,
            velocity_spread: Vec3::from(config.velocity_spread),
            range: Vec3::from(config.range),
            angular_velocity: config.angular_velocity_radians(),
            scale: config.scale,
            lifetime: config.lifetime,
            color: config.color,
        }
    }
}

/// Per-frame parameters of the Update kernel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateParams {
    pub delta_time: f32,
    pub gravity: Vec3,
    pub view_proj: Mat4,
    pub collision: CollisionParams,
}

/// Reset every slot and enqueue every index
pub fn init_particles(particles: &mut [Particle], free_list: &FreeList) {
    free_list.clear();
    particles.par_iter_mut().enumerate().for_each(|(index, particle)| {
        *particle = Particle::INACTIVE;
        let appended = free_list.append(index as u32);
        debug_assert!(appended, "free-list smaller than the particle array");
    });
}

/// Payload a fresh particle gets from invocation `invocation` of an emit
pub fn spawn_particle(spawn: &SpawnParams, seed: u32, invocation: u32) -> Particle {
    let mut rng = InvocationRng::new(seed, invocation);

    let position = spawn.anchor + rng.centered_vec3() * spawn.range;
    let velocity = spawn.velocity + rng.centered_vec3() * spawn.velocity_spread;
    let rotation = Vec3::new(rng.next_f32(), rng.next_f32(), rng.next_f32()) * TAU;
    let angular_velocity = rng.signed_vec3() * spawn.angular_velocity;

    Particle {
        position: position.into(),
        active: 1,
        velocity: velocity.into(),
        scale: spawn.scale,
        rotation: rotation.into(),
        age: 0.0,
        angular_velocity: angular_velocity.into(),
        lifetime: spawn.lifetime,
        color: spawn.color,
    }
}

/// Run `granted` Emit invocations; returns how many found a free slot
///
/// Invocations that find the free-list empty do nothing.
pub fn emit_particles(
    particles: &mut [Particle],
    free_list: &FreeList,
    granted: u32,
    spawn: &SpawnParams,
    seed: u32,
) -> u32 {
    let mut spawned = 0;
    // Consumed indices are unique, so visiting invocations in order is
    // equivalent to any parallel schedule.
    for invocation in 0..granted {
        let Some(slot) = free_list.consume() else {
            continue;
        };
        particles[slot as usize] = spawn_particle(spawn, seed, invocation);
        spawned += 1;
    }
    spawned
}

/// Advance one slot; returns true when it retired this step
pub fn update_particle(
    particle: &mut Particle,
    params: &UpdateParams,
    surface: Option<&CollisionSurface>,
) -> bool {
    if !particle.is_active() {
        return false;
    }

    let dt = params.delta_time;
    let previous = particle.position();
    let mut velocity = particle.velocity() + params.gravity * dt;
    let position = previous + velocity * dt;
    let rotation = Vec3::from(particle.rotation) + Vec3::from(particle.angular_velocity) * dt;

    if let Some(surface) = surface {
        if let Some(bounced) = resolve_collision(
            surface,
            &params.view_proj,
            previous,
            position,
            velocity,
            params.collision,
        ) {
            velocity = bounced;
        }
    }

    particle.position = position.into();
    particle.velocity = velocity.into();
    particle.rotation = rotation.into();
    particle.age += dt;

    if particle.age >= particle.lifetime {
        particle.retire();
        true
    } else {
        false
    }
}

/// Advance all slots in parallel; returns the number retired
pub fn update_particles(
    particles: &mut [Particle],
    free_list: &FreeList,
    params: &UpdateParams,
    surface: Option<&CollisionSurface>,
) -> u32 {
    particles
        .par_iter_mut()
        .enumerate()
        .map(|(index, particle)| {
            let retired = update_particle(particle, params, surface);
            if retired {
                // A full list here means a slot was freed twice
                let appended = free_list.append(index as u32);
                debug_assert!(appended, "free-list full when retiring slot {index}");
            }
            retired
        })
        .filter(|&retired| retired)
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> SpawnParams {
        SpawnParams::from_config(
            &ParticleConfig::default(),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.0, 5.0, 0.0),
        )
    }

    fn still_params(dt: f32) -> UpdateParams {
        UpdateParams {
            delta_time: dt,
            gravity: Vec3::ZERO,
            view_proj: Mat4::IDENTITY,
            collision: CollisionParams {
                damping: 0.5,
                depth_epsilon: 1e-4,
            },
        }
    }

    #[test]
    fn test_init_resets_and_enqueues_everything() {
        let mut particles = vec![spawn_particle(&spawn(), 0, 0); 16];
        let free_list = FreeList::new(16);
        init_particles(&mut particles, &free_list);

        assert!(particles.iter().all(|p| !p.is_active()));
        let mut free = free_list.snapshot();
        free.sort_unstable();
        assert_eq!(free, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_spawn_payload_within_bounds() {
        let spawn = spawn();
        for invocation in 0..64 {
            let p = spawn_particle(&spawn, 9, invocation);
            assert!(p.is_active());
            assert_eq!(p.age, 0.0);
            assert_eq!(p.lifetime, spawn.lifetime);
            assert_eq!(p.scale, spawn.scale);

            let offset = (p.position() - spawn.anchor).abs();
            assert!(offset.cmple(spawn.range * 0.5 + 1e-6).all());
            assert!(Vec3::from(p.angular_velocity)
                .abs()
                .cmple(spawn.angular_velocity + 1e-6)
                .all());
            assert!(p.rotation.iter().all(|r| (0.0..=TAU).contains(r)));
            // Zero spread leaves the base velocity untouched
            assert_eq!(p.velocity(), spawn.velocity);
        }
    }

    #[test]
    fn test_emit_stops_at_empty_free_list() {
        let mut particles = vec![Particle::INACTIVE; 4];
        let free_list = FreeList::new(4);
        init_particles(&mut particles, &free_list);

        let spawned = emit_particles(&mut particles, &free_list, 10, &spawn(), 1);
        assert_eq!(spawned, 4);
        assert!(free_list.is_empty());
        assert!(particles.iter().all(Particle::is_active));
    }

    #[test]
    fn test_update_integrates_and_retires() {
        let mut p = spawn_particle(&spawn(), 0, 0);
        p.lifetime = 0.5;
        let start = p.position();

        assert!(!update_particle(&mut p, &still_params(0.25), None));
        assert!((p.position() - (start + Vec3::new(0.0, 1.25, 0.0))).length() < 1e-5);
        assert!(update_particle(&mut p, &still_params(0.25), None));
        assert!(!p.is_active());

        // Inactive slots are left alone
        let frozen = p;
        assert!(!update_particle(&mut p, &still_params(0.25), None));
        assert_eq!(p, frozen);
    }

    #[test]
    fn test_gravity_applies_before_position() {
        let mut p = Particle {
            active: 1,
            lifetime: 10.0,
            ..Particle::INACTIVE
        };
        let params = UpdateParams {
            gravity: Vec3::new(0.0, -10.0, 0.0),
            ..still_params(0.5)
        };
        update_particle(&mut p, &params, None);
        assert_eq!(p.velocity(), Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(p.position(), Vec3::new(0.0, -2.5, 0.0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "free-list full when retiring slot 0")]
    fn test_retire_into_full_free_list_is_caught() {
        // Slot 0 is already free, yet it is also live and about to expire
        let free_list = FreeList::new(1);
        assert!(free_list.append(0));
        let mut particles = vec![Particle {
            active: 1,
            lifetime: 0.1,
            ..Particle::INACTIVE
        }];
        update_particles(&mut particles, &free_list, &still_params(0.25), None);
    }
}
