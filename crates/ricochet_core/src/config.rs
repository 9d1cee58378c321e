//! Particle system configuration
//!
//! All values are static for a session. The pool capacity in particular
//! cannot change while the pool is alive; a new capacity means a full
//! teardown and re-init.
//!
//! ```toml
//! capacity = 65536
//! group_size = 64
//! velocity = [2.0, 5.0, 2.0]
//! lifetime = 2.0
//! damping = 0.5
//! ```

use std::path::Path;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::particle::Particle;

/// Upper bound of [`ParticleConfig::max_burst_groups`]
pub const MAX_BURST_GROUPS: u32 = 100;

/// Largest work-group every device supports (`max_compute_invocations_per_workgroup`)
pub const MAX_GROUP_SIZE: u32 = 256;

/// Largest particle record buffer every device can bind (`max_storage_buffer_binding_size`)
pub const MAX_POOL_BYTES: u64 = 128 << 20;

/// Session configuration for a particle pool, its emitter and its simulator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Number of particle slots (fixed for the session)
    pub capacity: u32,
    /// Invocations per compute work-group
    pub group_size: u32,
    /// Base velocity, expressed in the frame where +Y is the surface normal
    pub velocity: [f32; 3],
    /// Per-axis random spread added to the oriented base velocity
    pub velocity_spread: [f32; 3],
    /// Maximum angular velocity per axis in degrees per second
    pub angular_velocity: [f32; 3],
    /// Size of the box around the spawn anchor that positions are jittered in
    pub range: [f32; 3],
    /// Uniform particle scale
    pub scale: f32,
    /// Lifetime in seconds
    pub lifetime: f32,
    /// Particle color (rgba)
    pub color: [f32; 4],
    /// Per-trigger burst bound, in work-groups (1..=100)
    pub max_burst_groups: u32,
    /// Velocity scale applied after reflecting off a surface (0..=1)
    pub damping: f32,
    /// Tolerance, in NDC depth, for treating a particle as touching a surface
    pub depth_epsilon: f32,
    /// Distance along the surface normal that spawn anchors are pushed out by
    pub spawn_offset: f32,
    /// Downward acceleration in units per second squared
    pub gravity: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            capacity: 65_536,
            group_size: 64,
            velocity: [2.0, 5.0, 2.0],
            velocity_spread: [0.0, 0.0, 0.0],
            angular_velocity: [45.0, 45.0, 45.0],
            range: [1.0, 1.0, 1.0],
            scale: 0.2,
            lifetime: 2.0,
            color: [1.0, 1.0, 1.0, 1.0],
            max_burst_groups: 10,
            damping: 0.5,
            depth_epsilon: 1.0e-4,
            spawn_offset: 0.1,
            gravity: 9.81,
        }
    }
}

impl ParticleConfig {
    /// Load and validate a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Serialize to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.group_size == 0 {
            return Err(ConfigError::ZeroGroupSize);
        }
        if self.group_size > MAX_GROUP_SIZE {
            return Err(ConfigError::GroupSizeTooLarge {
                group_size: self.group_size,
                max: MAX_GROUP_SIZE,
            });
        }
        let bytes = self.capacity as u64 * Particle::SIZE as u64;
        if bytes > MAX_POOL_BYTES {
            return Err(ConfigError::PoolTooLarge {
                capacity: self.capacity,
                bytes,
                max: MAX_POOL_BYTES,
            });
        }
        if self.capacity % self.group_size != 0 {
            return Err(ConfigError::CapacityNotGroupAligned {
                capacity: self.capacity,
                group_size: self.group_size,
            });
        }
        if !(1..=MAX_BURST_GROUPS).contains(&self.max_burst_groups) {
            return Err(ConfigError::BurstOutOfRange(self.max_burst_groups));
        }

        check_range("damping", self.damping, 0.0..=1.0, "0..=1")?;
        check_range("lifetime", self.lifetime, f32::MIN_POSITIVE..=f32::MAX, "> 0")?;
        check_range("scale", self.scale, f32::MIN_POSITIVE..=f32::MAX, "> 0")?;
        check_range("depth_epsilon", self.depth_epsilon, 0.0..=1.0, "0..=1")?;
        check_range("spawn_offset", self.spawn_offset, 0.0..=f32::MAX, ">= 0")?;
        check_range("gravity", self.gravity, f32::MIN..=f32::MAX, "finite")?;
        Ok(())
    }

    /// Number of work-groups needed to cover every slot
    pub fn pool_groups(&self) -> u32 {
        self.capacity / self.group_size
    }

    /// Largest number of particles a single trigger may request
    pub fn max_burst(&self) -> u32 {
        self.max_burst_groups.saturating_mul(self.group_size)
    }

    /// Angular velocity maxima converted to radians per second
    pub fn angular_velocity_radians(&self) -> Vec3 {
        Vec3::from(self.angular_velocity) * std::f32::consts::PI / 180.0
    }

    /// Gravity as an acceleration vector
    pub fn gravity_vector(&self) -> Vec3 {
        Vec3::new(0.0, -self.gravity, 0.0)
    }
}

impl FromStr for ParticleConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: ParticleConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

fn check_range(
    name: &'static str,
    value: f32,
    range: std::ops::RangeInclusive<f32>,
    expected: &'static str,
) -> Result<()> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            expected,
        })
    }
}
