//! Error types for ricochet_core

use thiserror::Error;

/// Errors raised while loading or validating a [`ParticleConfig`](crate::ParticleConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Pool capacity must be non-zero
    #[error("pool capacity must be greater than zero")]
    ZeroCapacity,

    /// Work-group size must be non-zero
    #[error("group size must be greater than zero")]
    ZeroGroupSize,

    /// Pool capacity must be a whole number of work-groups
    #[error("pool capacity {capacity} is not a multiple of group size {group_size}")]
    CapacityNotGroupAligned { capacity: u32, group_size: u32 },

    /// Work-group size above what a compute device guarantees
    #[error("group size {group_size} exceeds the device limit of {max}")]
    GroupSizeTooLarge { group_size: u32, max: u32 },

    /// Particle records would not fit a single storage binding
    #[error("pool of {capacity} particles needs {bytes} bytes, more than the {max} a storage binding allows")]
    PoolTooLarge { capacity: u32, bytes: u64, max: u64 },

    /// Per-trigger burst bound outside 1..=100 groups
    #[error("max burst groups {0} is outside 1..=100")]
    BurstOutOfRange(u32),

    /// A scalar parameter is outside its valid range
    #[error("{name} = {value} is out of range ({expected})")]
    OutOfRange {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while combining particle geometry
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MeshError {
    /// The source mesh has no vertices or no indices
    #[error("particle mesh is empty")]
    Empty,

    /// One copy alone exceeds the 16-bit index range
    #[error("particle mesh has {vertices} vertices, more than the {max} a combined mesh can hold")]
    TooManyVertices { vertices: usize, max: u32 },

    /// An index points past the vertex list
    #[error("index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u16, vertices: usize },
}
