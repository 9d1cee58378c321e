//! Error types for ricochet_gpu

use ricochet_core::{ConfigError, MeshError};
use thiserror::Error;

/// Errors raised by GPU setup and readback
#[derive(Error, Debug)]
pub enum GpuError {
    /// No adapter matched the request
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    /// Device request failed
    #[error("failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    /// Surface creation failed
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    /// Mapping a readback buffer failed
    #[error("failed to map buffer: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// The map callback never reported back
    #[error("buffer map callback was dropped")]
    ReadbackLost,

    /// The operation needs an initialized pool
    #[error("particle pool is not initialized")]
    NotInitialized,

    /// Session config failed validation
    #[error("invalid particle config: {0}")]
    Config(#[from] ConfigError),

    /// Particle mesh could not be combined
    #[error("invalid particle mesh: {0}")]
    Mesh(#[from] MeshError),
}

/// Result type for GPU operations
pub type Result<T> = std::result::Result<T, GpuError>;
