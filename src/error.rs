//! Startup and host errors. Nothing inside a frame is fallible.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    #[error("frame buffers need {required} bytes per storage binding, the adapter allows {limit}")]
    BufferTooLarge { required: u64, limit: u64 },

    #[error("the surface supports no texture formats for this adapter")]
    IncompatibleSurface,

    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("buffer mapping was abandoned before completing")]
    MapAbandoned,

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this machine can't run the renderer at all, as opposed to a
    /// misconfiguration or a runtime failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::NoAdapter | Error::DeviceCreation(_) | Error::BufferTooLarge { .. }
        )
    }
}
