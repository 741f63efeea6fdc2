//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant is fatal for the frame loop. Stale-surface conditions are not
/// errors; they are reported through [`crate::swapchain::AcquireOutcome`] and
/// [`crate::swapchain::PresentOutcome`].
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A write or span fell outside the memory it targets
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// An arena span was used after its frame generation ended
    #[error("Stale arena span: generation {span}, current {current}")]
    StaleSpan {
        /// Generation recorded in the span.
        span: u64,
        /// Generation of the slot at the time of use.
        current: u64,
    },

    /// Frame operations were called out of order
    #[error("Frame order violated: {0}")]
    FrameOrder(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
