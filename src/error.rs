// Error taxonomy for the renderer
//
// Everything here is fatal: swapchain staleness (out-of-date, suboptimal,
// zero-extent window) is not an error and never reaches this type. It is
// absorbed by the frame loop's rebuild path.

use ash::vk;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    /// No usable instance, GPU, or queue-family configuration at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The surface reports zero supported formats or present modes.
    #[error("surface reports no supported formats or present modes")]
    SurfaceUnsupported,

    /// A compiled shader binary could not be read.
    #[error("failed to load shader `{name}`: {source}")]
    ShaderLoad {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The driver rejected creation of an object. Non-retryable.
    #[error("resource creation failed: {0}")]
    ResourceCreation(#[from] vk::Result),

    /// The driver rejected the graphics pipeline specifically.
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(vk::Result),

    /// The device was lost. Requires full context recreation.
    #[error("device lost")]
    DeviceLost,
}

impl RenderError {
    /// Map a raw driver status from the frame loop's hot path.
    /// DEVICE_LOST gets its own variant; everything else is a creation-class
    /// failure.
    pub fn from_vk(err: vk::Result) -> Self {
        match err {
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
            other => RenderError::ResourceCreation(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lost_gets_its_own_variant() {
        assert!(matches!(
            RenderError::from_vk(vk::Result::ERROR_DEVICE_LOST),
            RenderError::DeviceLost
        ));
    }

    #[test]
    fn other_statuses_are_resource_creation() {
        assert!(matches!(
            RenderError::from_vk(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            RenderError::ResourceCreation(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }
}
