// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash; the renderer module drives them.

pub mod commands;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use pipeline::Pipeline;
pub use surface::WindowSurface;
pub use swapchain::Swapchain;
