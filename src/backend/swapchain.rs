// Swapchain - Window presentation
//
// Manages the ring of images we render to and present to the screen.
// Rebuilt as a unit whenever the surface goes stale; the selection logic is
// kept in free functions so it can be tested without a device.

use crate::error::{RenderError, Result};
use ash::vk;
use super::surface::WindowSurface;
use super::VulkanDevice;

pub struct Swapchain {
    pub raw: vk::SwapchainKHR,
    pub loader: ash::extensions::khr::Swapchain,
    /// Owned by the swapchain itself, never destroyed individually.
    pub images: Vec<vk::Image>,
    /// Owned by this state; destroyed before the swapchain handle.
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Build a swapchain sized to the current drawable extent.
    ///
    /// `old` is passed to the driver as the old-swapchain hint so it can
    /// recycle resources; the caller destroys the old state only after this
    /// returns successfully.
    pub fn new(
        device: &VulkanDevice,
        surface: &WindowSurface,
        drawable_extent: (u32, u32),
        preferred_present_mode: vk::PresentModeKHR,
        old: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let capabilities = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(device.physical_device, surface.raw)
        }?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device.physical_device, surface.raw)
        }?;
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(device.physical_device, surface.raw)
        }?;

        if present_modes.is_empty() {
            return Err(RenderError::SurfaceUnsupported);
        }

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        let extent = choose_extent(&capabilities, drawable_extent.0, drawable_extent.1);
        let image_count = choose_image_count(&capabilities);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            image_count
        );

        let loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        // Concurrent sharing avoids ownership-transfer barriers when the
        // graphics and present families differ.
        let family_indices = [
            device.queue_families.graphics,
            device.queue_families.present,
        ];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.raw)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.unwrap_or_default());

        create_info = if device.queue_families.are_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let raw = unsafe { loader.create_swapchain(&create_info, None) }?;
        let images = unsafe { loader.get_swapchain_images(raw) }?;

        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                let view = unsafe { device.device.create_image_view(&create_info, None) }?;
                Ok(view)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw,
            loader,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Acquire the next presentable image, signaling `semaphore` when the
    /// image is actually available. Raw driver status; the frame loop
    /// classifies it.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> ash::prelude::VkResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.raw, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    /// Present `image_index` on `queue` after `wait` signals.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> ash::prelude::VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.raw];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    /// Teardown: image views first, then the swapchain handle.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
    }
}

/// Prefer 8-bit BGRA with sRGB nonlinear color space; otherwise take the
/// surface's first reported format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .ok_or(RenderError::SurfaceUnsupported)
}

/// Use the preferred mode if the surface offers it, otherwise FIFO (the only
/// mode guaranteed to exist).
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A defined current extent is used verbatim; otherwise the drawable size is
/// clamped component-wise into the surface's bounds.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One above the minimum, clamped by the maximum when one is advertised
/// (0 means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        min_images: u32,
        max_images: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: min_images,
            max_image_count: max_images,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb_when_offered() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn empty_format_list_is_unsupported() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RenderError::SurfaceUnsupported)
        ));
    }

    #[test]
    fn preferred_present_mode_wins_when_offered() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_only_surface_gets_fifo() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn defined_current_extent_is_used_verbatim() {
        let caps = caps((800, 600), (1, 1), (4096, 4096), 2, 0);
        let extent = choose_extent(&caps, 1234, 5678);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn undefined_extent_clamps_drawable_size() {
        let caps = caps((u32::MAX, u32::MAX), (200, 100), (1920, 1080), 2, 0);

        let too_big = choose_extent(&caps, 10_000, 10_000);
        assert_eq!(too_big.width, 1920);
        assert_eq!(too_big.height, 1080);

        let too_small = choose_extent(&caps, 1, 1);
        assert_eq!(too_small.width, 200);
        assert_eq!(too_small.height, 100);

        let in_range = choose_extent(&caps, 800, 600);
        assert_eq!(in_range.width, 800);
        assert_eq!(in_range.height, 600);
    }

    #[test]
    fn unbounded_max_image_count_requests_min_plus_one() {
        let caps = caps((800, 600), (1, 1), (4096, 4096), 2, 0);
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn bounded_max_image_count_clamps() {
        let tight = caps((800, 600), (1, 1), (4096, 4096), 2, 2);
        assert_eq!(choose_image_count(&tight), 2);

        let roomy = caps((800, 600), (1, 1), (4096, 4096), 2, 8);
        assert_eq!(choose_image_count(&roomy), 3);
    }
}
