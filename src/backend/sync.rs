// Synchronization primitives
//
// Semaphores order GPU queue operations; fences are the only thing the
// control thread ever blocks on.

use crate::error::Result;
use ash::vk;
use super::VulkanDevice;

/// Frame synchronization - one per frame in flight.
///
/// These are swapchain-size-independent: an ordinary swapchain rebuild never
/// touches them.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Created signaled so the first wait on each slot passes immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: device.device.create_fence(&fence_info, None)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Maps swapchain image index -> the in-flight fence of whichever slot last
/// rendered into that image (null when unused).
///
/// Needed because the swapchain can hold more images than there are frames
/// in flight, so image reuse and slot reuse run at different cadences.
pub struct ImageFenceTable {
    fences: Vec<vk::Fence>,
}

impl ImageFenceTable {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Resize to a rebuilt swapchain's image count, clearing every entry.
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, vk::Fence::null());
    }

    /// The fence still guarding this image, if any.
    pub fn in_use(&self, image_index: usize) -> Option<vk::Fence> {
        let fence = self.fences[image_index];
        if fence == vk::Fence::null() {
            None
        } else {
            Some(fence)
        }
    }

    /// Record that `fence`'s slot now owns this image.
    pub fn assign(&mut self, image_index: usize, fence: vk::Fence) {
        self.fences[image_index] = fence;
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn fresh_table_has_no_guarded_images() {
        let table = ImageFenceTable::new(3);
        assert_eq!(table.len(), 3);
        for index in 0..3 {
            assert!(table.in_use(index).is_none());
        }
    }

    #[test]
    fn assigned_fence_is_reported_until_overwritten() {
        let mut table = ImageFenceTable::new(3);
        table.assign(1, fence(0xA));
        assert_eq!(table.in_use(1), Some(fence(0xA)));
        assert!(table.in_use(0).is_none());

        table.assign(1, fence(0xB));
        assert_eq!(table.in_use(1), Some(fence(0xB)));
    }

    // Two slots, three images: image 0 is revisited on frame 3 while slot 0's
    // fence from frame 0 still guards it, and must be reported for waiting.
    #[test]
    fn image_reuse_across_slots_reports_previous_fence() {
        let slot_fences = [fence(0xA), fence(0xB)];
        let mut table = ImageFenceTable::new(3);

        for (frame, image_index) in [(0usize, 0usize), (1, 1), (2, 2), (3, 0)] {
            let slot = frame % slot_fences.len();
            if frame == 3 {
                assert_eq!(table.in_use(image_index), Some(fence(0xA)));
            }
            table.assign(image_index, slot_fences[slot]);
        }
    }

    #[test]
    fn reset_clears_and_resizes() {
        let mut table = ImageFenceTable::new(2);
        table.assign(0, fence(0xA));
        table.assign(1, fence(0xB));

        table.reset(4);
        assert_eq!(table.len(), 4);
        for index in 0..4 {
            assert!(table.in_use(index).is_none());
        }
    }
}
