// Frame synchronizer - the render loop driver
//
// Owns the rebuildable unit (swapchain, pipeline, command buffers) plus the
// per-slot sync objects that outlive it. Every frame follows the same
// protocol: wait on the slot's fence, settle any pending rebuild, acquire,
// guard the image against cross-slot reuse, submit, present, advance.
//
// Staleness (out-of-date, suboptimal, zero-extent window) is absorbed here
// through the rebuild path and never reaches the caller; everything else is
// fatal and terminates the loop.

use crate::backend::{commands, Pipeline, Swapchain, VulkanDevice, WindowSurface};
use crate::backend::sync::{FrameSync, ImageFenceTable};
use crate::config::Config;
use crate::error::{RenderError, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

/// Fence waits are effectively unbounded; hitting this means the GPU hung.
const FENCE_WAIT_NS: u64 = u64::MAX;

/// Outcome of an image acquisition, classified from the raw driver status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireOutcome {
    Ready { image_index: u32, suboptimal: bool },
    /// Swapchain no longer matches the surface; rebuild and retry.
    Stale,
}

/// Outcome of a presentation, classified from the raw driver status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PresentOutcome {
    Presented { suboptimal: bool },
    /// The frame was still submitted and must not be discarded; the
    /// swapchain just needs a rebuild before the next one.
    Stale,
}

enum RebuildOutcome {
    Rebuilt,
    /// The window currently has a zero-sized drawable; nothing was torn
    /// down, retry next iteration.
    Deferred,
}

fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
        Err(err) => Err(RenderError::from_vk(err)),
    }
}

fn classify_present(result: VkResult<bool>) -> Result<PresentOutcome> {
    match result {
        Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
        Err(err) => Err(RenderError::from_vk(err)),
    }
}

/// A zero drawable dimension means the window is minimized or mid-resize;
/// rebuilding against it would fail, so the rebuild is deferred.
fn extent_is_renderable(width: u32, height: u32) -> bool {
    width > 0 && height > 0
}

pub struct Renderer {
    window: Arc<Window>,
    device: Arc<VulkanDevice>,
    surface: WindowSurface,
    command_pool: vk::CommandPool,

    // Rebuildable unit: always replaced together, never partially
    swapchain: Option<Swapchain>,
    pipeline: Option<Pipeline>,
    command_buffers: Vec<vk::CommandBuffer>,

    // Persistent across rebuilds
    frame_sync: Vec<FrameSync>,
    image_fences: ImageFenceTable,
    frame_counter: usize,
    needs_rebuild: bool,

    preferred_present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let (device, surface) =
            VulkanDevice::new(&config.window.title, &window, enable_validation)?;

        let command_pool = commands::create_command_pool(&device)?;

        let preferred_present_mode = config.preferred_present_mode();
        let clear_color = config.graphics.clear_color;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            &device,
            &surface,
            (size.width, size.height),
            preferred_present_mode,
            None,
        )?;
        let pipeline = Pipeline::new(&device, &swapchain)?;
        let command_buffers = commands::record_command_buffers(
            &device,
            command_pool,
            &pipeline,
            &swapchain,
            clear_color,
        )?;

        debug_assert_eq!(pipeline.framebuffers.len(), swapchain.image_views.len());
        debug_assert_eq!(command_buffers.len(), swapchain.images.len());

        let frame_sync = (0..config.graphics.max_frames_in_flight)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;

        let image_fences = ImageFenceTable::new(swapchain.images.len());

        log::info!(
            "Renderer ready: {} frames in flight, {} swapchain images",
            frame_sync.len(),
            swapchain.images.len()
        );

        Ok(Self {
            window,
            device,
            surface,
            command_pool,
            swapchain: Some(swapchain),
            pipeline: Some(pipeline),
            command_buffers,
            frame_sync,
            image_fences,
            frame_counter: 0,
            needs_rebuild: false,
            preferred_present_mode,
            clear_color,
        })
    }

    /// Resize notification from the window system. The actual rebuild
    /// happens at the top of the next frame; redundant requests collapse
    /// into the single flag.
    pub fn note_resized(&mut self) {
        self.needs_rebuild = true;
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    /// Drive one frame. Returns `Ok(true)` when a frame was submitted and
    /// presented, `Ok(false)` when the frame was skipped (rebuild pending or
    /// deferred) and should simply be retried. The frame counter advances
    /// only on a fully completed frame.
    pub fn render_frame(&mut self) -> Result<bool> {
        let slot = self.frame_counter % self.frame_sync.len();

        // Step 1: wait until whatever last used this slot has retired, so
        // its command buffer and semaphores are safe to reuse
        let in_flight = self.frame_sync[slot].in_flight_fence;
        unsafe {
            self.device
                .device
                .wait_for_fences(&[in_flight], true, FENCE_WAIT_NS)
        }
        .map_err(RenderError::from_vk)?;

        // Step 2: settle a pending rebuild before touching the swapchain
        if self.needs_rebuild {
            if let RebuildOutcome::Deferred = self.rebuild()? {
                return Ok(false);
            }
        }

        let image_available = self.frame_sync[slot].image_available;
        let render_finished = self.frame_sync[slot].render_finished;

        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(false);
        };

        // Step 3: acquire the next presentable image
        let (image_index, acquire_suboptimal) =
            match classify_acquire(swapchain.acquire(image_available))? {
                AcquireOutcome::Ready {
                    image_index,
                    suboptimal,
                } => (image_index, suboptimal),
                AcquireOutcome::Stale => {
                    // Nothing was submitted; rebuild and retry this frame
                    self.needs_rebuild = true;
                    return Ok(false);
                }
            };

        if acquire_suboptimal {
            self.needs_rebuild = true;
        }

        // Step 4: the swapchain can hold more images than there are slots,
        // so this image may still be owned by another slot's submission
        if let Some(guard) = self.image_fences.in_use(image_index as usize) {
            unsafe {
                self.device
                    .device
                    .wait_for_fences(&[guard], true, FENCE_WAIT_NS)
            }
            .map_err(RenderError::from_vk)?;
        }
        self.image_fences.assign(image_index as usize, in_flight);

        // The fence is reset only once this frame is committed to submitting
        unsafe { self.device.device.reset_fences(&[in_flight]) }
            .map_err(RenderError::from_vk)?;

        // Step 5: submit, waiting on image-available at the color-attachment
        // stage, then present once render-finished signals
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit_command_buffers = [self.command_buffers[image_index as usize]];
        let signal_semaphores = [render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&submit_command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                in_flight,
            )
        }
        .map_err(RenderError::from_vk)?;

        match classify_present(swapchain.present(
            self.device.present_queue,
            image_index,
            render_finished,
        ))? {
            PresentOutcome::Presented { suboptimal: false } => {}
            PresentOutcome::Presented { suboptimal: true } | PresentOutcome::Stale => {
                self.needs_rebuild = true;
            }
        }

        // Step 7: the frame fully completed; only now advance
        self.frame_counter = self.frame_counter.wrapping_add(1);

        Ok(true)
    }

    /// Tear down and reconstruct everything that depends on the swapchain.
    ///
    /// Order is load-bearing: drain the device, then command buffers, then
    /// framebuffers/pipeline/render pass, then image views, and the old
    /// swapchain handle last - it survives just long enough to seed the new
    /// one as the driver's reuse hint. Sync slots are untouched.
    fn rebuild(&mut self) -> Result<RebuildOutcome> {
        let size = self.window.inner_size();
        if !extent_is_renderable(size.width, size.height) {
            return Ok(RebuildOutcome::Deferred);
        }

        log::info!("Rebuilding swapchain: {}x{}", size.width, size.height);

        self.device.wait_idle()?;

        commands::free_command_buffers(&self.device, self.command_pool, &self.command_buffers);
        self.command_buffers.clear();

        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(&self.device.device);
        }

        let old = self.swapchain.take();
        let built = Swapchain::new(
            &self.device,
            &self.surface,
            (size.width, size.height),
            self.preferred_present_mode,
            old.as_ref().map(|s| s.raw),
        );
        // Old views and handle go only after the replacement is live (or
        // construction failed and the loop is about to terminate anyway)
        if let Some(old) = old {
            old.destroy(&self.device.device);
        }
        let swapchain = built?;

        let pipeline = Pipeline::new(&self.device, &swapchain)?;
        let command_buffers = commands::record_command_buffers(
            &self.device,
            self.command_pool,
            &pipeline,
            &swapchain,
            self.clear_color,
        )?;

        debug_assert_eq!(pipeline.framebuffers.len(), swapchain.image_views.len());
        debug_assert_eq!(command_buffers.len(), swapchain.images.len());

        self.image_fences.reset(swapchain.images.len());
        self.swapchain = Some(swapchain);
        self.pipeline = Some(pipeline);
        self.command_buffers = command_buffers;
        self.needs_rebuild = false;

        Ok(RebuildOutcome::Rebuilt)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");

        let _ = self.device.wait_idle();

        commands::free_command_buffers(&self.device, self.command_pool, &self.command_buffers);
        self.command_buffers.clear();

        for sync in &self.frame_sync {
            sync.destroy(&self.device.device);
        }

        unsafe {
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }

        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(&self.device.device);
        }
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&self.device.device);
        }

        // Surface goes before the instance, which the device Arc still holds
        self.surface.destroy();

        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_acquire_passes_through_index_and_flag() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: true
            }
        );
    }

    #[test]
    fn out_of_date_acquire_is_stale_not_an_error() {
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::Stale
        );
    }

    #[test]
    fn device_lost_on_acquire_is_fatal() {
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RenderError::DeviceLost)
        ));
    }

    #[test]
    fn other_acquire_failures_are_fatal() {
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)),
            Err(RenderError::ResourceCreation(
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            ))
        ));
    }

    #[test]
    fn present_outcomes_keep_the_frame() {
        assert_eq!(
            classify_present(Ok(false)).unwrap(),
            PresentOutcome::Presented { suboptimal: false }
        );
        assert_eq!(
            classify_present(Ok(true)).unwrap(),
            PresentOutcome::Presented { suboptimal: true }
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Stale
        );
    }

    #[test]
    fn device_lost_on_present_is_fatal() {
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RenderError::DeviceLost)
        ));
    }

    #[test]
    fn zero_extent_defers_rebuild() {
        assert!(!extent_is_renderable(0, 600));
        assert!(!extent_is_renderable(800, 0));
        assert!(!extent_is_renderable(0, 0));
        assert!(extent_is_renderable(800, 600));
        assert!(extent_is_renderable(1, 1));
    }
}
