// Command recording
//
// One pre-recorded primary command buffer per swapchain image. The content
// is static between rebuilds, so buffers are recorded once and resubmitted
// every frame.

use crate::error::Result;
use ash::vk;
use super::{Pipeline, Swapchain, VulkanDevice};

pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    let pool_info =
        vk::CommandPoolCreateInfo::builder().queue_family_index(device.queue_families.graphics);

    let pool = unsafe { device.device.create_command_pool(&pool_info, None) }?;
    Ok(pool)
}

/// Record one command buffer per framebuffer: begin the render pass over the
/// full extent, bind the pipeline, draw the 3 generated vertices, end.
pub fn record_command_buffers(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    pipeline: &Pipeline,
    swapchain: &Swapchain,
    clear_color: [f32; 4],
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(pipeline.framebuffers.len() as u32);

    let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }];

    for (&cmd, &framebuffer) in command_buffers.iter().zip(&pipeline.framebuffers) {
        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device.device.begin_command_buffer(cmd, &begin_info)?;

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(pipeline.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: swapchain.extent,
                })
                .clear_values(&clear_values);

            device
                .device
                .cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            device.device.cmd_draw(cmd, 3, 1, 0, 0);
            device.device.cmd_end_render_pass(cmd);

            device.device.end_command_buffer(cmd)?;
        }
    }

    log::info!("Recorded {} command buffers", command_buffers.len());

    Ok(command_buffers)
}

pub fn free_command_buffers(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    command_buffers: &[vk::CommandBuffer],
) {
    if !command_buffers.is_empty() {
        unsafe {
            device.device.free_command_buffers(pool, command_buffers);
        }
    }
}
