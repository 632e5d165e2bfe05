//! [`FrameGpu`] over a real device
//!
//! A frame clears the draw image to a color that pulses with the frame
//! counter and blits it onto the acquired swapchain image.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::prelude::VkResult;
use ash::vk;

use crate::render::frame::{FrameGpu, FrameSubmission};
use crate::render::vulkan::commands::CommandRecorder;
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::draw_image::DrawImage;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Per-channel pulse periods (red, green, blue); a pulse lasts `period * pi` frames
const FLASH_PERIODS: [f64; 3] = [30.0, 60.0, 120.0];

/// Clear color for `frame_number`: each channel pulses between 0 and 1,
/// red fastest and blue slowest
pub fn flash_color(frame_number: u64) -> [f32; 4] {
    let pulse = |period: f64| (frame_number as f64 / period).sin().abs() as f32;
    let [r, g, b] = FLASH_PERIODS.map(pulse);
    [r, g, b, 1.0]
}

/// Device, queue and targets one frame touches
pub struct VulkanFrameGpu {
    device: ash::Device,
    swapchain_loader: SwapchainLoader,
    graphics_queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_extent: vk::Extent2D,
    draw_image: DrawImage,
}

impl VulkanFrameGpu {
    /// Capture the handles a frame needs
    pub fn new(context: &VulkanContext, swapchain: &Swapchain, draw_image: DrawImage) -> Self {
        Self {
            device: context.device.device.clone(),
            swapchain_loader: context.device.swapchain_loader.clone(),
            graphics_queue: context.graphics_queue,
            swapchain: swapchain.handle,
            swapchain_images: swapchain.images.clone(),
            swapchain_extent: swapchain.extent,
            draw_image,
        }
    }
}

impl FrameGpu for VulkanFrameGpu {
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(&mut self, semaphore: vk::Semaphore, timeout_ns: u64) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        }
    }

    fn reset_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
    }

    fn record_frame(&mut self, command_buffer: vk::CommandBuffer, image_index: u32, frame_number: u64) -> VulkanResult<()> {
        let target = *self
            .swapchain_images
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("acquired image {image_index} is not in the swapchain"),
            })?;
        let draw = self.draw_image.image;

        let mut recorder = CommandRecorder::new(&self.device, command_buffer);
        recorder.begin()?;

        recorder.transition_image(draw, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        recorder.clear_color_image(draw, flash_color(frame_number));
        recorder.transition_image(draw, vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        recorder.transition_image(target, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        recorder.copy_image_to_image(draw, target, self.draw_image.extent_2d(), self.swapchain_extent);
        recorder.transition_image(target, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR);

        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, submission: &FrameSubmission) -> VkResult<()> {
        let command_buffers = [vk::CommandBufferSubmitInfo::builder()
            .command_buffer(submission.command_buffer)
            .build()];
        let waits = [vk::SemaphoreSubmitInfo::builder()
            .semaphore(submission.wait_semaphore)
            .stage_mask(submission.wait_stage)
            .value(1)
            .build()];
        let signals = [vk::SemaphoreSubmitInfo::builder()
            .semaphore(submission.signal_semaphore)
            .stage_mask(submission.signal_stage)
            .value(1)
            .build()];
        let submit = vk::SubmitInfo2::builder()
            .wait_semaphore_infos(&waits)
            .signal_semaphore_infos(&signals)
            .command_buffer_infos(&command_buffers)
            .build();

        unsafe {
            self.device
                .queue_submit2(self.graphics_queue, std::slice::from_ref(&submit), submission.fence)
        }
    }

    fn present(&mut self, image_index: u32, wait_semaphore: vk::Semaphore) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let waits = [wait_semaphore];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .wait_semaphores(&waits)
            .image_indices(&indices);

        unsafe { self.swapchain_loader.queue_present(self.graphics_queue, &present_info) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_starts_dark_and_stays_in_range() {
        assert_eq!(flash_color(0), [0.0, 0.0, 0.0, 1.0]);
        for frame in (0..2000).step_by(7) {
            let color = flash_color(frame);
            assert_eq!(color[3], 1.0);
            for channel in &color[..3] {
                assert!((0.0..=1.0).contains(channel), "frame {frame}: {color:?}");
            }
        }
    }

    #[test]
    fn test_each_channel_peaks_at_its_own_period() {
        for (channel, period) in FLASH_PERIODS.iter().enumerate() {
            let peak = (period * std::f64::consts::FRAC_PI_2).round() as u64;
            assert!(flash_color(peak)[channel] > 0.99, "channel {channel} at frame {peak}");
        }
    }

    #[test]
    fn test_red_pulses_faster_than_blue() {
        // Red has already gone through a full pulse when blue is still rising.
        let frame = (30.0 * std::f64::consts::PI).round() as u64;
        let [r, _, b, _] = flash_color(frame);
        assert!(r < 0.05, "red {r}");
        assert!(b > 0.6, "blue {b}");
    }
}
