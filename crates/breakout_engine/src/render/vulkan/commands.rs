//! Command buffer management
//!
//! Pools and buffers are plain handles (pools are registered for
//! destruction by their creator); [`CommandRecorder`] wraps the recording
//! calls a frame uses, all on the synchronization2 entry points.

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Create a command pool whose buffers can be reset individually
pub fn create_command_pool(device: &ash::Device, queue_family_index: u32) -> VulkanResult<vk::CommandPool> {
    let pool_create_info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family_index);

    unsafe {
        device.create_command_pool(&pool_create_info, None)
            .map_err(VulkanError::call("vkCreateCommandPool"))
    }
}

/// Allocate `count` primary command buffers from `pool`
pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> VulkanResult<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe {
        device.allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::call("vkAllocateCommandBuffers"))
    }
}

/// Full-resource barrier moving `image` from `old_layout` to `new_layout`
///
/// Uses all-commands stages and memory access masks: correct for any
/// transition, not the tightest.
pub fn image_barrier(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> vk::ImageMemoryBarrier2 {
    let aspect_mask = if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(subresource_range(aspect_mask))
        .image(image)
        .build()
}

/// Whole-image subresource range for `aspect_mask`
pub fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

/// Linear-filtered blit region scaling all of `src_size` onto all of `dst_size`
pub fn blit_region(src_size: vk::Extent2D, dst_size: vk::Extent2D) -> vk::ImageBlit2 {
    let layer = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };

    vk::ImageBlit2::builder()
        .src_offsets([vk::Offset3D::default(), far_corner(src_size)])
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_size)])
        .src_subresource(layer)
        .dst_subresource(layer)
        .build()
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(extent.width).unwrap_or(i32::MAX),
        y: i32::try_from(extent.height).unwrap_or(i32::MAX),
        z: 1,
    }
}

/// Records one command buffer between `begin` and `end`
pub struct CommandRecorder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl<'a> CommandRecorder<'a> {
    /// Create a new command recorder
    pub fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            recording: false,
        }
    }

    /// Begin one-time-submit recording
    pub fn begin(&mut self) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::call("vkBeginCommandBuffer"))?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Move `image` between layouts
    pub fn transition_image(&mut self, image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) {
        let barriers = [image_barrier(image, old_layout, new_layout)];
        let dependency = vk::DependencyInfo::builder().image_memory_barriers(&barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.command_buffer, &dependency);
        }
    }

    /// Fill a color image in `GENERAL` layout with `color`
    pub fn clear_color_image(&mut self, image: vk::Image, color: [f32; 4]) {
        let clear = vk::ClearColorValue { float32: color };
        let range = subresource_range(vk::ImageAspectFlags::COLOR);
        unsafe {
            self.device.cmd_clear_color_image(
                self.command_buffer,
                image,
                vk::ImageLayout::GENERAL,
                &clear,
                std::slice::from_ref(&range),
            );
        }
    }

    /// Blit `src` (in `TRANSFER_SRC_OPTIMAL`) onto `dst` (in `TRANSFER_DST_OPTIMAL`)
    pub fn copy_image_to_image(
        &mut self,
        src: vk::Image,
        dst: vk::Image,
        src_size: vk::Extent2D,
        dst_size: vk::Extent2D,
    ) {
        let regions = [blit_region(src_size, dst_size)];
        let blit_info = vk::BlitImageInfo2::builder()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);
        unsafe {
            self.device.cmd_blit_image2(self.command_buffer, &blit_info);
        }
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::call("vkEndCommandBuffer"))?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_color_barrier_covers_whole_image() {
        let image = vk::Image::from_raw(42);
        let barrier = image_barrier(image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);

        assert_eq!(barrier.image, image);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.subresource_range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(barrier.subresource_range.layer_count, vk::REMAINING_ARRAY_LAYERS);
        assert!(barrier.dst_access_mask.contains(vk::AccessFlags2::MEMORY_READ));
    }

    #[test]
    fn test_depth_target_barrier_uses_depth_aspect() {
        let barrier = image_barrier(
            vk::Image::from_raw(1),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_blit_region_spans_both_extents() {
        let region = blit_region(
            vk::Extent2D { width: 800, height: 600 },
            vk::Extent2D { width: 1600, height: 1200 },
        );

        assert_eq!((region.src_offsets[1].x, region.src_offsets[1].y, region.src_offsets[1].z), (800, 600, 1));
        assert_eq!((region.dst_offsets[1].x, region.dst_offsets[1].y, region.dst_offsets[1].z), (1600, 1200, 1));
        assert_eq!(region.src_offsets[0].x, 0);
        assert_eq!(region.dst_subresource.layer_count, 1);
    }
}
