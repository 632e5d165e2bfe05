//! Offscreen HDR render target
//!
//! Frames are drawn into this image and then blitted onto the acquired
//! swapchain image, so the draw format is independent of the surface.

use ash::vk;
use vk_mem::Alloc;

use crate::render::vulkan::destroyer::VulkanDestructionQueue;
use crate::render::vulkan::registry::Destroyable;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Format of the draw image
pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Copy source and destination, compute storage and color attachment
pub const DRAW_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

/// Allocated draw image and its view
#[derive(Debug, Clone, Copy)]
pub struct DrawImage {
    /// Image handle
    pub image: vk::Image,
    /// Whole-image color view
    pub view: vk::ImageView,
    /// Always [`DRAW_FORMAT`]
    pub format: vk::Format,
    /// Image size
    pub extent: vk::Extent3D,
}

impl DrawImage {
    /// Allocate device-local image memory through the queue's allocator
    ///
    /// Registers the image and then its view.
    pub fn new(device: &ash::Device, extent: vk::Extent2D, queue: &mut VulkanDestructionQueue) -> VulkanResult<Self> {
        let extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        };
        let image_info = image_create_info(DRAW_FORMAT, DRAW_USAGE, extent);
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };

        let (image, allocation) = {
            let allocator = queue.allocator().ok_or_else(|| VulkanError::InvalidOperation {
                reason: "draw image requested before the allocator exists".to_string(),
            })?;
            unsafe {
                allocator.create_image(&image_info, &alloc_info)
                    .map_err(VulkanError::call("vmaCreateImage"))?
            }
        };
        queue.push(Destroyable::Image { image, allocation });

        let view_info = image_view_create_info(DRAW_FORMAT, image, vk::ImageAspectFlags::COLOR);
        let view = unsafe {
            device.create_image_view(&view_info, None)
                .map_err(VulkanError::call("vkCreateImageView"))?
        };
        queue.push(Destroyable::ImageView(view));

        Ok(Self {
            image,
            view,
            format: DRAW_FORMAT,
            extent,
        })
    }

    /// Size as a 2D extent
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }
}

/// Single-mip, single-layer, optimally tiled 2D image
pub fn image_create_info(format: vk::Format, usage: vk::ImageUsageFlags, extent: vk::Extent3D) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .build()
}

/// 2D view of the first mip and layer
pub fn image_view_create_info(format: vk::Format, image: vk::Image, aspect_mask: vk::ImageAspectFlags) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_draw_image_info() {
        let info = image_create_info(DRAW_FORMAT, DRAW_USAGE, vk::Extent3D { width: 800, height: 600, depth: 1 });

        assert_eq!(info.format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!((info.mip_levels, info.array_layers), (1, 1));
        assert_eq!((info.extent.width, info.extent.height, info.extent.depth), (800, 600, 1));
        for usage in [
            vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageUsageFlags::STORAGE,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        ] {
            assert!(info.usage.contains(usage), "missing {usage:?}");
        }
    }

    #[test]
    fn test_view_info_targets_image() {
        let image = vk::Image::from_raw(9);
        let info = image_view_create_info(DRAW_FORMAT, image, vk::ImageAspectFlags::COLOR);

        assert_eq!(info.image, image);
        assert_eq!(info.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(info.subresource_range.level_count, 1);
    }
}
