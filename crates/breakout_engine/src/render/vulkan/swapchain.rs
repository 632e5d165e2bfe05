//! Vulkan swapchain creation
//!
//! The swapchain is a blit target: images are never rendered to directly,
//! the draw image is copied into them every frame.

use ash::vk;

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::destroyer::VulkanDestructionQueue;
use crate::render::vulkan::registry::Destroyable;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Preferred swapchain format
pub const SWAPCHAIN_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Swapchain images are cleared into and blitted onto
pub const SWAPCHAIN_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Swapchain handles; destruction is owned by the queue it was created with
pub struct Swapchain {
    /// Swapchain handle
    pub handle: vk::SwapchainKHR,
    /// Presentable images, owned by the swapchain
    pub images: Vec<vk::Image>,
    /// One color view per image
    pub image_views: Vec<vk::ImageView>,
    /// Format the images were created with
    pub format: vk::SurfaceFormatKHR,
    /// Image size
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a FIFO swapchain for the context's surface
    ///
    /// Registers the swapchain and then each image view, so a flush destroys
    /// the views first.
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        queue: &mut VulkanDestructionQueue,
    ) -> VulkanResult<Self> {
        let physical = context.physical_device.device;
        let surface_loader = &context.instance.surface_loader;
        let device = &context.device;

        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical, context.surface)
                .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?
        };
        if !surface_caps.supported_usage_flags.contains(SWAPCHAIN_USAGE) {
            return Err(VulkanError::InitializationFailed(format!(
                "surface does not support {SWAPCHAIN_USAGE:?} image usage"
            )));
        }

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, context.surface)
                .map_err(VulkanError::call("vkGetPhysicalDeviceSurfaceFormatsKHR"))?
        };
        let format = choose_format(&surface_formats)
            .ok_or_else(|| VulkanError::InitializationFailed("surface reports no formats".to_string()))?;

        let extent = choose_extent(&surface_caps, window_extent);
        let image_count = choose_image_count(&surface_caps);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(SWAPCHAIN_USAGE)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let handle = unsafe {
            device.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::call("vkCreateSwapchainKHR"))?
        };
        queue.push(Destroyable::Swapchain(handle));

        let images = unsafe {
            device.swapchain_loader
                .get_swapchain_images(handle)
                .map_err(VulkanError::call("vkGetSwapchainImagesKHR"))?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe {
                device.device
                    .create_image_view(&view_info, None)
                    .map_err(VulkanError::call("vkCreateImageView"))?
            };
            queue.push(Destroyable::ImageView(view));
            image_views.push(view);
        }

        log::info!(
            "Swapchain created: {} images, {}x{}, {:?}",
            images.len(),
            extent.width,
            extent.height,
            format.format
        );

        Ok(Self {
            handle,
            images,
            image_views,
            format,
            extent,
        })
    }
}

/// Preferred format if offered, else whatever the surface lists first
fn choose_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = available.iter().find(|sf| {
        sf.format == SWAPCHAIN_FORMAT.format && sf.color_space == SWAPCHAIN_FORMAT.color_space
    });
    match preferred {
        Some(format) => Some(*format),
        None => {
            let fallback = available.first().copied();
            if let Some(format) = fallback {
                log::warn!("B8G8R8A8_UNORM/SRGB_NONLINEAR unavailable, using {:?}", format.format);
            }
            fallback
        }
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window_extent.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window_extent.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}
