//! Descriptor set layouts and pool allocation

use ash::vk;

use crate::render::vulkan::destroyer::VulkanDestructionQueue;
use crate::render::vulkan::registry::Destroyable;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Accumulates bindings, then builds one layout with a shared stage mask
#[derive(Debug, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorLayoutBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-descriptor binding
    pub fn add_binding(&mut self, binding: u32, descriptor_type: vk::DescriptorType) -> &mut Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .build(),
        );
        self
    }

    /// Forget every binding added so far
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Bindings as they will be submitted, with `stages` applied to each
    pub fn bindings(&self, stages: vk::ShaderStageFlags) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings
            .iter()
            .map(|binding| vk::DescriptorSetLayoutBinding { stage_flags: binding.stage_flags | stages, ..*binding })
            .collect()
    }

    /// Create the layout; the caller registers it for destruction
    pub fn build(&self, device: &ash::Device, stages: vk::ShaderStageFlags) -> VulkanResult<vk::DescriptorSetLayout> {
        let bindings = self.bindings(stages);
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        unsafe {
            device.create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::call("vkCreateDescriptorSetLayout"))
        }
    }
}

/// Share of a pool given to one descriptor type, per set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Descriptors of this type per set
    pub ratio: f32,
}

/// Pool sizes for `max_sets` sets split by `ratios`
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| vk::DescriptorPoolSize {
            ty: ratio.descriptor_type,
            descriptor_count: (ratio.ratio * max_sets as f32) as u32,
        })
        .collect()
}

/// A single descriptor pool sets are carved from
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

impl DescriptorAllocator {
    /// Create the pool and register it in `queue`
    pub fn init_pool(
        device: &ash::Device,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
        queue: &mut VulkanDestructionQueue,
    ) -> VulkanResult<Self> {
        let sizes = pool_sizes(max_sets, ratios);
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe {
            device.create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::call("vkCreateDescriptorPool"))?
        };
        queue.push(Destroyable::DescriptorPool(pool));

        Ok(Self { pool })
    }

    /// Pool handle
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Return every set to the pool
    pub fn clear_descriptors(&self, device: &ash::Device) -> VulkanResult<()> {
        unsafe {
            device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(VulkanError::call("vkResetDescriptorPool"))
        }
    }

    /// Allocate one set with `layout`
    pub fn allocate(&self, device: &ash::Device, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe {
            device.allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::call("vkAllocateDescriptorSets"))?
        };
        sets.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor pool returned no set".to_string(),
        })
    }
}

/// Point binding 0 of `set` at `view` as a storage image in `GENERAL` layout
pub fn write_storage_image(device: &ash::Device, set: vk::DescriptorSet, view: vk::ImageView) {
    let image_info = [vk::DescriptorImageInfo::builder()
        .image_layout(vk::ImageLayout::GENERAL)
        .image_view(view)
        .build()];
    let write = vk::WriteDescriptorSet::builder()
        .dst_binding(0)
        .dst_set(set)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(&image_info);

    unsafe {
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
    }
}
