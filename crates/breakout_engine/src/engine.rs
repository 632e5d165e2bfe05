//! Core engine implementation
//!
//! Owns the window, the global destruction queue and the frame ring, and
//! exposes the three lifecycle calls the application drives: `init`, `run`
//! and `shutdown`.

use std::time::Duration;

use ash::{vk, Entry};
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::config::EngineConfig;
use crate::render::frame::{FrameInfo, FrameSynchronizer};
use crate::render::vulkan::descriptors::{self, DescriptorAllocator, DescriptorLayoutBuilder, PoolSizeRatio};
use crate::render::vulkan::registry::Destroyable;
use crate::render::vulkan::{
    sync, DrawImage, Swapchain, VulkanContext, VulkanDestroyer, VulkanDestructionQueue, VulkanError,
    VulkanFrameGpu, VulkanResult, Window, WindowError,
};

/// How long an idle loop iteration sleeps between event polls
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Vulkan failure, fatal to the render loop
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),
}

/// Descriptor objects the draw image is exposed through
struct DrawDescriptors {
    allocator: DescriptorAllocator,
    layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
}

/// Everything bootstrap produces besides the queue
struct RenderResources {
    context: VulkanContext,
    swapchain: Swapchain,
    draw_image: DrawImage,
    descriptors: DrawDescriptors,
    frames: FrameSynchronizer<VulkanDestroyer>,
}

/// Main engine struct
pub struct Engine {
    frames: FrameSynchronizer<VulkanDestroyer>,
    gpu: VulkanFrameGpu,
    deletion_queue: VulkanDestructionQueue,
    destroyer: VulkanDestroyer,
    context: VulkanContext,
    swapchain: Swapchain,
    descriptors: DrawDescriptors,
    window: Window,
    idle: bool,
}

/// What a main loop iteration does once events are polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopStep {
    /// Run one frame tick
    Draw,
    /// Skip the frame and sleep before polling again
    Wait(Duration),
}

fn loop_step(idle: bool) -> LoopStep {
    if idle {
        LoopStep::Wait(IDLE_POLL_INTERVAL)
    } else {
        LoopStep::Draw
    }
}

/// Engine reaction to a window event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventAction {
    Close,
    SetIdle(bool),
}

fn event_action(event: &glfw::WindowEvent) -> Option<EventAction> {
    match event {
        glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => Some(EventAction::Close),
        glfw::WindowEvent::Iconify(iconified) => Some(EventAction::SetIdle(*iconified)),
        _ => None,
    }
}

impl Engine {
    /// Open the window and bring up every render resource
    ///
    /// If any step fails, whatever was already created is destroyed again
    /// before the error is returned.
    pub fn init(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!("Initializing engine...");

        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;
        let mut destroyer = VulkanDestroyer::new(entry.clone());
        let mut deletion_queue = VulkanDestructionQueue::new();

        let resources = match Self::create_resources(&entry, &mut window, config, &mut deletion_queue) {
            Ok(resources) => resources,
            Err(err) => {
                log::error!("Render initialization failed, releasing partial state: {err}");
                deletion_queue.flush(&mut destroyer);
                return Err(err.into());
            }
        };

        let gpu = VulkanFrameGpu::new(&resources.context, &resources.swapchain, resources.draw_image);
        log::info!(
            "Engine initialized: {} frames in flight, {} handles registered",
            resources.frames.frame_overlap(),
            deletion_queue.len()
        );

        Ok(Self {
            frames: resources.frames,
            gpu,
            deletion_queue,
            destroyer,
            context: resources.context,
            swapchain: resources.swapchain,
            descriptors: resources.descriptors,
            window,
            idle: false,
        })
    }

    fn create_resources(
        entry: &Entry,
        window: &mut Window,
        config: &EngineConfig,
        queue: &mut VulkanDestructionQueue,
    ) -> VulkanResult<RenderResources> {
        let context = VulkanContext::new(entry, window, &config.renderer, queue)?;
        let device = &context.device.device;

        let (width, height) = window.get_framebuffer_size();
        let window_extent = vk::Extent2D { width, height };
        let swapchain = Swapchain::new(&context, window_extent, queue)?;
        let draw_image = DrawImage::new(device, window_extent, queue)?;
        let descriptors = Self::create_descriptors(device, &draw_image, queue)?;

        let slots = sync::create_frame_slots(
            device,
            context.graphics_family,
            config.renderer.frames_in_flight,
            queue,
        )?;
        let frames = FrameSynchronizer::new(slots, config.renderer.sync_timeout_ns);

        Ok(RenderResources {
            context,
            swapchain,
            draw_image,
            descriptors,
            frames,
        })
    }

    fn create_descriptors(
        device: &ash::Device,
        draw_image: &DrawImage,
        queue: &mut VulkanDestructionQueue,
    ) -> VulkanResult<DrawDescriptors> {
        let ratios = [PoolSizeRatio {
            descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
            ratio: 1.0,
        }];
        let allocator = DescriptorAllocator::init_pool(device, 10, &ratios, queue)?;

        let layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(device, vk::ShaderStageFlags::COMPUTE)?;
        queue.push(Destroyable::DescriptorSetLayout(layout));

        let set = allocator.allocate(device, layout)?;
        descriptors::write_storage_image(device, set, draw_image.view);

        Ok(DrawDescriptors { allocator, layout, set })
    }

    /// Poll events and draw until the window is closed
    ///
    /// While idle no frames are drawn; events are still polled.
    ///
    /// # Errors
    ///
    /// Returns the first frame error; the loop cannot continue after one.
    pub fn run(&mut self) -> Result<(), EngineError> {
        log::info!("Starting main loop...");
        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();

            match loop_step(self.idle) {
                LoopStep::Draw => {
                    self.draw()?;
                }
                LoopStep::Wait(interval) => std::thread::sleep(interval),
            }
        }
        log::info!("Window closed after {} frames", self.frames.frame_number());
        Ok(())
    }

    /// Run one frame tick
    pub fn draw(&mut self) -> Result<FrameInfo, EngineError> {
        let info = self.frames.tick(&mut self.gpu, &self.deletion_queue, &mut self.destroyer)?;
        if info.frame_number % 600 == 0 {
            log::debug!("Frame {} on slot {}", info.frame_number, info.slot);
        }
        Ok(info)
    }

    fn handle_events(&mut self) {
        let events: Vec<glfw::WindowEvent> = self.window.flush_events().map(|(_, event)| event).collect();
        for action in events.iter().filter_map(event_action) {
            match action {
                EventAction::Close => self.window.set_should_close(true),
                EventAction::SetIdle(idle) => {
                    log::debug!("Window {}", if idle { "minimized, pausing" } else { "restored, resuming" });
                    self.set_idle(idle);
                }
            }
        }
    }

    /// Wait for the device to drain, then destroy everything
    ///
    /// Per-slot queues go first, then the global queue in reverse creation
    /// order. The engine is consumed, so nothing can touch a destroyed
    /// handle afterwards:
    ///
    /// ```compile_fail
    /// # use breakout_engine::{Engine, EngineError};
    /// # fn frame_after_shutdown(mut engine: Engine) -> Result<(), EngineError> {
    /// engine.shutdown()?;
    /// engine.draw()?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Dropping an engine without calling this leaks every registered handle
    /// (the queues log a warning). If the device cannot be drained, nothing
    /// is destroyed and the handles are leaked the same way.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        log::info!("Shutting down engine...");

        unsafe {
            self.context.device.device.device_wait_idle()
                .map_err(VulkanError::call("vkDeviceWaitIdle"))?;
        }

        self.frames.flush_slot_queues(&self.deletion_queue, &mut self.destroyer);
        self.deletion_queue.flush(&mut self.destroyer);

        log::info!("Engine shut down");
        Ok(())
    }

    /// Skip drawing (events are still polled) while `idle` is set
    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    /// Whether drawing is currently skipped
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Number of frames drawn so far
    pub fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }

    /// Swapchain image size
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Descriptor set exposing the draw image as a storage image, with its
    /// layout and the pool it came from
    pub fn draw_image_descriptors(&self) -> (vk::DescriptorSet, vk::DescriptorSetLayout, vk::DescriptorPool) {
        (self.descriptors.set, self.descriptors.layout, self.descriptors.allocator.pool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: glfw::Key, action: glfw::Action) -> glfw::WindowEvent {
        glfw::WindowEvent::Key(key, 0, action, glfw::Modifiers::empty())
    }

    #[test]
    fn test_idle_skips_drawing_and_waits() {
        assert_eq!(loop_step(false), LoopStep::Draw);
        assert_eq!(loop_step(true), LoopStep::Wait(IDLE_POLL_INTERVAL));
    }

    #[test]
    fn test_escape_press_closes() {
        assert_eq!(event_action(&key(glfw::Key::Escape, glfw::Action::Press)), Some(EventAction::Close));
        assert_eq!(event_action(&key(glfw::Key::Escape, glfw::Action::Release)), None);
        assert_eq!(event_action(&key(glfw::Key::Space, glfw::Action::Press)), None);
    }

    #[test]
    fn test_minimize_pauses_until_restored() {
        let events = [
            glfw::WindowEvent::Iconify(true),
            key(glfw::Key::A, glfw::Action::Press),
            glfw::WindowEvent::Iconify(false),
        ];

        let mut idle = false;
        let mut steps = Vec::new();
        for event in &events {
            if let Some(EventAction::SetIdle(value)) = event_action(event) {
                idle = value;
            }
            steps.push(loop_step(idle));
        }

        assert_eq!(
            steps,
            [
                LoopStep::Wait(IDLE_POLL_INTERVAL),
                LoopStep::Wait(IDLE_POLL_INTERVAL),
                LoopStep::Draw,
            ]
        );
    }
}
