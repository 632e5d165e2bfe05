//! LIFO destruction queue for native GPU handles
//!
//! Every handle the render core creates is pushed here in creation order and
//! destroyed by [`DestructionQueue::flush`] in exactly the reverse order. The
//! queue never needs to know the dependency graph between handles: something
//! created later (a swapchain, built from a device and a surface) is always
//! destroyed before the objects it was built from.
//!
//! The queue also caches the first Instance, LogicalDevice and Allocator
//! pushed into it. These anchors are handed to the destroy routines of kinds
//! that need them (a surface is destroyed through its instance, and so on).
//! An anchor is a read-only view of an entry that still lives in the queue,
//! and it is released the moment that exact entry is destroyed.
//!
//! The queue is not synchronized. Push and flush from the owning thread only.

use crate::render::vulkan::registry::{AnchorKind, DestroyBackend, Destroyable, HandleKind};

/// Ordered stack of pending destroys plus the anchor cache
pub struct DestructionQueue<B: DestroyBackend> {
    entries: Vec<Destroyable<B>>,
    // Anchors are indices into `entries`. Everything above an anchor is
    // destroyed before it, so the index stays valid until its own pop.
    instance: Option<usize>,
    device: Option<usize>,
    allocator: Option<usize>,
}

impl<B: DestroyBackend> DestructionQueue<B> {
    /// Create an empty queue with no cached anchors
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            instance: None,
            device: None,
            allocator: None,
        }
    }

    /// Append an entry to the top of the stack
    ///
    /// If the entry is an anchor kind and that anchor slot is empty, the slot
    /// captures it. Later entries of the same kind never replace the anchor.
    pub fn push(&mut self, entry: Destroyable<B>) {
        let index = self.entries.len();
        if let Some(anchor) = entry.kind().anchor() {
            let slot = self.anchor_slot_mut(anchor);
            if slot.is_none() {
                *slot = Some(index);
            }
        }

        log::trace!("Queued {} for destruction", entry.kind());
        self.entries.push(entry);
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kinds of the pending entries, in push order
    pub fn kinds(&self) -> impl Iterator<Item = HandleKind> + '_ {
        self.entries.iter().map(Destroyable::kind)
    }

    /// The cached instance anchor
    pub fn instance(&self) -> Option<&B::Instance> {
        match self.instance.and_then(|i| self.entries.get(i)) {
            Some(Destroyable::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    /// The cached logical device anchor
    pub fn device(&self) -> Option<&B::Device> {
        match self.device.and_then(|i| self.entries.get(i)) {
            Some(Destroyable::LogicalDevice(device)) => Some(device),
            _ => None,
        }
    }

    /// The cached allocator anchor
    pub fn allocator(&self) -> Option<&B::Allocator> {
        match self.allocator.and_then(|i| self.entries.get(i)) {
            Some(Destroyable::Allocator(allocator)) => Some(allocator),
            _ => None,
        }
    }

    /// Whether the given anchor slot is populated
    pub fn has_anchor(&self, anchor: AnchorKind) -> bool {
        match anchor {
            AnchorKind::Instance => self.instance.is_some(),
            AnchorKind::LogicalDevice => self.device.is_some(),
            AnchorKind::Allocator => self.allocator.is_some(),
        }
    }

    /// Destroy every pending entry, most recent first
    ///
    /// # Panics
    ///
    /// Panics if an entry needs an anchor that is not cached. That is a
    /// registration-order bug, never a runtime condition.
    pub fn flush(&mut self, backend: &mut B) {
        self.drain(None, backend);
    }

    /// Destroy every pending entry of a sub-queue
    ///
    /// Anchors missing from this queue are taken from `parent`. Used for the
    /// per-frame queues, which hold device-owned objects but never the device.
    ///
    /// # Panics
    ///
    /// Panics if neither queue caches an anchor an entry needs.
    pub fn flush_scoped(&mut self, parent: &Self, backend: &mut B) {
        self.drain(Some(parent), backend);
    }

    fn drain(&mut self, parent: Option<&Self>, backend: &mut B) {
        if self.entries.is_empty() {
            return;
        }

        log::debug!("Flushing {} queued handles", self.entries.len());
        while let Some(entry) = self.entries.pop() {
            let index = self.entries.len();
            let kind = entry.kind();

            self.dispatch(entry, parent, backend);

            if let Some(anchor) = kind.anchor() {
                let slot = self.anchor_slot_mut(anchor);
                if *slot == Some(index) {
                    *slot = None;
                }
            }

            log::debug!("{kind} destroyed");
        }

        debug_assert!(self.instance.is_none() && self.device.is_none() && self.allocator.is_none());
    }

    fn dispatch(&self, entry: Destroyable<B>, parent: Option<&Self>, backend: &mut B) {
        let kind = entry.kind();
        match entry {
            Destroyable::Instance(instance) => backend.destroy_instance(instance),
            Destroyable::LogicalDevice(device) => backend.destroy_device(device),
            Destroyable::Allocator(allocator) => backend.destroy_allocator(allocator),
            Destroyable::Surface(surface) => {
                backend.destroy_surface(self.resolve_instance(parent, kind), surface);
            }
            Destroyable::DebugMessenger(messenger) => {
                backend.destroy_debug_messenger(self.resolve_instance(parent, kind), messenger);
            }
            Destroyable::ImageView(view) => {
                backend.destroy_image_view(self.resolve_device(parent, kind), view);
            }
            Destroyable::Image { image, allocation } => {
                backend.destroy_image(self.resolve_allocator(parent, kind), image, allocation);
            }
            Destroyable::Swapchain(swapchain) => {
                backend.destroy_swapchain(self.resolve_device(parent, kind), swapchain);
            }
            Destroyable::Semaphore(semaphore) => {
                backend.destroy_semaphore(self.resolve_device(parent, kind), semaphore);
            }
            Destroyable::Fence(fence) => {
                backend.destroy_fence(self.resolve_device(parent, kind), fence);
            }
            Destroyable::CommandPool(pool) => {
                backend.destroy_command_pool(self.resolve_device(parent, kind), pool);
            }
            Destroyable::DescriptorSetLayout(layout) => {
                backend.destroy_descriptor_set_layout(self.resolve_device(parent, kind), layout);
            }
            Destroyable::DescriptorPool(pool) => {
                backend.destroy_descriptor_pool(self.resolve_device(parent, kind), pool);
            }
        }
    }

    fn resolve_instance<'a>(&'a self, parent: Option<&'a Self>, kind: HandleKind) -> &'a B::Instance {
        self.instance()
            .or_else(|| parent.and_then(Self::instance))
            .unwrap_or_else(|| missing_anchor(kind, AnchorKind::Instance))
    }

    fn resolve_device<'a>(&'a self, parent: Option<&'a Self>, kind: HandleKind) -> &'a B::Device {
        self.device()
            .or_else(|| parent.and_then(Self::device))
            .unwrap_or_else(|| missing_anchor(kind, AnchorKind::LogicalDevice))
    }

    fn resolve_allocator<'a>(&'a self, parent: Option<&'a Self>, kind: HandleKind) -> &'a B::Allocator {
        self.allocator()
            .or_else(|| parent.and_then(Self::allocator))
            .unwrap_or_else(|| missing_anchor(kind, AnchorKind::Allocator))
    }

    fn anchor_slot_mut(&mut self, anchor: AnchorKind) -> &mut Option<usize> {
        match anchor {
            AnchorKind::Instance => &mut self.instance,
            AnchorKind::LogicalDevice => &mut self.device,
            AnchorKind::Allocator => &mut self.allocator,
        }
    }
}

impl<B: DestroyBackend> Default for DestructionQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: DestroyBackend> Drop for DestructionQueue<B> {
    // Pending payloads are forgotten, never dropped. Payload destructors
    // (an allocator's, say) would bypass the reverse push order.
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::warn!(
                "Destruction queue dropped with {} pending handles; they are leaked",
                self.entries.len()
            );
            std::mem::forget(std::mem::take(&mut self.entries));
        }
    }
}

#[cold]
fn missing_anchor(kind: HandleKind, anchor: AnchorKind) -> ! {
    log::error!("Cannot destroy {kind}: no {anchor} is cached");
    panic!("{kind} reached the destroy dispatch without a cached {anchor}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::testing::{Destroyed, MockDestroyer};
    use ash::vk::{self, Handle};
    use std::cell::Cell;
    use std::rc::Rc;

    type Queue = DestructionQueue<MockDestroyer>;

    fn surface(raw: u64) -> Destroyable<MockDestroyer> {
        Destroyable::Surface(vk::SurfaceKHR::from_raw(raw))
    }

    fn swapchain(raw: u64) -> Destroyable<MockDestroyer> {
        Destroyable::Swapchain(vk::SwapchainKHR::from_raw(raw))
    }

    #[test]
    fn test_flush_is_exact_reverse_of_push() {
        let mut queue = Queue::new();
        let mut backend = MockDestroyer::default();

        let pushed = vec![
            Destroyable::Instance(1),
            Destroyable::DebugMessenger(vk::DebugUtilsMessengerEXT::from_raw(2)),
            surface(3),
            Destroyable::LogicalDevice(4),
            Destroyable::Allocator(5),
            Destroyable::Image { image: vk::Image::from_raw(6), allocation: 60 },
            Destroyable::ImageView(vk::ImageView::from_raw(7)),
            swapchain(8),
            Destroyable::CommandPool(vk::CommandPool::from_raw(9)),
            Destroyable::Fence(vk::Fence::from_raw(10)),
            Destroyable::Semaphore(vk::Semaphore::from_raw(11)),
            Destroyable::DescriptorPool(vk::DescriptorPool::from_raw(12)),
            Destroyable::DescriptorSetLayout(vk::DescriptorSetLayout::from_raw(13)),
        ];
        let mut expected: Vec<HandleKind> = pushed.iter().map(Destroyable::kind).collect();
        for entry in pushed {
            queue.push(entry);
        }
        assert_eq!(queue.kinds().collect::<Vec<_>>(), expected);

        queue.flush(&mut backend);

        expected.reverse();
        assert_eq!(backend.kinds(), expected);
    }

    #[test]
    fn test_dependency_scenario_receives_cached_instance() {
        let mut queue = Queue::new();
        let mut backend = MockDestroyer::default();

        queue.push(Destroyable::Instance(100));
        queue.push(surface(200));
        queue.push(Destroyable::LogicalDevice(300));
        queue.push(swapchain(400));
        queue.flush(&mut backend);

        assert_eq!(
            backend.destroyed,
            vec![
                Destroyed::Swapchain { device: 300, swapchain: vk::SwapchainKHR::from_raw(400) },
                Destroyed::Device(300),
                Destroyed::Surface { instance: 100, surface: vk::SurfaceKHR::from_raw(200) },
                Destroyed::Instance(100),
            ]
        );
    }

    #[test]
    fn test_first_anchor_wins() {
        let mut queue = Queue::new();

        queue.push(Destroyable::Instance(1));
        queue.push(Destroyable::LogicalDevice(10));
        queue.push(Destroyable::Allocator(20));
        queue.push(Destroyable::Instance(2));
        queue.push(Destroyable::LogicalDevice(11));
        queue.push(Destroyable::Allocator(21));

        assert_eq!(queue.instance(), Some(&1));
        assert_eq!(queue.device(), Some(&10));
        assert_eq!(queue.allocator(), Some(&20));

        queue.flush(&mut MockDestroyer::default());
    }

    #[test]
    fn test_later_duplicate_does_not_release_anchor() {
        let mut queue = Queue::new();
        let mut backend = MockDestroyer::default();

        queue.push(Destroyable::Instance(1));
        queue.push(surface(50));
        queue.push(Destroyable::Instance(2));
        queue.push(surface(51));
        queue.flush(&mut backend);

        // Both surfaces go through the first instance, even the one pushed
        // after the duplicate was destroyed.
        assert_eq!(
            backend.destroyed,
            vec![
                Destroyed::Surface { instance: 1, surface: vk::SurfaceKHR::from_raw(51) },
                Destroyed::Instance(2),
                Destroyed::Surface { instance: 1, surface: vk::SurfaceKHR::from_raw(50) },
                Destroyed::Instance(1),
            ]
        );
    }

    #[test]
    fn test_flush_empties_queue_and_clears_anchors() {
        let mut queue = Queue::new();
        queue.push(Destroyable::Instance(1));
        queue.push(Destroyable::LogicalDevice(2));
        queue.push(Destroyable::Allocator(3));
        queue.push(Destroyable::Fence(vk::Fence::from_raw(4)));

        queue.flush(&mut MockDestroyer::default());

        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        for anchor in [AnchorKind::Instance, AnchorKind::LogicalDevice, AnchorKind::Allocator] {
            assert!(!queue.has_anchor(anchor), "{anchor} still cached");
        }
        assert!(queue.instance().is_none());
        assert!(queue.device().is_none());
        assert!(queue.allocator().is_none());
    }

    #[test]
    fn test_queue_is_reusable_after_flush() {
        let mut queue = Queue::new();
        let mut backend = MockDestroyer::default();

        queue.push(Destroyable::Instance(1));
        queue.flush(&mut backend);
        queue.flush(&mut backend);
        assert_eq!(backend.destroyed, vec![Destroyed::Instance(1)]);

        queue.push(Destroyable::Instance(9));
        assert_eq!(queue.instance(), Some(&9));
        queue.flush(&mut backend);
        assert_eq!(backend.destroyed.last(), Some(&Destroyed::Instance(9)));
    }

    #[test]
    fn test_image_goes_through_allocator_with_its_allocation() {
        let mut queue = Queue::new();
        let mut backend = MockDestroyer::default();

        queue.push(Destroyable::LogicalDevice(1));
        queue.push(Destroyable::Allocator(2));
        queue.push(Destroyable::Image { image: vk::Image::from_raw(3), allocation: 33 });
        queue.push(Destroyable::ImageView(vk::ImageView::from_raw(4)));
        queue.flush(&mut backend);

        assert_eq!(
            backend.destroyed,
            vec![
                Destroyed::ImageView { device: 1, view: vk::ImageView::from_raw(4) },
                Destroyed::Image { allocator: 2, image: vk::Image::from_raw(3), allocation: 33 },
                Destroyed::Allocator(2),
                Destroyed::Device(1),
            ]
        );
    }

    #[test]
    fn test_scoped_flush_borrows_parent_anchors() {
        let mut global = Queue::new();
        let mut backend = MockDestroyer::default();
        global.push(Destroyable::Instance(1));
        global.push(Destroyable::LogicalDevice(2));

        let mut per_frame = Queue::new();
        per_frame.push(Destroyable::Semaphore(vk::Semaphore::from_raw(5)));
        per_frame.push(Destroyable::Fence(vk::Fence::from_raw(6)));
        per_frame.flush_scoped(&global, &mut backend);

        assert!(per_frame.is_empty());
        assert_eq!(global.len(), 2);
        assert_eq!(
            backend.destroyed,
            vec![
                Destroyed::Fence { device: 2, fence: vk::Fence::from_raw(6) },
                Destroyed::Semaphore { device: 2, semaphore: vk::Semaphore::from_raw(5) },
            ]
        );

        global.flush(&mut backend);
    }

    /// Backend whose allocator payload counts how often it is dropped
    struct DropCountingBackend;

    struct CountedAllocator(Rc<Cell<usize>>);

    impl Drop for CountedAllocator {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    impl DestroyBackend for DropCountingBackend {
        type Instance = ();
        type Device = ();
        type Allocator = CountedAllocator;
        type Allocation = ();

        fn destroy_instance(&mut self, _: ()) {}
        fn destroy_device(&mut self, _: ()) {}
        fn destroy_allocator(&mut self, _: CountedAllocator) {}
        fn destroy_surface(&mut self, _: &(), _: vk::SurfaceKHR) {}
        fn destroy_debug_messenger(&mut self, _: &(), _: vk::DebugUtilsMessengerEXT) {}
        fn destroy_image_view(&mut self, _: &(), _: vk::ImageView) {}
        fn destroy_image(&mut self, _: &CountedAllocator, _: vk::Image, _: ()) {}
        fn destroy_swapchain(&mut self, _: &(), _: vk::SwapchainKHR) {}
        fn destroy_semaphore(&mut self, _: &(), _: vk::Semaphore) {}
        fn destroy_fence(&mut self, _: &(), _: vk::Fence) {}
        fn destroy_command_pool(&mut self, _: &(), _: vk::CommandPool) {}
        fn destroy_descriptor_set_layout(&mut self, _: &(), _: vk::DescriptorSetLayout) {}
        fn destroy_descriptor_pool(&mut self, _: &(), _: vk::DescriptorPool) {}
    }

    #[test]
    fn test_unflushed_drop_never_runs_payload_destructors() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut queue = DestructionQueue::<DropCountingBackend>::new();
            queue.push(Destroyable::Allocator(CountedAllocator(Rc::clone(&drops))));
            queue.push(Destroyable::Image { image: vk::Image::from_raw(1), allocation: () });
        }
        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn test_flush_hands_allocator_to_backend_exactly_once() {
        let drops = Rc::new(Cell::new(0));
        let mut queue = DestructionQueue::<DropCountingBackend>::new();
        queue.push(Destroyable::Allocator(CountedAllocator(Rc::clone(&drops))));
        queue.push(Destroyable::Image { image: vk::Image::from_raw(1), allocation: () });

        queue.flush(&mut DropCountingBackend);
        drop(queue);

        assert_eq!(drops.get(), 1);
    }

    #[test]
    #[should_panic(expected = "without a cached Logical Device")]
    fn test_missing_anchor_is_fatal() {
        let mut queue = Queue::new();
        queue.push(Destroyable::ImageView(vk::ImageView::from_raw(1)));
        queue.flush(&mut MockDestroyer::default());
    }

    #[test]
    #[should_panic(expected = "without a cached Instance")]
    fn test_anchor_pushed_after_dependent_is_already_gone() {
        let mut queue = Queue::new();
        // Registered in the wrong order: the instance is destroyed first and
        // the surface finds no anchor left.
        queue.push(surface(1));
        queue.push(Destroyable::Instance(2));
        queue.flush(&mut MockDestroyer::default());
    }
}
