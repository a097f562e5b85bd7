// SPDX-License-Identifier: CEPL-1.0
//! The two external collaborators of the presenter: the logical device with
//! its queue and allocation capabilities, and the window surface with its
//! close/redraw notifications.

use crate::error::DeviceError;
use crate::types::{
    ColorSpace, CompositeAlpha, Extent, ImageFormat, ImageLayout, ImageUsage, PresentMode,
    QueueFamily, SubresourceLayout, SurfaceCapabilities, SurfaceFormat, SurfaceTransform,
};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Parameters for (re)creating a presentation chain.
pub struct SwapchainDesc<D: Device> {
    pub surface: D::Surface,
    pub min_image_count: u32,
    pub format: ImageFormat,
    pub color_space: ColorSpace,
    pub extent: Extent,
    pub usage: ImageUsage,
    pub pre_transform: SurfaceTransform,
    pub composite_alpha: CompositeAlpha,
    pub present_mode: PresentMode,
    /// Chain being replaced, handed to the platform so it can recycle it.
    pub old_swapchain: Option<D::Swapchain>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acquired {
    pub index: u32,
    pub suboptimal: bool,
}

/// Synchronization attached to a queue submission.
pub struct SubmitSync<D: Device> {
    /// Waited on at the transfer stage before the commands run.
    pub wait: Option<D::Semaphore>,
    pub signal: Option<D::Semaphore>,
    pub fence: D::Fence,
}

/// Logical device, single combined queue, allocation and command recording.
///
/// Handles are plain values; ownership and release ordering are enforced by
/// the presenter, never by the implementation.
pub trait Device: Sized + Send + Sync + 'static {
    type Surface: Copy + Debug + Send + Sync;
    type Queue: Copy + Debug + Send + Sync;
    type Swapchain: Copy + PartialEq + Debug + Send + Sync;
    type Image: Copy + PartialEq + Debug + Send + Sync;
    type Memory: Copy + Debug + Send + Sync;
    type Semaphore: Copy + Debug + Send + Sync;
    type Fence: Copy + Debug + Send + Sync;
    type CommandBuffer: Copy + Debug + Send + Sync;

    /// Verifies that every presentation entry point can be resolved.
    fn resolve_presentation_entry_points(&self) -> DeviceResult<()>;

    fn queue_families(&self) -> Vec<QueueFamily>;
    fn max_image_dimension_2d(&self) -> u32;
    fn queue(&self, family: u32) -> DeviceResult<Self::Queue>;
    fn wait_idle(&self) -> DeviceResult<()>;

    fn surface_capabilities(&self, surface: Self::Surface) -> DeviceResult<SurfaceCapabilities>;
    fn surface_formats(&self, surface: Self::Surface) -> DeviceResult<Vec<SurfaceFormat>>;
    fn surface_present_modes(&self, surface: Self::Surface) -> DeviceResult<Vec<PresentMode>>;

    fn create_swapchain(&self, desc: &SwapchainDesc<Self>) -> DeviceResult<Self::Swapchain>;
    fn destroy_swapchain(&self, swapchain: Self::Swapchain);
    fn swapchain_images(&self, swapchain: Self::Swapchain) -> DeviceResult<Vec<Self::Image>>;
    /// Blocks without timeout until an image is available.
    fn acquire_next_image(
        &self,
        swapchain: Self::Swapchain,
        signal: Self::Semaphore,
    ) -> DeviceResult<Acquired>;
    /// Returns whether the chain is suboptimal for the surface.
    fn queue_present(
        &self,
        queue: Self::Queue,
        swapchain: Self::Swapchain,
        index: u32,
        wait: Self::Semaphore,
    ) -> DeviceResult<bool>;

    /// Linear, host-visible image usable as a transfer source, created in
    /// the preinitialized layout.
    fn create_staging_image(
        &self,
        format: ImageFormat,
        extent: Extent,
    ) -> DeviceResult<(Self::Image, Self::Memory, SubresourceLayout)>;
    fn destroy_staging_image(&self, image: Self::Image, memory: Self::Memory);
    /// Maps the whole allocation for the duration of `write`.
    fn write_memory(
        &self,
        memory: Self::Memory,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> DeviceResult<()>;

    fn create_semaphore(&self) -> DeviceResult<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);
    fn create_fence(&self) -> DeviceResult<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);
    /// Blocks without timeout until the fence signals.
    fn wait_for_fence(&self, fence: Self::Fence) -> DeviceResult<()>;

    fn allocate_command_buffer(&self, queue: Self::Queue) -> DeviceResult<Self::CommandBuffer>;
    fn free_command_buffer(&self, queue: Self::Queue, cmd: Self::CommandBuffer);
    /// Begins one-time-submit recording.
    fn begin_command_buffer(&self, cmd: Self::CommandBuffer) -> DeviceResult<()>;
    fn cmd_transition_layout(
        &self,
        cmd: Self::CommandBuffer,
        image: Self::Image,
        old: ImageLayout,
        new: ImageLayout,
    );
    /// Copies the `extent` region at the origin of `src` (transfer-source
    /// layout) to the origin of `dst` (transfer-destination layout).
    fn cmd_copy_image(
        &self,
        cmd: Self::CommandBuffer,
        src: Self::Image,
        dst: Self::Image,
        extent: Extent,
    );
    fn end_command_buffer(&self, cmd: Self::CommandBuffer) -> DeviceResult<()>;
    fn queue_submit(
        &self,
        queue: Self::Queue,
        cmd: Self::CommandBuffer,
        sync: SubmitSync<Self>,
    ) -> DeviceResult<()>;
}

/// Receives window notifications. Called from whatever thread the
/// provider delivers events on.
pub trait SurfaceListener: Send + Sync {
    fn on_close(&self);
    fn on_redraw(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Native surface owner and source of close/redraw notifications.
pub trait SurfaceProvider<D: Device>: Send + Sync + 'static {
    /// The native surface, created on first use and reused afterwards.
    fn surface(&self, device: &D) -> DeviceResult<D::Surface>;
    fn supports_presentation(&self, device: &D, surface: D::Surface, queue_family: u32) -> bool;
    fn subscribe(&self, listener: Arc<dyn SurfaceListener>) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Listener registry for surface providers.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Arc<dyn SurfaceListener>)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn SurfaceListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.entries.lock().retain(|(i, _)| *i != id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_close(&self) {
        for l in self.snapshot() {
            l.on_close();
        }
    }

    pub fn notify_redraw(&self) {
        for l in self.snapshot() {
            l.on_redraw();
        }
    }

    // Listeners run without the registry lock held; a redraw may block on
    // the presenter's render lock.
    fn snapshot(&self) -> Vec<Arc<dyn SurfaceListener>> {
        self.entries.lock().iter().map(|(_, l)| l.clone()).collect()
    }
}
