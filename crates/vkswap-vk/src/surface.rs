// SPDX-License-Identifier: CEPL-1.0
use crate::device::VkDevice;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use tracing::debug;
use vkswap_present::{
    DeviceError, DeviceResult, Listeners, SubscriptionId, SurfaceListener, SurfaceProvider,
};

/// Vulkan surface of a native window, created on first use.
///
/// The window's event loop forwards close and redraw events through
/// [`notify_close`](Self::notify_close) and
/// [`notify_redraw`](Self::notify_redraw).
pub struct WindowSurface<W> {
    device: Arc<VkDevice>,
    window: Arc<W>,
    surface: Mutex<Option<vk::SurfaceKHR>>,
    listeners: Listeners,
}

impl<W> WindowSurface<W>
where
    W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
{
    pub fn new(device: Arc<VkDevice>, window: Arc<W>) -> Self {
        Self {
            device,
            window,
            surface: Mutex::new(None),
            listeners: Listeners::new(),
        }
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn notify_close(&self) {
        self.listeners.notify_close();
    }

    pub fn notify_redraw(&self) {
        self.listeners.notify_redraw();
    }

    fn create(&self, device: &VkDevice) -> DeviceResult<vk::SurfaceKHR> {
        let handle_err = |e: raw_window_handle::HandleError| {
            DeviceError::failed("vkCreateSurfaceKHR", e.to_string())
        };
        let dh = self.window.display_handle().map_err(handle_err)?.as_raw();
        let wh = self.window.window_handle().map_err(handle_err)?.as_raw();
        let surface = unsafe {
            ash_window::create_surface(device.entry(), device.instance(), dh, wh, None)
        }
        .map_err(|e| DeviceError::failed("vkCreateSurfaceKHR", e.to_string()))?;
        debug!("window surface created");
        Ok(surface)
    }
}

impl<W> SurfaceProvider<VkDevice> for WindowSurface<W>
where
    W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
{
    fn surface(&self, device: &VkDevice) -> DeviceResult<vk::SurfaceKHR> {
        let mut slot = self.surface.lock();
        if let Some(s) = *slot {
            return Ok(s);
        }
        let s = self.create(device)?;
        *slot = Some(s);
        Ok(s)
    }

    fn supports_presentation(&self, device: &VkDevice, surface: vk::SurfaceKHR, family: u32) -> bool {
        device.surface_support(family, surface)
    }

    fn subscribe(&self, listener: Arc<dyn SurfaceListener>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }
}

impl<W> Drop for WindowSurface<W> {
    fn drop(&mut self) {
        if let Some(s) = self.surface.get_mut().take() {
            self.device.destroy_surface(s);
        }
    }
}
