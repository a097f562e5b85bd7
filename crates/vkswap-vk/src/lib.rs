// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for `vkswap-present`: an `ash` device and a window
//! surface created through `ash-window`.

mod device;
mod format;
mod surface;

pub use device::{StagingMemory, VkDevice, VkQueue};
pub use surface::WindowSurface;
