// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic presentation of video frames through a chain of
//! swappable surface images.
//!
//! The graphics API is reached only through [`Device`]; the window only
//! through [`SurfaceProvider`].

mod chain;
mod device;
mod error;
mod frame;
mod presenter;
mod staging;
mod surface;
mod transfer;
mod types;

pub use chain::{
    select_composite_alpha, select_extent, select_image_count, select_pre_transform,
    select_present_mode, select_usage, ChainImage, PresentationChain,
};
pub use device::{
    Acquired, Device, DeviceResult, Listeners, SubmitSync, SubscriptionId, SurfaceListener,
    SurfaceProvider, SwapchainDesc,
};
pub use error::{DeviceError, PresentError, Result};
pub use frame::{MappedFrame, Plane, PlaneView, VideoFrame, VideoInfo};
pub use presenter::{ChainInfo, PresentStats, Presenter};
pub use staging::copy_rows;
pub use surface::{select_queue_family, SurfaceProperties};
pub use transfer::copy_region;
pub use types::{
    ColorSpace, CompositeAlpha, Extent, ImageFormat, ImageLayout, ImageUsage, PresentMode,
    QueueFamily, SubresourceLayout, SupportedFormat, SurfaceCapabilities, SurfaceFormat,
    SurfaceTransform, VideoFormat,
};
pub use vkswap_core::{PresentPolicy, PresenterConfig};
