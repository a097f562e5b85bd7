// SPDX-License-Identifier: CEPL-1.0
//! Presentation chain selection and allocation.

use crate::device::{Device, SwapchainDesc};
use crate::error::{PresentError, Result};
use crate::surface::SurfaceProperties;
use crate::transfer;
use crate::types::{
    ColorSpace, CompositeAlpha, Extent, ImageLayout, ImageUsage, PresentMode, SurfaceCapabilities,
    SurfaceTransform, VideoFormat,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vkswap_core::{PresentPolicy, PresenterConfig};

/// Chain extent: the surface's current extent, or the configured fallback
/// clamped to the surface limits when the surface leaves it undefined.
/// Never exceeds `max_dimension` in either direction.
pub fn select_extent(caps: &SurfaceCapabilities, fallback: Extent, max_dimension: u32) -> Extent {
    let (lo, hi) = (caps.min_image_extent, caps.max_image_extent);
    let extent = caps.current_extent.unwrap_or(Extent {
        width: fallback.width.clamp(lo.width, hi.width.max(lo.width)),
        height: fallback.height.clamp(lo.height, hi.height.max(lo.height)),
    });
    extent.min(Extent::new(max_dimension, max_dimension))
}

pub fn select_present_mode(modes: &[PresentMode], policy: PresentPolicy) -> PresentMode {
    match policy {
        PresentPolicy::Vsync => PresentMode::Fifo,
        PresentPolicy::LowLatency => [PresentMode::Mailbox, PresentMode::Immediate]
            .into_iter()
            .find(|m| modes.contains(m))
            .unwrap_or(PresentMode::Fifo),
    }
}

/// One more than the minimum so an image is free while the others are
/// queued, clamped to a finite maximum.
pub fn select_image_count(caps: &SurfaceCapabilities) -> u32 {
    let count = caps.min_image_count.saturating_add(1);
    match caps.max_image_count {
        Some(max) if count > max => max,
        _ => count,
    }
}

pub fn select_pre_transform(caps: &SurfaceCapabilities) -> SurfaceTransform {
    if caps.supported_transforms.contains(SurfaceTransform::IDENTITY) {
        SurfaceTransform::IDENTITY
    } else {
        caps.current_transform
    }
}

pub fn select_usage(caps: &SurfaceCapabilities) -> Result<ImageUsage> {
    if !caps.supported_usage.contains(ImageUsage::TRANSFER_DST) {
        return Err(PresentError::UnsupportedUsage("transfer destination"));
    }
    if !caps.supported_usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        return Err(PresentError::UnsupportedUsage("color attachment"));
    }
    Ok(ImageUsage::TRANSFER_DST | ImageUsage::COLOR_ATTACHMENT)
}

pub fn select_composite_alpha(caps: &SurfaceCapabilities) -> CompositeAlpha {
    let supported = caps.supported_composite_alpha;
    if supported.contains(CompositeAlpha::OPAQUE) {
        CompositeAlpha::OPAQUE
    } else {
        supported.iter().next().unwrap_or(CompositeAlpha::OPAQUE)
    }
}

/// One slot of the chain. Owned by the chain; never destroyed on its own.
pub struct ChainImage<D: Device> {
    pub image: D::Image,
    pub layout: ImageLayout,
    pub extent: Extent,
}

/// Inputs for one chain allocation.
pub(crate) struct ChainRequest<'a, D: Device> {
    pub surface: D::Surface,
    pub queue: D::Queue,
    pub format: VideoFormat,
    pub properties: &'a SurfaceProperties,
    pub max_dimension: u32,
    pub config: &'a PresenterConfig,
}

pub struct PresentationChain<D: Device> {
    device: Arc<D>,
    handle: D::Swapchain,
    format: VideoFormat,
    color_space: ColorSpace,
    extent: Extent,
    present_mode: PresentMode,
    images: Vec<ChainImage<D>>,
}

impl<D: Device> PresentationChain<D> {
    /// Builds a chain for `req`, handing `old` to the platform as the chain
    /// being replaced. `old` stays alive; the caller drops it once the new
    /// chain is installed.
    pub(crate) fn allocate(
        device: &Arc<D>,
        req: ChainRequest<'_, D>,
        old: Option<&PresentationChain<D>>,
    ) -> Result<Self> {
        let caps = &req.properties.capabilities;
        let extent = select_extent(caps, req.config.fallback_extent, req.max_dimension);
        if extent.is_empty() {
            return Err(PresentError::Platform {
                op: "create swapchain",
                reason: format!("surface extent {}x{} is empty", extent.width, extent.height),
            });
        }
        let present_mode =
            select_present_mode(&req.properties.present_modes, req.config.present_policy);
        let min_image_count = select_image_count(caps);
        let pre_transform = select_pre_transform(caps);
        let usage = select_usage(caps)?;
        let composite_alpha = select_composite_alpha(caps);
        let color_space = req.format.color_space();

        let handle = device.create_swapchain(&SwapchainDesc {
            surface: req.surface,
            min_image_count,
            format: req.format.image_format(),
            color_space,
            extent,
            usage,
            pre_transform,
            composite_alpha,
            present_mode,
            old_swapchain: old.map(|c| c.handle),
        })?;

        // From here on a failure destroys the new handle through Drop.
        let mut chain = Self {
            device: Arc::clone(device),
            handle,
            format: req.format,
            color_space,
            extent,
            present_mode,
            images: Vec::new(),
        };

        chain.images = device
            .swapchain_images(handle)?
            .into_iter()
            .map(|image| ChainImage {
                image,
                layout: ImageLayout::Undefined,
                extent,
            })
            .collect();
        if chain.images.is_empty() {
            return Err(PresentError::Platform {
                op: "get swapchain images",
                reason: "chain has no images".into(),
            });
        }

        let images: Vec<D::Image> = chain.images.iter().map(|i| i.image).collect();
        transfer::one_shot(&**device, req.queue, |cmd| {
            for &image in &images {
                device.cmd_transition_layout(
                    cmd,
                    image,
                    ImageLayout::Undefined,
                    ImageLayout::ColorAttachmentOptimal,
                );
            }
        })?;
        for image in &mut chain.images {
            image.layout = ImageLayout::ColorAttachmentOptimal;
        }

        info!(
            "presentation chain {}x{} {} {} with {} images (requested {min_image_count})",
            extent.width,
            extent.height,
            req.format,
            present_mode.name(),
            chain.images.len()
        );
        debug!("pre-transform {pre_transform:?}, composite alpha {composite_alpha:?}");

        Ok(chain)
    }

    pub fn handle(&self) -> D::Swapchain {
        self.handle
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub(crate) fn image_mut(&mut self, index: u32) -> Result<&mut ChainImage<D>> {
        let len = self.images.len();
        self.images
            .get_mut(index as usize)
            .ok_or_else(|| PresentError::Platform {
                op: "acquire next image",
                reason: format!("index {index} outside a {len}-image chain"),
            })
    }
}

impl<D: Device> Drop for PresentationChain<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("device wait before chain teardown failed: {e}");
        }
        self.images.clear();
        self.device.destroy_swapchain(self.handle);
        debug!("presentation chain destroyed");
    }
}
