// SPDX-License-Identifier: CEPL-1.0
//! Conversions between Vulkan enums/flags and the presenter's neutral types.

use ash::vk;
use vkswap_present::{
    ColorSpace, CompositeAlpha, Extent, ImageFormat, ImageLayout, ImageUsage, PresentMode,
    SurfaceCapabilities, SurfaceFormat, SurfaceTransform,
};

pub fn to_vk_format(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::Undefined => vk::Format::UNDEFINED,
        ImageFormat::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::R8G8B8Unorm => vk::Format::R8G8B8_UNORM,
        ImageFormat::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        ImageFormat::B8G8R8Unorm => vk::Format::B8G8R8_UNORM,
        ImageFormat::Other(raw) => vk::Format::from_raw(raw),
    }
}

pub fn from_vk_format(format: vk::Format) -> ImageFormat {
    match format {
        vk::Format::UNDEFINED => ImageFormat::Undefined,
        vk::Format::R8G8B8A8_UNORM => ImageFormat::R8G8B8A8Unorm,
        vk::Format::R8G8B8_UNORM => ImageFormat::R8G8B8Unorm,
        vk::Format::B8G8R8A8_UNORM => ImageFormat::B8G8R8A8Unorm,
        vk::Format::B8G8R8_UNORM => ImageFormat::B8G8R8Unorm,
        other => ImageFormat::Other(other.as_raw()),
    }
}

pub fn to_vk_color_space(cs: ColorSpace) -> vk::ColorSpaceKHR {
    match cs {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

pub fn from_vk_surface_format(f: &vk::SurfaceFormatKHR) -> SurfaceFormat {
    SurfaceFormat {
        format: from_vk_format(f.format),
        color_space: match f.color_space {
            vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
            other => ColorSpace::Other(other.as_raw()),
        },
    }
}

pub fn to_vk_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Other(raw) => vk::PresentModeKHR::from_raw(raw),
    }
}

pub fn from_vk_present_mode(mode: vk::PresentModeKHR) -> PresentMode {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => PresentMode::Immediate,
        vk::PresentModeKHR::MAILBOX => PresentMode::Mailbox,
        vk::PresentModeKHR::FIFO => PresentMode::Fifo,
        vk::PresentModeKHR::FIFO_RELAXED => PresentMode::FifoRelaxed,
        other => PresentMode::Other(other.as_raw()),
    }
}

pub fn to_vk_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Access mask and pipeline stage on the source side of a barrier leaving
/// `layout`.
pub fn src_scope(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::Undefined => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        ImageLayout::Preinitialized => (vk::AccessFlags::HOST_WRITE, vk::PipelineStageFlags::HOST),
        ImageLayout::General => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
        ImageLayout::ColorAttachmentOptimal => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ImageLayout::TransferSrcOptimal => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        ImageLayout::TransferDstOptimal => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        // Ordered by the acquire semaphore, which is waited at the transfer stage.
        ImageLayout::PresentSrc => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TRANSFER),
    }
}

/// Access mask and pipeline stage on the destination side of a barrier
/// entering `layout`.
pub fn dst_scope(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::PresentSrc | ImageLayout::Undefined | ImageLayout::Preinitialized => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        }
        ImageLayout::ColorAttachmentOptimal => (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        other => src_scope(other),
    }
}

pub fn to_vk_usage(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut out = vk::ImageUsageFlags::empty();
    for (ours, theirs) in USAGE {
        if usage.contains(ours) {
            out |= theirs;
        }
    }
    out
}

fn from_vk_usage(usage: vk::ImageUsageFlags) -> ImageUsage {
    USAGE
        .iter()
        .filter(|(_, theirs)| usage.contains(*theirs))
        .fold(ImageUsage::empty(), |acc, (ours, _)| acc | *ours)
}

const USAGE: [(ImageUsage, vk::ImageUsageFlags); 5] = [
    (ImageUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
    (ImageUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
    (ImageUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
    (ImageUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
    (ImageUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
];

// The neutral transform and composite-alpha bits are laid out like Vulkan's.
pub fn to_vk_transform(t: SurfaceTransform) -> vk::SurfaceTransformFlagsKHR {
    vk::SurfaceTransformFlagsKHR::from_raw(t.bits())
}

fn from_vk_transform(t: vk::SurfaceTransformFlagsKHR) -> SurfaceTransform {
    SurfaceTransform::from_bits_truncate(t.as_raw())
}

pub fn to_vk_composite_alpha(a: CompositeAlpha) -> vk::CompositeAlphaFlagsKHR {
    vk::CompositeAlphaFlagsKHR::from_raw(a.bits())
}

fn from_vk_composite_alpha(a: vk::CompositeAlphaFlagsKHR) -> CompositeAlpha {
    CompositeAlpha::from_bits_truncate(a.as_raw())
}

fn extent(e: vk::Extent2D) -> Extent {
    Extent::new(e.width, e.height)
}

pub fn from_vk_capabilities(caps: &vk::SurfaceCapabilitiesKHR) -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: caps.min_image_count,
        max_image_count: (caps.max_image_count != 0).then_some(caps.max_image_count),
        current_extent: (caps.current_extent.width != u32::MAX).then(|| extent(caps.current_extent)),
        min_image_extent: extent(caps.min_image_extent),
        max_image_extent: extent(caps.max_image_extent),
        supported_transforms: from_vk_transform(caps.supported_transforms),
        current_transform: from_vk_transform(caps.current_transform),
        supported_composite_alpha: from_vk_composite_alpha(caps.supported_composite_alpha),
        supported_usage: from_vk_usage(caps.supported_usage_flags),
    }
}
