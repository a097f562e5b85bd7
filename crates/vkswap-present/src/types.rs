// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral descriptions of surface properties, formats and layouts.

use bitflags::bitflags;
use std::fmt;

pub use vkswap_core::Extent;

/// Pixel layout of an incoming video frame. Only packed single-plane
/// formats are presentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    Rgba,
    Rgb,
    Bgra,
    Bgr,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 4] = [Self::Rgba, Self::Rgb, Self::Bgra, Self::Bgr];

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba | Self::Bgra => 4,
            Self::Rgb | Self::Bgr => 3,
        }
    }

    pub fn n_planes(self) -> usize {
        1
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Rgba => ImageFormat::R8G8B8A8Unorm,
            Self::Rgb => ImageFormat::R8G8B8Unorm,
            Self::Bgra => ImageFormat::B8G8R8A8Unorm,
            Self::Bgr => ImageFormat::B8G8R8Unorm,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::R8G8B8A8Unorm => Some(Self::Rgba),
            ImageFormat::R8G8B8Unorm => Some(Self::Rgb),
            ImageFormat::B8G8R8A8Unorm => Some(Self::Bgra),
            ImageFormat::B8G8R8Unorm => Some(Self::Bgr),
            ImageFormat::Undefined | ImageFormat::Other(_) => None,
        }
    }

    /// Every negotiated format is presented in the sRGB non-linear space.
    pub fn color_space(self) -> ColorSpace {
        ColorSpace::SrgbNonlinear
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rgba => "RGBA",
            Self::Rgb => "RGB",
            Self::Bgra => "BGRA",
            Self::Bgr => "BGR",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown video format {s:?}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Undefined,
    R8G8B8A8Unorm,
    R8G8B8Unorm,
    B8G8R8A8Unorm,
    B8G8R8Unorm,
    /// A format this crate has no video mapping for, by raw value.
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: ImageFormat,
    pub color_space: ColorSpace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
    Other(i32),
}

impl PresentMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Mailbox => "MAILBOX",
            Self::Fifo => "FIFO",
            Self::FifoRelaxed => "FIFO_RELAXED",
            Self::Other(_) => "OTHER",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    Preinitialized,
    General,
    ColorAttachmentOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceTransform: u32 {
        const IDENTITY = 1 << 0;
        const ROTATE_90 = 1 << 1;
        const ROTATE_180 = 1 << 2;
        const ROTATE_270 = 1 << 3;
        const HORIZONTAL_MIRROR = 1 << 4;
        const HORIZONTAL_MIRROR_ROTATE_90 = 1 << 5;
        const HORIZONTAL_MIRROR_ROTATE_180 = 1 << 6;
        const HORIZONTAL_MIRROR_ROTATE_270 = 1 << 7;
        const INHERIT = 1 << 8;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CompositeAlpha: u32 {
        const OPAQUE = 1 << 0;
        const PRE_MULTIPLIED = 1 << 1;
        const POST_MULTIPLIED = 1 << 2;
        const INHERIT = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// `None` when the surface puts no upper bound on the image count.
    pub max_image_count: Option<u32>,
    /// `None` when the surface size is decided by the chain.
    pub current_extent: Option<Extent>,
    pub min_image_extent: Extent,
    pub max_image_extent: Extent,
    pub supported_transforms: SurfaceTransform,
    pub current_transform: SurfaceTransform,
    pub supported_composite_alpha: CompositeAlpha,
    pub supported_usage: ImageUsage,
}

/// Placement of a linear image's texels inside its memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SubresourceLayout {
    pub offset: u64,
    pub size: u64,
    pub row_pitch: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamily {
    pub index: u32,
    pub graphics: bool,
}

/// One presentable format with its dimension ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupportedFormat {
    pub format: VideoFormat,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}
