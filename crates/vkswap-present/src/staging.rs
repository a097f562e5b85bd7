// SPDX-License-Identifier: CEPL-1.0
use crate::device::Device;
use crate::error::{PresentError, Result};
use crate::frame::MappedFrame;
use crate::types::{Extent, ImageLayout, SubresourceLayout};
use tracing::trace;

/// Linear host-visible image holding one frame's pixels, destroyed on drop.
pub(crate) struct StagingImage<'d, D: Device> {
    device: &'d D,
    image: D::Image,
    memory: D::Memory,
    extent: Extent,
    layout: ImageLayout,
}

impl<D: Device> StagingImage<'_, D> {
    pub(crate) fn image(&self) -> D::Image {
        self.image
    }

    pub(crate) fn extent(&self) -> Extent {
        self.extent
    }

    pub(crate) fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }
}

impl<D: Device> Drop for StagingImage<'_, D> {
    fn drop(&mut self) {
        self.device.destroy_staging_image(self.image, self.memory);
    }
}

/// Uploads the first plane of `frame` into a new staging image sized to it.
pub(crate) fn stage<'d, D: Device>(
    device: &'d D,
    frame: &MappedFrame<'_>,
) -> Result<StagingImage<'d, D>> {
    let plane = frame
        .plane(0)
        .ok_or_else(|| PresentError::Map("frame has no planes".into()))?;
    let extent = frame.info.extent();

    let (image, memory, subresource) =
        device.create_staging_image(frame.info.format.image_format(), extent)?;
    let staging = StagingImage {
        device,
        image,
        memory,
        extent,
        layout: ImageLayout::Preinitialized,
    };

    let mut copied = Ok(0);
    device
        .write_memory(memory, &mut |dst| {
            copied = copy_rows(
                dst,
                &subresource,
                plane.data,
                plane.stride,
                frame.info.row_bytes(),
                frame.info.height as usize,
            );
        })
        .map_err(|e| PresentError::Map(e.to_string()))?;
    let written = copied?;
    trace!(
        "staged {}x{} {} frame, {written} bytes at pitch {}",
        extent.width,
        extent.height,
        frame.info.format,
        subresource.row_pitch
    );

    Ok(staging)
}

/// Copies `rows` rows from `src` (rows `stride` bytes apart) into `dst`
/// laid out per `layout` (rows `row_pitch` bytes apart from `offset`).
///
/// Each row contributes at most `row_bytes`, clipped to both the source
/// stride and destination pitch. Nothing is written past
/// `offset + size` or past the end of `dst`. Returns the bytes written.
pub fn copy_rows(
    dst: &mut [u8],
    layout: &SubresourceLayout,
    src: &[u8],
    stride: usize,
    row_bytes: usize,
    rows: usize,
) -> Result<usize> {
    let to_usize = |v: u64, what: &str| {
        usize::try_from(v).map_err(|_| PresentError::Map(format!("{what} {v} out of range")))
    };
    let offset = to_usize(layout.offset, "offset")?;
    let size = to_usize(layout.size, "size")?;
    let pitch = to_usize(layout.row_pitch, "row pitch")?;

    let limit = offset
        .checked_add(size)
        .map(|end| end.min(dst.len()))
        .ok_or_else(|| PresentError::Map("staging layout overflows".into()))?;
    let n = row_bytes.min(stride).min(pitch);

    let mut written = 0;
    for row in 0..rows {
        let d = offset + row * pitch;
        let s = row * stride;
        if d + n > limit {
            return Err(PresentError::Map(format!(
                "row {row} ends at {} past staging limit {limit}",
                d + n
            )));
        }
        if s + n > src.len() {
            return Err(PresentError::Map(format!(
                "row {row} reads past {}-byte source plane",
                src.len()
            )));
        }
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
        written += n;
    }
    Ok(written)
}
