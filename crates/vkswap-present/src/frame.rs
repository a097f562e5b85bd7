// SPDX-License-Identifier: CEPL-1.0
use crate::error::{PresentError, Result};
use crate::types::{Extent, VideoFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// Tightly packed row size of the first plane.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

#[derive(Clone, Debug)]
pub struct Plane {
    data: Vec<u8>,
    stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, stride: usize) -> Self {
        Self { data, stride }
    }
}

/// A decoded video frame in system memory.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    info: VideoInfo,
    planes: Vec<Plane>,
}

impl VideoFrame {
    pub fn new(info: VideoInfo, planes: Vec<Plane>) -> Self {
        Self { info, planes }
    }

    /// Single-plane frame with rows `stride` bytes apart.
    pub fn packed(info: VideoInfo, stride: usize, data: Vec<u8>) -> Self {
        Self::new(info, vec![Plane::new(data, stride)])
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn extent(&self) -> Extent {
        self.info.extent()
    }

    /// Checks the plane layout against the frame description and hands out
    /// read-only views of each plane.
    pub fn map(&self) -> Result<MappedFrame<'_>> {
        if self.planes.len() != self.info.format.n_planes() {
            return Err(PresentError::Map(format!(
                "{} frame carries {} planes, expected {}",
                self.info.format,
                self.planes.len(),
                self.info.format.n_planes()
            )));
        }

        let row_bytes = self.info.row_bytes();
        let rows = self.info.height as usize;
        let mut views = Vec::with_capacity(self.planes.len());
        for (i, plane) in self.planes.iter().enumerate() {
            if plane.stride < row_bytes {
                return Err(PresentError::Map(format!(
                    "plane {i}: stride {} shorter than a {row_bytes}-byte row",
                    plane.stride
                )));
            }
            let needed = match rows {
                0 => 0,
                n => plane.stride * (n - 1) + row_bytes,
            };
            if plane.data.len() < needed {
                return Err(PresentError::Map(format!(
                    "plane {i}: {} bytes backing {rows} rows of stride {} (need {needed})",
                    plane.data.len(),
                    plane.stride
                )));
            }
            views.push(PlaneView {
                data: &plane.data,
                stride: plane.stride,
            });
        }

        Ok(MappedFrame {
            info: self.info,
            planes: views,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlaneView<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

#[derive(Debug)]
pub struct MappedFrame<'a> {
    pub info: VideoInfo,
    pub planes: Vec<PlaneView<'a>>,
}

impl<'a> MappedFrame<'a> {
    pub fn plane(&self, index: usize) -> Option<PlaneView<'a>> {
        self.planes.get(index).copied()
    }
}
