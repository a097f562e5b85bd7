// SPDX-License-Identifier: CEPL-1.0
use crate::device::{Device, SurfaceProvider};
use crate::error::{PresentError, Result};
use crate::types::{ImageFormat, PresentMode, SupportedFormat, SurfaceCapabilities, SurfaceFormat, VideoFormat};
use tracing::debug;

/// Capabilities, (format, colour space) pairs and present modes of the surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceProperties {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

impl SurfaceProperties {
    pub fn query<D: Device>(device: &D, surface: D::Surface) -> Result<Self> {
        let capabilities = device.surface_capabilities(surface).map_err(PresentError::init)?;
        let formats = device.surface_formats(surface).map_err(PresentError::init)?;
        let present_modes = device
            .surface_present_modes(surface)
            .map_err(PresentError::init)?;
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A lone undefined entry means the surface takes any format.
    pub fn accepts_any_format(&self) -> bool {
        matches!(self.formats.as_slice(), [f] if f.format == ImageFormat::Undefined)
    }

    pub fn supports(&self, format: VideoFormat) -> bool {
        self.accepts_any_format() || self.formats.iter().any(|f| f.format == format.image_format())
    }

    /// Presentable video formats, in surface preference order, each bounded
    /// by `max_dimension` in both directions.
    pub fn supported_formats(&self, max_dimension: u32) -> Vec<SupportedFormat> {
        let entry = |format| SupportedFormat {
            format,
            min_width: 1,
            min_height: 1,
            max_width: max_dimension,
            max_height: max_dimension,
        };
        if self.accepts_any_format() {
            return vec![entry(VideoFormat::Bgra)];
        }
        let mut out: Vec<SupportedFormat> = Vec::new();
        for f in &self.formats {
            if let Some(v) = VideoFormat::from_image_format(f.format) {
                if !out.iter().any(|e| e.format == v) {
                    out.push(entry(v));
                }
            }
        }
        out
    }
}

/// Lazily populated surface state: the native surface, the unified
/// graphics+present queue and the queried properties.
pub(crate) struct SurfaceCache<D: Device> {
    pub(crate) surface: Option<D::Surface>,
    pub(crate) queue: Option<D::Queue>,
    pub(crate) properties: Option<SurfaceProperties>,
}

impl<D: Device> SurfaceCache<D> {
    pub(crate) fn new() -> Self {
        Self {
            surface: None,
            queue: None,
            properties: None,
        }
    }

    /// No-op when already populated.
    pub(crate) fn refresh<S: SurfaceProvider<D>>(
        &mut self,
        device: &D,
        provider: &S,
    ) -> Result<&SurfaceProperties> {
        let surface = match self.surface {
            Some(s) => s,
            None => {
                let s = provider.surface(device).map_err(PresentError::init)?;
                self.surface = Some(s);
                s
            }
        };

        if self.queue.is_none() {
            let family = select_queue_family(device, provider, surface)?;
            debug!("using queue family {family} for graphics and presentation");
            self.queue = Some(device.queue(family).map_err(PresentError::init)?);
        }

        if self.properties.is_none() {
            let props = SurfaceProperties::query(device, surface)?;
            debug!(
                "surface: {} formats, {} present modes, image count {}..{:?}",
                props.formats.len(),
                props.present_modes.len(),
                props.capabilities.min_image_count,
                props.capabilities.max_image_count
            );
            self.properties = Some(props);
        }

        // Populated just above.
        self.properties
            .as_ref()
            .ok_or_else(|| PresentError::Initialization("surface properties unavailable".into()))
    }

    /// Surface and queue, once `refresh` has succeeded.
    pub(crate) fn handles(&self) -> Result<(D::Surface, D::Queue)> {
        match (self.surface, self.queue) {
            (Some(s), Some(q)) => Ok((s, q)),
            _ => Err(PresentError::Initialization("surface not initialized".into())),
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.properties = None;
    }

    pub(crate) fn release_queue(&mut self) {
        self.queue = None;
    }

    pub(crate) fn clear(&mut self) {
        self.surface = None;
        self.queue = None;
        self.properties = None;
    }
}

/// First queue family that supports both graphics submission and
/// presentation to `surface`.
pub fn select_queue_family<D: Device, S: SurfaceProvider<D>>(
    device: &D,
    provider: &S,
    surface: D::Surface,
) -> Result<u32> {
    device
        .queue_families()
        .into_iter()
        .find(|q| q.graphics && provider.supports_presentation(device, surface, q.index))
        .map(|q| q.index)
        .ok_or(PresentError::IncompatibleQueue)
}
