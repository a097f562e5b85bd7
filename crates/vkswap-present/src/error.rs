// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PresentError>;

/// Failure reported by a [`Device`](crate::Device) or
/// [`SurfaceProvider`](crate::SurfaceProvider) implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The chain no longer matches the surface and must be rebuilt.
    #[error("presentation chain is out of date at {0}")]
    OutOfDate(&'static str),
    #[error("surface lost")]
    SurfaceLost,
    #[error("{op} failed: {reason}")]
    Failed { op: &'static str, reason: String },
}

impl DeviceError {
    pub fn failed(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Failed {
            op,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PresentError {
    /// Capability, queue or entry-point discovery failed.
    #[error("initialization failed: {0}")]
    Initialization(String),
    #[error("no queue family supports both graphics and presentation to the surface")]
    IncompatibleQueue,
    #[error("surface does not support image usage {0}")]
    UnsupportedUsage(&'static str),
    #[error("map failed: {0}")]
    Map(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The window was closed or the surface is gone; recreate the presenter.
    #[error("output surface lost: {0}")]
    SurfaceLost(&'static str),
    #[error("{op} failed: {reason}")]
    Platform { op: &'static str, reason: String },
}

impl PresentError {
    /// Conversion used while discovering surface properties, where every
    /// backend failure is an initialization failure.
    pub(crate) fn init(err: DeviceError) -> Self {
        match err {
            DeviceError::SurfaceLost => Self::SurfaceLost("surface lost during discovery"),
            DeviceError::OutOfDate(op) => Self::Initialization(format!("{op}: surface out of date")),
            DeviceError::Failed { op, reason } => Self::Initialization(format!("{op}: {reason}")),
        }
    }
}

impl From<DeviceError> for PresentError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::SurfaceLost => Self::SurfaceLost("surface lost"),
            DeviceError::OutOfDate(op) => Self::Platform {
                op,
                reason: "presentation chain out of date".into(),
            },
            DeviceError::Failed { op, reason } => Self::Platform { op, reason },
        }
    }
}
