// SPDX-License-Identifier: CEPL-1.0
//! The presentation loop and the lock that serializes it.
//!
//! One attempt runs acquire, stage, transfer and present against the
//! current chain. An out-of-date report from either the acquire or the
//! present step rebuilds the chain and restarts the attempt with the same
//! frame, up to `max_chain_rebuilds` times per call.

use crate::chain::{ChainRequest, PresentationChain};
use crate::device::{Device, SubscriptionId, SurfaceListener, SurfaceProvider};
use crate::error::{DeviceError, PresentError, Result};
use crate::frame::VideoFrame;
use crate::staging;
use crate::surface::SurfaceCache;
use crate::transfer::{Semaphore, Transfer};
use crate::types::{Extent, PresentMode, SupportedFormat, VideoFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace};
use vkswap_core::PresenterConfig;

/// Counters since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentStats {
    pub frames_presented: u64,
    pub redraws: u64,
    pub chain_allocations: u64,
    pub stale_recoveries: u64,
}

/// Snapshot of the current chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub format: VideoFormat,
    pub extent: Extent,
    pub present_mode: PresentMode,
    pub image_count: usize,
}

/// Presents video frames to a window surface through a chain of images.
///
/// All calls serialize on one internal lock, including redraws triggered
/// by the surface provider on its own thread.
pub struct Presenter<D: Device, S: SurfaceProvider<D>> {
    shared: Arc<Shared<D, S>>,
    subscription: SubscriptionId,
}

struct Shared<D: Device, S: SurfaceProvider<D>> {
    provider: Arc<S>,
    config: PresenterConfig,
    quit: AtomicBool,
    redraw_pending: AtomicBool,
    state: Mutex<RenderState<D>>,
}

struct RenderState<D: Device> {
    /// Released during teardown ahead of the listener subscription.
    device: Option<Arc<D>>,
    surface: SurfaceCache<D>,
    chain: Option<PresentationChain<D>>,
    format: Option<VideoFormat>,
    current: Option<Arc<VideoFrame>>,
    stats: PresentStats,
}

enum Outcome {
    Presented,
    Stale(&'static str),
}

impl<D: Device, S: SurfaceProvider<D>> Presenter<D, S> {
    pub fn new(device: Arc<D>, provider: Arc<S>) -> Result<Self> {
        Self::with_config(device, provider, PresenterConfig::default())
    }

    /// Fails with [`PresentError::Initialization`] when the device cannot
    /// resolve the presentation entry points.
    pub fn with_config(device: Arc<D>, provider: Arc<S>, config: PresenterConfig) -> Result<Self> {
        device
            .resolve_presentation_entry_points()
            .map_err(PresentError::init)?;

        let shared = Arc::new(Shared {
            provider,
            config,
            quit: AtomicBool::new(false),
            redraw_pending: AtomicBool::new(false),
            state: Mutex::new(RenderState {
                device: Some(device),
                surface: SurfaceCache::new(),
                chain: None,
                format: None,
                current: None,
                stats: PresentStats::default(),
            }),
        });

        let listener: Arc<dyn SurfaceListener> = Arc::new(Notifier {
            shared: Arc::downgrade(&shared),
        });
        let subscription = shared.provider.subscribe(listener);
        debug!("presenter created with {:?}", shared.config);

        Ok(Self {
            shared,
            subscription,
        })
    }

    pub fn query_supported_formats(&self) -> Result<Vec<SupportedFormat>> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        let device = state.device()?;
        let props = state.surface.refresh(&*device, &*shared.provider)?;
        Ok(props.supported_formats(device.max_image_dimension_2d()))
    }

    /// Negotiates `format` and (re)allocates the chain for it.
    pub fn set_format(&self, format: VideoFormat) -> Result<()> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if shared.quit.load(Ordering::Acquire) {
            return Err(PresentError::SurfaceLost("window closed"));
        }

        let device = state.device()?;
        state.surface.invalidate();
        let props = state.surface.refresh(&*device, &*shared.provider)?;
        if !props.supports(format) {
            return Err(PresentError::InvalidInput(format!(
                "surface cannot present {format}"
            )));
        }

        shared.rebuild(&mut state, format)?;
        if state.format != Some(format) {
            state.current = None;
        }
        state.format = Some(format);
        info!("negotiated {format}");
        Ok(())
    }

    /// Presents `frame` and keeps it for later redraws.
    pub fn present(&self, frame: Option<Arc<VideoFrame>>) -> Result<()> {
        let frame = frame.ok_or_else(|| PresentError::InvalidInput("no frame".into()))?;
        let shared = &*self.shared;
        if shared.quit.load(Ordering::Acquire) {
            return Err(PresentError::SurfaceLost("window closed"));
        }

        let mut state = shared.state.lock();
        if shared.quit.load(Ordering::Acquire) {
            return Err(PresentError::SurfaceLost("window closed"));
        }
        validate(&state, &frame)?;

        state.current = Some(Arc::clone(&frame));
        shared.present_locked(&mut state, &frame)?;
        state.stats.frames_presented += 1;
        Ok(())
    }

    /// Re-presents the last frame. Returns `false` when nothing was drawn
    /// because no frame has been presented yet or the window is closed.
    pub fn redraw(&self) -> Result<bool> {
        self.shared.redraw()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.quit.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PresentStats {
        self.shared.state.lock().stats
    }

    pub fn chain_info(&self) -> Option<ChainInfo> {
        let state = self.shared.state.lock();
        state.chain.as_ref().map(|c| ChainInfo {
            format: c.format(),
            extent: c.extent(),
            present_mode: c.present_mode(),
            image_count: c.len(),
        })
    }

    pub fn config(&self) -> &PresenterConfig {
        &self.shared.config
    }
}

impl<D: Device, S: SurfaceProvider<D>> Drop for Presenter<D, S> {
    fn drop(&mut self) {
        let shared = &*self.shared;
        shared.quit.store(true, Ordering::Release);

        let mut state = shared.state.lock();
        // Chain images and handle, queue, device, then the subscription.
        state.chain = None;
        state.surface.release_queue();
        state.device = None;
        shared.provider.unsubscribe(self.subscription);
        state.surface.clear();
        state.current = None;
        state.format = None;
        debug!("presenter torn down: {:?}", state.stats);
    }
}

impl<D: Device> RenderState<D> {
    fn device(&self) -> Result<Arc<D>> {
        self.device
            .clone()
            .ok_or(PresentError::SurfaceLost("presenter torn down"))
    }
}

fn validate<D: Device>(state: &RenderState<D>, frame: &VideoFrame) -> Result<()> {
    let format = state
        .format
        .ok_or_else(|| PresentError::InvalidInput("no format negotiated".into()))?;
    let info = frame.info();
    if info.format != format {
        return Err(PresentError::InvalidInput(format!(
            "{} frame on a {format} chain",
            info.format
        )));
    }
    if frame.extent().is_empty() {
        return Err(PresentError::InvalidInput(format!(
            "empty {}x{} frame",
            info.width, info.height
        )));
    }
    Ok(())
}

impl<D: Device, S: SurfaceProvider<D>> Shared<D, S> {
    /// Replaces the chain. Properties are refetched first; the old chain is
    /// passed as a hint and destroyed only once the new one exists.
    fn rebuild(&self, state: &mut RenderState<D>, format: VideoFormat) -> Result<()> {
        let device = state.device()?;
        state.surface.invalidate();
        let properties = state
            .surface
            .refresh(&*device, &*self.provider)?
            .clone();
        let (surface, queue) = state.surface.handles()?;

        let chain = PresentationChain::allocate(
            &device,
            ChainRequest {
                surface,
                queue,
                format,
                properties: &properties,
                max_dimension: device.max_image_dimension_2d(),
                config: &self.config,
            },
            state.chain.as_ref(),
        )?;
        state.chain = Some(chain);
        state.stats.chain_allocations += 1;
        Ok(())
    }

    fn present_locked(&self, state: &mut RenderState<D>, frame: &VideoFrame) -> Result<()> {
        let mut rebuilds = 0;
        loop {
            if self.quit.load(Ordering::Acquire) {
                return Err(PresentError::SurfaceLost("window closed"));
            }
            match self.attempt(state, frame)? {
                Outcome::Presented => return Ok(()),
                Outcome::Stale(op) => {
                    if rebuilds >= self.config.max_chain_rebuilds {
                        return Err(PresentError::Platform {
                            op,
                            reason: format!("chain still out of date after {rebuilds} rebuilds"),
                        });
                    }
                    rebuilds += 1;
                    debug!("chain out of date at {op}, rebuilding ({rebuilds})");
                    let format = frame.info().format;
                    self.rebuild(state, format)?;
                    state.stats.stale_recoveries += 1;
                }
            }
        }
    }

    /// Stage, acquire, transfer, present. The frame is staged before an
    /// image is acquired so a staging failure leaves the chain untouched.
    /// Every resource created here is released before returning, after the
    /// transfer fence if it was submitted.
    fn attempt(&self, state: &mut RenderState<D>, frame: &VideoFrame) -> Result<Outcome> {
        let device = state.device()?;
        let device = &*device;
        let (_, queue) = state.surface.handles()?;
        let chain = state
            .chain
            .as_mut()
            .ok_or_else(|| PresentError::InvalidInput("no format negotiated".into()))?;
        let mapped = frame.map()?;
        let mut staged = staging::stage(device, &mapped)?;

        let acquired = Semaphore::new(device)?;
        let index = match device.acquire_next_image(chain.handle(), acquired.handle()) {
            Ok(a) => {
                if a.suboptimal {
                    debug!("acquired image {} from a suboptimal chain", a.index);
                }
                a.index
            }
            Err(DeviceError::OutOfDate(op)) => return Ok(Outcome::Stale(op)),
            Err(e) => return Err(e.into()),
        };

        let ready = Semaphore::new(device)?;
        let swapchain = chain.handle();
        let target = chain.image_mut(index)?;
        let mut transfer = Transfer::record(device, queue, &staged, target)?;
        transfer.submit(&mut staged, target, acquired.handle(), ready.handle())?;

        match device.queue_present(queue, swapchain, index, ready.handle()) {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("presented image {index} to a suboptimal chain");
                }
            }
            Err(DeviceError::OutOfDate(op)) => return Ok(Outcome::Stale(op)),
            Err(e) => return Err(e.into()),
        }

        transfer.wait()?;
        trace!("presented image {index}");
        Ok(Outcome::Presented)
    }

    fn redraw(&self) -> Result<bool> {
        let mut state = self.state.lock();
        self.redraw_pending.store(false, Ordering::Release);
        if self.quit.load(Ordering::Acquire) {
            return Ok(false);
        }
        let Some(frame) = state.current.clone() else {
            return Ok(false);
        };
        self.present_locked(&mut state, &frame)?;
        state.stats.redraws += 1;
        Ok(true)
    }
}

/// Bridges surface notifications to the presenter without keeping it alive.
struct Notifier<D: Device, S: SurfaceProvider<D>> {
    shared: Weak<Shared<D, S>>,
}

impl<D: Device, S: SurfaceProvider<D>> SurfaceListener for Notifier<D, S> {
    fn on_close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.quit.store(true, Ordering::Release);
            info!("window closed, presentation stopped");
        }
    }

    fn on_redraw(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        // At most one redraw waits on the lock; the rest are dropped.
        if shared.redraw_pending.swap(true, Ordering::AcqRel) {
            trace!("redraw already pending, dropped");
            return;
        }
        if let Err(e) = shared.redraw() {
            error!("redraw failed: {e}");
        }
    }
}
