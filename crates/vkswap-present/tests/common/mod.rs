// SPDX-License-Identifier: CEPL-1.0
//! In-memory device and surface used by the presenter tests.
//!
//! Command buffers execute at submit time. Every handle is a `u64` tracked
//! in a live set so leaks show up as non-zero counts, and image layouts are
//! checked on every barrier, copy and present.

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use vkswap_present::{
    Acquired, ColorSpace, CompositeAlpha, Device, DeviceError, DeviceResult, Extent, ImageFormat,
    ImageLayout, ImageUsage, Listeners, PresentMode, QueueFamily, SubmitSync, SubresourceLayout,
    SubscriptionId, SurfaceCapabilities, SurfaceFormat, SurfaceListener, SurfaceProvider,
    SurfaceTransform, SwapchainDesc, VideoFormat, VideoFrame, VideoInfo,
};

pub const SURFACE: u64 = 0x5eed;
pub const QUEUE: u64 = 0x9;
const STAGING_PITCH_ALIGN: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub semaphores: usize,
    pub fences: usize,
    pub command_buffers: usize,
    pub staging_images: usize,
    pub swapchains: usize,
}

#[derive(Clone, Debug)]
pub struct CreatedChain {
    pub handle: u64,
    pub extent: Extent,
    pub format: ImageFormat,
    pub present_mode: PresentMode,
    pub min_image_count: u32,
    pub old_swapchain: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Transition {
        image: u64,
        old: ImageLayout,
        new: ImageLayout,
    },
    Copy {
        src: u64,
        dst: u64,
        extent: Extent,
    },
}

struct ChainImg {
    layout: ImageLayout,
    extent: Extent,
    bpp: usize,
    pixels: Vec<u8>,
}

struct StagingImg {
    memory: u64,
    layout: ImageLayout,
    extent: Extent,
    bpp: usize,
    sub: SubresourceLayout,
    bytes: Vec<u8>,
}

struct Swapchain {
    images: Vec<u64>,
    next: usize,
}

struct State {
    next_handle: u64,
    caps: SurfaceCapabilities,
    formats: Vec<SurfaceFormat>,
    present_modes: Vec<PresentMode>,
    families: Vec<QueueFamily>,

    swapchains: HashMap<u64, Swapchain>,
    chain_images: HashMap<u64, ChainImg>,
    staging: HashMap<u64, StagingImg>,
    semaphores: HashSet<u64>,
    fences: HashMap<u64, bool>,
    commands: HashMap<u64, (bool, Vec<Op>)>,

    created: Vec<CreatedChain>,
    presented: Vec<(u64, u32)>,
    displayed: Option<(Extent, Vec<u8>)>,
    violations: Vec<String>,

    stale_acquires: u32,
    stale_presents: u32,
    suboptimal_acquires: u32,
    suboptimal_presents: u32,
    failing: HashSet<&'static str>,
    out_of_date: HashSet<&'static str>,
    entry_points_resolve: bool,
    wait_idle_calls: usize,
}

/// Parks `acquire_next_image` callers while closed.
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    closed: bool,
    parked: usize,
}

pub struct MockDevice {
    max_dimension: u32,
    state: Mutex<State>,
    acquire_gate: Gate,
}

pub fn bytes_per_pixel(format: ImageFormat) -> usize {
    VideoFormat::from_image_format(format)
        .map(VideoFormat::bytes_per_pixel)
        .unwrap_or(4)
}

pub fn default_caps() -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: 2,
        max_image_count: Some(4),
        current_extent: Some(Extent::new(64, 48)),
        min_image_extent: Extent::new(1, 1),
        max_image_extent: Extent::new(4096, 4096),
        supported_transforms: SurfaceTransform::IDENTITY,
        current_transform: SurfaceTransform::IDENTITY,
        supported_composite_alpha: CompositeAlpha::OPAQUE,
        supported_usage: ImageUsage::TRANSFER_DST
            | ImageUsage::COLOR_ATTACHMENT
            | ImageUsage::TRANSFER_SRC,
    }
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Self::with_max_dimension(4096)
    }

    pub fn with_max_dimension(max_dimension: u32) -> Arc<Self> {
        let formats = VideoFormat::ALL
            .iter()
            .map(|f| SurfaceFormat {
                format: f.image_format(),
                color_space: ColorSpace::SrgbNonlinear,
            })
            .collect();
        Arc::new(Self {
            max_dimension,
            state: Mutex::new(State {
                next_handle: 100,
                caps: default_caps(),
                formats,
                present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
                families: vec![
                    QueueFamily {
                        index: 0,
                        graphics: false,
                    },
                    QueueFamily {
                        index: 1,
                        graphics: true,
                    },
                ],
                swapchains: HashMap::new(),
                chain_images: HashMap::new(),
                staging: HashMap::new(),
                semaphores: HashSet::new(),
                fences: HashMap::new(),
                commands: HashMap::new(),
                created: Vec::new(),
                presented: Vec::new(),
                displayed: None,
                violations: Vec::new(),
                stale_acquires: 0,
                stale_presents: 0,
                suboptimal_acquires: 0,
                suboptimal_presents: 0,
                failing: HashSet::new(),
                out_of_date: HashSet::new(),
                entry_points_resolve: true,
                wait_idle_calls: 0,
            }),
            acquire_gate: Gate::default(),
        })
    }

    pub fn set_caps(&self, caps: SurfaceCapabilities) {
        self.state.lock().caps = caps;
    }

    pub fn set_current_extent(&self, extent: Option<Extent>) {
        self.state.lock().caps.current_extent = extent;
    }

    pub fn set_formats(&self, formats: &[ImageFormat]) {
        self.state.lock().formats = formats
            .iter()
            .map(|&format| SurfaceFormat {
                format,
                color_space: ColorSpace::SrgbNonlinear,
            })
            .collect();
    }

    pub fn set_present_modes(&self, modes: &[PresentMode]) {
        self.state.lock().present_modes = modes.to_vec();
    }

    pub fn set_graphics_families(&self, graphics: bool) {
        for f in &mut self.state.lock().families {
            f.graphics = graphics;
        }
    }

    pub fn break_entry_points(&self) {
        self.state.lock().entry_points_resolve = false;
    }

    /// The next `n` acquisitions report an out-of-date chain.
    pub fn stale_acquires(&self, n: u32) {
        self.state.lock().stale_acquires = n;
    }

    /// The next `n` presents report an out-of-date chain.
    pub fn stale_presents(&self, n: u32) {
        self.state.lock().stale_presents = n;
    }

    /// The next `n` acquisitions succeed but report a suboptimal chain.
    pub fn suboptimal_acquires(&self, n: u32) {
        self.state.lock().suboptimal_acquires = n;
    }

    /// The next `n` presents succeed but report a suboptimal chain.
    pub fn suboptimal_presents(&self, n: u32) {
        self.state.lock().suboptimal_presents = n;
    }

    /// Makes every call to `op` report an out-of-date chain until
    /// [`MockDevice::heal`].
    pub fn out_of_date(&self, op: &'static str) {
        self.state.lock().out_of_date.insert(op);
    }

    /// Acquisitions block until [`MockDevice::release_acquires`].
    pub fn hold_acquires(&self) {
        self.acquire_gate.state.lock().closed = true;
    }

    pub fn release_acquires(&self) {
        self.acquire_gate.state.lock().closed = false;
        self.acquire_gate.changed.notify_all();
    }

    /// Blocks until some caller is parked in `acquire_next_image`.
    pub fn wait_for_parked_acquire(&self) {
        let mut g = self.acquire_gate.state.lock();
        while g.parked == 0 {
            self.acquire_gate.changed.wait(&mut g);
        }
    }

    /// Makes every call to `op` fail until [`MockDevice::heal`].
    pub fn fail(&self, op: &'static str) {
        self.state.lock().failing.insert(op);
    }

    pub fn heal(&self) {
        let mut s = self.state.lock();
        s.failing.clear();
        s.out_of_date.clear();
    }

    pub fn live(&self) -> LiveCounts {
        let s = self.state.lock();
        LiveCounts {
            semaphores: s.semaphores.len(),
            fences: s.fences.len(),
            command_buffers: s.commands.len(),
            staging_images: s.staging.len(),
            swapchains: s.swapchains.len(),
        }
    }

    /// Per-attempt objects only; chains are expected to stay alive.
    pub fn assert_no_transient_handles(&self) {
        let live = self.live();
        assert_eq!(
            LiveCounts {
                swapchains: 0,
                ..live
            },
            LiveCounts::default(),
            "leaked per-attempt handles"
        );
    }

    pub fn created_chains(&self) -> Vec<CreatedChain> {
        self.state.lock().created.clone()
    }

    pub fn presented(&self) -> Vec<(u64, u32)> {
        self.state.lock().presented.clone()
    }

    /// Tightly packed pixels of the last presented image and its extent.
    pub fn displayed(&self) -> Option<(Extent, Vec<u8>)> {
        self.state.lock().displayed.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state.lock().wait_idle_calls
    }

    fn check(&self, s: &State, op: &'static str) -> DeviceResult<()> {
        if s.out_of_date.contains(op) {
            Err(DeviceError::OutOfDate(op))
        } else if s.failing.contains(op) {
            Err(DeviceError::failed(op, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn execute(s: &mut State, ops: &[Op]) {
        for op in ops {
            match *op {
                Op::Transition { image, old, new } => {
                    let current = if let Some(img) = s.chain_images.get(&image) {
                        img.layout
                    } else if let Some(img) = s.staging.get(&image) {
                        img.layout
                    } else {
                        s.violations.push(format!("barrier on unknown image {image}"));
                        continue;
                    };
                    if old != ImageLayout::Undefined && old != current {
                        s.violations.push(format!(
                            "image {image}: barrier from {old:?} but image is {current:?}"
                        ));
                    }
                    if let Some(img) = s.chain_images.get_mut(&image) {
                        img.layout = new;
                    } else if let Some(img) = s.staging.get_mut(&image) {
                        img.layout = new;
                    }
                }
                Op::Copy { src, dst, extent } => {
                    let Some(staging) = s.staging.get(&src) else {
                        s.violations.push(format!("copy from unknown staging image {src}"));
                        continue;
                    };
                    if staging.layout != ImageLayout::TransferSrcOptimal {
                        s.violations
                            .push(format!("copy source in {:?}", staging.layout));
                    }
                    let (sub, sbpp, sext) = (staging.sub, staging.bpp, staging.extent);
                    let src_bytes = staging.bytes.clone();
                    let Some(target) = s.chain_images.get_mut(&dst) else {
                        s.violations.push(format!("copy to unknown chain image {dst}"));
                        continue;
                    };
                    if target.layout != ImageLayout::TransferDstOptimal {
                        let msg = format!("copy destination in {:?}", target.layout);
                        s.violations.push(msg);
                        continue;
                    }
                    if extent.width > sext.width
                        || extent.height > sext.height
                        || extent.width > target.extent.width
                        || extent.height > target.extent.height
                    {
                        s.violations.push(format!("copy extent {extent:?} out of bounds"));
                        continue;
                    }
                    let n = extent.width as usize * sbpp.min(target.bpp);
                    let dst_row = target.extent.width as usize * target.bpp;
                    for row in 0..extent.height as usize {
                        let so = sub.offset as usize + row * sub.row_pitch as usize;
                        let d = row * dst_row;
                        target.pixels[d..d + n].copy_from_slice(&src_bytes[so..so + n]);
                    }
                }
            }
        }
    }

    fn alloc(s: &mut State) -> u64 {
        s.next_handle += 1;
        s.next_handle
    }
}

impl Device for MockDevice {
    type Surface = u64;
    type Queue = u64;
    type Swapchain = u64;
    type Image = u64;
    type Memory = u64;
    type Semaphore = u64;
    type Fence = u64;
    type CommandBuffer = u64;

    fn resolve_presentation_entry_points(&self) -> DeviceResult<()> {
        if self.state.lock().entry_points_resolve {
            Ok(())
        } else {
            Err(DeviceError::failed("vkGetDeviceProcAddr", "vkQueuePresentKHR missing"))
        }
    }

    fn queue_families(&self) -> Vec<QueueFamily> {
        self.state.lock().families.clone()
    }

    fn max_image_dimension_2d(&self) -> u32 {
        self.max_dimension
    }

    fn queue(&self, family: u32) -> DeviceResult<u64> {
        Ok(QUEUE + u64::from(family))
    }

    fn wait_idle(&self) -> DeviceResult<()> {
        self.state.lock().wait_idle_calls += 1;
        Ok(())
    }

    fn surface_capabilities(&self, _surface: u64) -> DeviceResult<SurfaceCapabilities> {
        let s = self.state.lock();
        self.check(&s, "surface_capabilities")?;
        Ok(s.caps)
    }

    fn surface_formats(&self, _surface: u64) -> DeviceResult<Vec<SurfaceFormat>> {
        Ok(self.state.lock().formats.clone())
    }

    fn surface_present_modes(&self, _surface: u64) -> DeviceResult<Vec<PresentMode>> {
        Ok(self.state.lock().present_modes.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc<Self>) -> DeviceResult<u64> {
        let mut s = self.state.lock();
        self.check(&s, "create_swapchain")?;
        if desc.extent.width > self.max_dimension || desc.extent.height > self.max_dimension {
            s.violations.push(format!("chain extent {:?} exceeds device", desc.extent));
        }
        if let Some(old) = desc.old_swapchain {
            if !s.swapchains.contains_key(&old) {
                s.violations.push(format!("old chain {old} already destroyed"));
            }
        }
        let handle = Self::alloc(&mut s);
        let bpp = bytes_per_pixel(desc.format);
        let mut images = Vec::new();
        for _ in 0..desc.min_image_count {
            let image = Self::alloc(&mut s);
            s.chain_images.insert(
                image,
                ChainImg {
                    layout: ImageLayout::Undefined,
                    extent: desc.extent,
                    bpp,
                    pixels: vec![0; desc.extent.width as usize * desc.extent.height as usize * bpp],
                },
            );
            images.push(image);
        }
        s.swapchains.insert(handle, Swapchain { images, next: 0 });
        s.created.push(CreatedChain {
            handle,
            extent: desc.extent,
            format: desc.format,
            present_mode: desc.present_mode,
            min_image_count: desc.min_image_count,
            old_swapchain: desc.old_swapchain,
        });
        Ok(handle)
    }

    fn destroy_swapchain(&self, swapchain: u64) {
        let mut s = self.state.lock();
        match s.swapchains.remove(&swapchain) {
            Some(chain) => {
                for image in chain.images {
                    s.chain_images.remove(&image);
                }
            }
            None => s.violations.push(format!("double destroy of chain {swapchain}")),
        }
    }

    fn swapchain_images(&self, swapchain: u64) -> DeviceResult<Vec<u64>> {
        let s = self.state.lock();
        self.check(&s, "swapchain_images")?;
        s.swapchains
            .get(&swapchain)
            .map(|c| c.images.clone())
            .ok_or_else(|| DeviceError::failed("swapchain_images", "unknown chain"))
    }

    fn acquire_next_image(&self, swapchain: u64, signal: u64) -> DeviceResult<Acquired> {
        {
            let gate = &self.acquire_gate;
            let mut g = gate.state.lock();
            if g.closed {
                g.parked += 1;
                gate.changed.notify_all();
                while g.closed {
                    gate.changed.wait(&mut g);
                }
                g.parked -= 1;
            }
        }
        let mut s = self.state.lock();
        if !s.semaphores.contains(&signal) {
            s.violations.push(format!("acquire signals dead semaphore {signal}"));
        }
        if s.stale_acquires > 0 {
            s.stale_acquires -= 1;
            return Err(DeviceError::OutOfDate("acquire_next_image"));
        }
        self.check(&s, "acquire_next_image")?;
        let chain = s
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| DeviceError::failed("acquire_next_image", "unknown chain"))?;
        let index = chain.next;
        chain.next = (chain.next + 1) % chain.images.len();
        let suboptimal = s.suboptimal_acquires > 0;
        if suboptimal {
            s.suboptimal_acquires -= 1;
        }
        Ok(Acquired {
            index: index as u32,
            suboptimal,
        })
    }

    fn queue_present(&self, _queue: u64, swapchain: u64, index: u32, wait: u64) -> DeviceResult<bool> {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        if !s.semaphores.contains(&wait) {
            s.violations.push(format!("present waits on dead semaphore {wait}"));
        }
        if s.stale_presents > 0 {
            s.stale_presents -= 1;
            return Err(DeviceError::OutOfDate("queue_present"));
        }
        self.check(s, "queue_present")?;
        let image = s
            .swapchains
            .get(&swapchain)
            .and_then(|c| c.images.get(index as usize).copied())
            .ok_or_else(|| DeviceError::failed("queue_present", "bad image index"))?;
        let img = &s.chain_images[&image];
        if img.layout != ImageLayout::PresentSrc {
            let msg = format!("presenting image {image} in {:?}", img.layout);
            s.violations.push(msg);
        }
        let shown = (img.extent, img.pixels.clone());
        s.displayed = Some(shown);
        s.presented.push((swapchain, index));
        let suboptimal = s.suboptimal_presents > 0;
        if suboptimal {
            s.suboptimal_presents -= 1;
        }
        Ok(suboptimal)
    }

    fn create_staging_image(
        &self,
        format: ImageFormat,
        extent: Extent,
    ) -> DeviceResult<(u64, u64, SubresourceLayout)> {
        let mut s = self.state.lock();
        self.check(&s, "create_staging_image")?;
        let bpp = bytes_per_pixel(format);
        let row = extent.width as usize * bpp;
        let pitch = row.div_ceil(STAGING_PITCH_ALIGN) * STAGING_PITCH_ALIGN;
        let offset = 16usize;
        let size = pitch * extent.height as usize;
        let sub = SubresourceLayout {
            offset: offset as u64,
            size: size as u64,
            row_pitch: pitch as u64,
        };
        let image = Self::alloc(&mut s);
        let memory = Self::alloc(&mut s);
        s.staging.insert(
            image,
            StagingImg {
                memory,
                layout: ImageLayout::Preinitialized,
                extent,
                bpp,
                sub,
                bytes: vec![0; offset + size],
            },
        );
        Ok((image, memory, sub))
    }

    fn destroy_staging_image(&self, image: u64, memory: u64) {
        let mut s = self.state.lock();
        match s.staging.remove(&image) {
            Some(img) if img.memory == memory => {}
            _ => s.violations.push(format!("bad staging destroy {image}/{memory}")),
        }
    }

    fn write_memory(&self, memory: u64, write: &mut dyn FnMut(&mut [u8])) -> DeviceResult<()> {
        let mut s = self.state.lock();
        self.check(&s, "write_memory")?;
        let img = s
            .staging
            .values_mut()
            .find(|i| i.memory == memory)
            .ok_or_else(|| DeviceError::failed("write_memory", "unknown memory"))?;
        write(&mut img.bytes);
        Ok(())
    }

    fn create_semaphore(&self) -> DeviceResult<u64> {
        let mut s = self.state.lock();
        self.check(&s, "create_semaphore")?;
        let h = Self::alloc(&mut s);
        s.semaphores.insert(h);
        Ok(h)
    }

    fn destroy_semaphore(&self, semaphore: u64) {
        let mut s = self.state.lock();
        if !s.semaphores.remove(&semaphore) {
            s.violations.push(format!("double destroy of semaphore {semaphore}"));
        }
    }

    fn create_fence(&self) -> DeviceResult<u64> {
        let mut s = self.state.lock();
        self.check(&s, "create_fence")?;
        let h = Self::alloc(&mut s);
        s.fences.insert(h, false);
        Ok(h)
    }

    fn destroy_fence(&self, fence: u64) {
        let mut s = self.state.lock();
        if s.fences.remove(&fence).is_none() {
            s.violations.push(format!("double destroy of fence {fence}"));
        }
    }

    fn wait_for_fence(&self, fence: u64) -> DeviceResult<()> {
        let s = self.state.lock();
        self.check(&s, "wait_for_fence")?;
        match s.fences.get(&fence) {
            Some(true) => Ok(()),
            // Would block forever on real hardware.
            Some(false) => Err(DeviceError::failed("wait_for_fence", "fence never submitted")),
            None => Err(DeviceError::failed("wait_for_fence", "unknown fence")),
        }
    }

    fn allocate_command_buffer(&self, queue: u64) -> DeviceResult<u64> {
        let mut s = self.state.lock();
        self.check(&s, "allocate_command_buffer")?;
        if queue != QUEUE + 1 {
            s.violations.push(format!("command buffer for queue {queue}"));
        }
        let h = Self::alloc(&mut s);
        s.commands.insert(h, (false, Vec::new()));
        Ok(h)
    }

    fn free_command_buffer(&self, _queue: u64, cmd: u64) {
        let mut s = self.state.lock();
        if s.commands.remove(&cmd).is_none() {
            s.violations.push(format!("double free of command buffer {cmd}"));
        }
    }

    fn begin_command_buffer(&self, _cmd: u64) -> DeviceResult<()> {
        let s = self.state.lock();
        self.check(&s, "begin_command_buffer")
    }

    fn cmd_transition_layout(&self, cmd: u64, image: u64, old: ImageLayout, new: ImageLayout) {
        if let Some((_, ops)) = self.state.lock().commands.get_mut(&cmd) {
            ops.push(Op::Transition { image, old, new });
        }
    }

    fn cmd_copy_image(&self, cmd: u64, src: u64, dst: u64, extent: Extent) {
        if let Some((_, ops)) = self.state.lock().commands.get_mut(&cmd) {
            ops.push(Op::Copy { src, dst, extent });
        }
    }

    fn end_command_buffer(&self, cmd: u64) -> DeviceResult<()> {
        let mut s = self.state.lock();
        self.check(&s, "end_command_buffer")?;
        match s.commands.get_mut(&cmd) {
            Some((ended, _)) => {
                *ended = true;
                Ok(())
            }
            None => Err(DeviceError::failed("end_command_buffer", "unknown command buffer")),
        }
    }

    fn queue_submit(&self, _queue: u64, cmd: u64, sync: SubmitSync<Self>) -> DeviceResult<()> {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        self.check(s, "queue_submit")?;
        let ops = match s.commands.get(&cmd) {
            Some((true, ops)) => ops.clone(),
            Some((false, _)) => {
                s.violations.push(format!("submitting unfinished command buffer {cmd}"));
                return Err(DeviceError::failed("queue_submit", "not ended"));
            }
            None => return Err(DeviceError::failed("queue_submit", "unknown command buffer")),
        };
        for sem in [sync.wait, sync.signal].into_iter().flatten() {
            if !s.semaphores.contains(&sem) {
                s.violations.push(format!("submit uses dead semaphore {sem}"));
            }
        }
        Self::execute(s, &ops);
        match s.fences.get_mut(&sync.fence) {
            Some(signalled) => *signalled = true,
            None => s.violations.push(format!("submit signals dead fence {}", sync.fence)),
        }
        Ok(())
    }
}

/// Window stand-in; `close` and `expose` deliver notifications the way a
/// window system thread would.
#[derive(Default)]
pub struct MockSurface {
    listeners: Listeners,
    presentable_families: Mutex<Option<Vec<u32>>>,
    surface_requests: Mutex<usize>,
    unsubscribe_hook: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl MockSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Restricts presentation support to `families`.
    pub fn presentable_on(&self, families: &[u32]) {
        *self.presentable_families.lock() = Some(families.to_vec());
    }

    pub fn close(&self) {
        self.listeners.notify_close();
    }

    pub fn expose(&self) {
        self.listeners.notify_redraw();
    }

    pub fn subscribers(&self) -> usize {
        self.listeners.len()
    }

    pub fn surface_requests(&self) -> usize {
        *self.surface_requests.lock()
    }

    /// Runs `hook` whenever a listener unsubscribes.
    pub fn on_unsubscribe(&self, hook: impl Fn() + Send + 'static) {
        *self.unsubscribe_hook.lock() = Some(Box::new(hook));
    }
}

impl SurfaceProvider<MockDevice> for MockSurface {
    fn surface(&self, _device: &MockDevice) -> DeviceResult<u64> {
        *self.surface_requests.lock() += 1;
        Ok(SURFACE)
    }

    fn supports_presentation(&self, _device: &MockDevice, surface: u64, family: u32) -> bool {
        surface == SURFACE
            && self
                .presentable_families
                .lock()
                .as_ref()
                .map_or(true, |f| f.contains(&family))
    }

    fn subscribe(&self, listener: Arc<dyn SurfaceListener>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(hook) = &*self.unsubscribe_hook.lock() {
            hook();
        }
        self.listeners.unsubscribe(id);
    }
}

/// Frame whose every byte encodes (seed, row, column) so misplaced rows
/// are visible. Rows are `stride` bytes apart.
pub fn pattern_frame(format: VideoFormat, width: u32, height: u32, stride: usize, seed: u8) -> Arc<VideoFrame> {
    let info = VideoInfo::new(format, width, height);
    let row_bytes = info.row_bytes();
    assert!(stride >= row_bytes);
    let mut data = vec![0xEE; stride * height as usize];
    for row in 0..height as usize {
        for col in 0..row_bytes {
            data[row * stride + col] = seed
                .wrapping_mul(31)
                .wrapping_add(row as u8)
                .wrapping_mul(7)
                .wrapping_add(col as u8);
        }
    }
    Arc::new(VideoFrame::packed(info, stride, data))
}

/// Tightly packed contents a chain image of extent `chain` should hold
/// after `frame` is copied into it.
pub fn expected_pixels(frame: &VideoFrame, chain: Extent) -> Vec<u8> {
    let info = *frame.info();
    let bpp = info.format.bytes_per_pixel();
    let mapped = frame.map().unwrap();
    let plane = mapped.plane(0).unwrap();
    let copy = Extent::new(info.width.min(chain.width), info.height.min(chain.height));
    let dst_row = chain.width as usize * bpp;
    let mut out = vec![0; dst_row * chain.height as usize];
    for row in 0..copy.height as usize {
        let n = copy.width as usize * bpp;
        out[row * dst_row..row * dst_row + n]
            .copy_from_slice(&plane.data[row * plane.stride..row * plane.stride + n]);
    }
    out
}
