// SPDX-License-Identifier: CEPL-1.0
use crate::format::{
    dst_scope, from_vk_capabilities, from_vk_present_mode, from_vk_surface_format, src_scope,
    to_vk_color_space, to_vk_composite_alpha, to_vk_format, to_vk_layout, to_vk_present_mode,
    to_vk_transform, to_vk_usage,
};
use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use parking_lot::Mutex;
use raw_window_handle::HasDisplayHandle;
use std::ffi::CStr;
use std::os::raw::c_char;
use tracing::{debug, info, warn};
use vkswap_present::{
    Acquired, Device, DeviceError, DeviceResult, Extent, ImageFormat, ImageLayout, PresentMode,
    QueueFamily, SubmitSync, SubresourceLayout, SurfaceCapabilities, SurfaceFormat, SwapchainDesc,
};

#[cfg(debug_assertions)]
type DebugState = Option<vk::DebugUtilsMessengerEXT>;
#[cfg(not(debug_assertions))]
type DebugState = ();

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const INSTANCE_ENTRY_POINTS: [&CStr; 4] = [
    c"vkGetPhysicalDeviceSurfaceSupportKHR",
    c"vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
    c"vkGetPhysicalDeviceSurfaceFormatsKHR",
    c"vkGetPhysicalDeviceSurfacePresentModesKHR",
];

const DEVICE_ENTRY_POINTS: [&CStr; 5] = [
    c"vkCreateSwapchainKHR",
    c"vkDestroySwapchainKHR",
    c"vkGetSwapchainImagesKHR",
    c"vkAcquireNextImageKHR",
    c"vkQueuePresentKHR",
];

/// A queue and the family it was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VkQueue {
    pub handle: vk::Queue,
    pub family: u32,
}

/// Host-visible allocation backing a staging image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagingMemory {
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

/// Vulkan instance, physical device and logical device with one queue per
/// graphics-capable family.
pub struct VkDevice {
    entry: Entry,
    instance: Instance,
    debug: DebugState,
    surface_loader: surface::Instance,

    phys: vk::PhysicalDevice,
    max_image_dimension_2d: u32,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    families: Vec<QueueFamily>,

    device: ash::Device,
    swapchain_loader: Option<swapchain::Device>,
    queues: Vec<VkQueue>,
    pools: Mutex<Vec<(u32, vk::CommandPool)>>,
}

fn pool_for(pools: &[(u32, vk::CommandPool)], family: u32) -> Option<vk::CommandPool> {
    pools.iter().find(|(f, _)| *f == family).map(|(_, p)| *p)
}

fn vk_err(op: &'static str) -> impl Fn(vk::Result) -> DeviceError {
    move |r| match r {
        vk::Result::ERROR_OUT_OF_DATE_KHR => DeviceError::OutOfDate(op),
        vk::Result::ERROR_SURFACE_LOST_KHR => DeviceError::SurfaceLost,
        other => DeviceError::failed(op, other.to_string()),
    }
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback payload for the call's duration.
    let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "{msg}");
    } else {
        tracing::debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

fn has_layer(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str() == Ok(name))
}

fn has_instance_extension(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_extension_properties(None) }
        .unwrap_or_default()
        .iter()
        .any(|e| e.extension_name_as_c_str() == Ok(name))
}

/// Validation is enabled in debug builds when both the layer and the
/// debug-utils extension are installed.
fn validation_available(entry: &Entry) -> bool {
    cfg!(debug_assertions)
        && has_instance_extension(entry, ext_debug::NAME)
        && has_layer(entry, VALIDATION_LAYER)
}

unsafe fn create_instance(entry: &Entry, display: &impl HasDisplayHandle) -> Result<(Instance, bool)> {
    let app_name = c"vkswap";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: app_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let mut exts = ash_window::enumerate_required_extensions(dh)
        .context("enumerate_required_extensions")?
        .to_vec();
    let mut layers: Vec<*const c_char> = Vec::new();

    let debug = validation_available(entry);
    if debug {
        exts.push(ext_debug::NAME.as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = unsafe { entry.create_instance(&create_info, None) }.context("vkCreateInstance")?;
    if debug {
        info!("Vulkan validation enabled");
    }
    Ok((instance, debug))
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance, enabled: bool) -> DebugState {
    if !enabled {
        return None;
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("debug messenger unavailable: {e}");
            None
        }
    }
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(_entry: &Entry, _instance: &Instance, _enabled: bool) -> DebugState {}

#[cfg(debug_assertions)]
unsafe fn destroy_debug_messenger(entry: &Entry, instance: &Instance, dbg: DebugState) {
    if let Some(m) = dbg {
        let loader = ext_debug::Instance::new(entry, instance);
        unsafe { loader.destroy_debug_utils_messenger(m, None) };
    }
}

#[cfg(not(debug_assertions))]
unsafe fn destroy_debug_messenger(_entry: &Entry, _instance: &Instance, _dbg: DebugState) {}

/// Prefers a discrete GPU; any device with a graphics family otherwise.
unsafe fn pick_physical_device(instance: &Instance) -> Result<vk::PhysicalDevice> {
    let mut fallback = None;
    for phys in unsafe { instance.enumerate_physical_devices() }? {
        let has_graphics = unsafe { instance.get_physical_device_queue_family_properties(phys) }
            .iter()
            .any(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS));
        if !has_graphics {
            continue;
        }
        let props = unsafe { instance.get_physical_device_properties(phys) };
        if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            return Ok(phys);
        }
        fallback.get_or_insert(phys);
    }
    fallback.ok_or_else(|| anyhow!("no Vulkan device with a graphics queue"))
}

impl VkDevice {
    /// Instance, physical device and logical device for presenting on
    /// `display`. Surfaces are created later by
    /// [`WindowSurface`](crate::WindowSurface).
    pub fn new(display: &impl HasDisplayHandle) -> Result<Self> {
        let entry = unsafe { Entry::load() }.context("loading the Vulkan library")?;
        let (instance, debug_enabled) = unsafe { create_instance(&entry, display) }?;
        let debug = unsafe { create_debug_messenger(&entry, &instance, debug_enabled) };
        let surface_loader = surface::Instance::new(&entry, &instance);

        let phys = unsafe { pick_physical_device(&instance) }?;
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(phys) };
        let families: Vec<QueueFamily> =
            unsafe { instance.get_physical_device_queue_family_properties(phys) }
                .iter()
                .enumerate()
                .map(|(i, q)| QueueFamily {
                    index: i as u32,
                    graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                })
                .collect();

        let has_swapchain = unsafe { instance.enumerate_device_extension_properties(phys) }
            .unwrap_or_default()
            .iter()
            .any(|e| e.extension_name_as_c_str() == Ok(swapchain::NAME));
        if !has_swapchain {
            warn!("device lacks {:?}; presentation will be unavailable", swapchain::NAME);
        }

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .filter(|f| f.graphics)
            .map(|f| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: f.index,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();
        let device_exts: Vec<*const c_char> = if has_swapchain {
            vec![swapchain::NAME.as_ptr()]
        } else {
            Vec::new()
        };
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };
        let device =
            unsafe { instance.create_device(phys, &dinfo, None) }.context("vkCreateDevice")?;

        let mut queues = Vec::new();
        let mut pools = Vec::new();
        for info in &queue_infos {
            let family = info.queue_family_index;
            let handle = unsafe { device.get_device_queue(family, 0) };
            queues.push(VkQueue { handle, family });
            let pool_info = vk::CommandPoolCreateInfo {
                s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                flags: vk::CommandPoolCreateFlags::TRANSIENT,
                queue_family_index: family,
                ..Default::default()
            };
            let pool = unsafe { device.create_command_pool(&pool_info, None) }
                .context("vkCreateCommandPool")?;
            pools.push((family, pool));
        }

        let swapchain_loader = has_swapchain.then(|| swapchain::Device::new(&instance, &device));
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "Vulkan device {name} ({:?}), max 2D image {}, {} graphics families",
            props.device_type,
            props.limits.max_image_dimension2_d,
            queues.len()
        );

        Ok(Self {
            entry,
            instance,
            debug,
            surface_loader,
            phys,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            memory_properties,
            families,
            device,
            swapchain_loader,
            queues,
            pools: Mutex::new(pools),
        })
    }

    pub(crate) fn entry(&self) -> &Entry {
        &self.entry
    }

    pub(crate) fn instance(&self) -> &Instance {
        &self.instance
    }

    pub(crate) fn surface_support(&self, family: u32, surface: vk::SurfaceKHR) -> bool {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(self.phys, family, surface)
        }
        .unwrap_or(false)
    }

    pub(crate) fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }

    fn swapchain(&self, op: &'static str) -> DeviceResult<&swapchain::Device> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| DeviceError::failed(op, "VK_KHR_swapchain not enabled"))
    }

    fn find_memory_type(&self, type_bits: u32, req: vk::MemoryPropertyFlags) -> Option<u32> {
        let mem = &self.memory_properties;
        (0..mem.memory_type_count).find(|&i| {
            (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
        })
    }
}

impl Drop for VkDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            for (_, pool) in self.pools.lock().drain(..) {
                self.device.destroy_command_pool(pool, None);
            }
            self.device.destroy_device(None);
            destroy_debug_messenger(&self.entry, &self.instance, self.debug);
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan device destroyed");
    }
}

impl Device for VkDevice {
    type Surface = vk::SurfaceKHR;
    type Queue = VkQueue;
    type Swapchain = vk::SwapchainKHR;
    type Image = vk::Image;
    type Memory = StagingMemory;
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;
    type CommandBuffer = vk::CommandBuffer;

    fn resolve_presentation_entry_points(&self) -> DeviceResult<()> {
        for name in INSTANCE_ENTRY_POINTS {
            let f = unsafe { self.entry.get_instance_proc_addr(self.instance.handle(), name.as_ptr()) };
            if f.is_none() {
                return Err(DeviceError::failed(
                    "vkGetInstanceProcAddr",
                    format!("{} unavailable", name.to_string_lossy()),
                ));
            }
        }
        let get_device_proc_addr = self.instance.fp_v1_0().get_device_proc_addr;
        for name in DEVICE_ENTRY_POINTS {
            let f = unsafe { get_device_proc_addr(self.device.handle(), name.as_ptr()) };
            if f.is_none() {
                return Err(DeviceError::failed(
                    "vkGetDeviceProcAddr",
                    format!("{} unavailable", name.to_string_lossy()),
                ));
            }
        }
        Ok(())
    }

    fn queue_families(&self) -> Vec<QueueFamily> {
        self.families.clone()
    }

    fn max_image_dimension_2d(&self) -> u32 {
        self.max_image_dimension_2d
    }

    fn queue(&self, family: u32) -> DeviceResult<VkQueue> {
        self.queues
            .iter()
            .copied()
            .find(|q| q.family == family)
            .ok_or_else(|| DeviceError::failed("vkGetDeviceQueue", format!("no queue for family {family}")))
    }

    fn wait_idle(&self) -> DeviceResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(vk_err("vkDeviceWaitIdle"))
    }

    fn surface_capabilities(&self, surface: vk::SurfaceKHR) -> DeviceResult<SurfaceCapabilities> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
        Ok(from_vk_capabilities(&caps))
    }

    fn surface_formats(&self, surface: vk::SurfaceKHR) -> DeviceResult<Vec<SurfaceFormat>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
        Ok(formats.iter().map(from_vk_surface_format).collect())
    }

    fn surface_present_modes(&self, surface: vk::SurfaceKHR) -> DeviceResult<Vec<PresentMode>> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;
        Ok(modes.into_iter().map(from_vk_present_mode).collect())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc<Self>) -> DeviceResult<vk::SwapchainKHR> {
        let loader = self.swapchain("vkCreateSwapchainKHR")?;
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: desc.surface,
            min_image_count: desc.min_image_count,
            image_format: to_vk_format(desc.format),
            image_color_space: to_vk_color_space(desc.color_space),
            image_extent: vk::Extent2D {
                width: desc.extent.width,
                height: desc.extent.height,
            },
            image_array_layers: 1,
            image_usage: to_vk_usage(desc.usage),
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: to_vk_transform(desc.pre_transform),
            composite_alpha: to_vk_composite_alpha(desc.composite_alpha),
            present_mode: to_vk_present_mode(desc.present_mode),
            clipped: vk::TRUE,
            old_swapchain: desc.old_swapchain.unwrap_or_default(),
            ..Default::default()
        };
        unsafe { loader.create_swapchain(&info, None) }.map_err(vk_err("vkCreateSwapchainKHR"))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if let Some(loader) = &self.swapchain_loader {
            unsafe { loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> DeviceResult<Vec<vk::Image>> {
        let loader = self.swapchain("vkGetSwapchainImagesKHR")?;
        unsafe { loader.get_swapchain_images(swapchain) }.map_err(vk_err("vkGetSwapchainImagesKHR"))
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> DeviceResult<Acquired> {
        let loader = self.swapchain("vkAcquireNextImageKHR")?;
        let (index, suboptimal) =
            unsafe { loader.acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null()) }
                .map_err(vk_err("vkAcquireNextImageKHR"))?;
        Ok(Acquired { index, suboptimal })
    }

    fn queue_present(
        &self,
        queue: VkQueue,
        swapchain: vk::SwapchainKHR,
        index: u32,
        wait: vk::Semaphore,
    ) -> DeviceResult<bool> {
        let loader = self.swapchain("vkQueuePresentKHR")?;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &index,
            ..Default::default()
        };
        unsafe { loader.queue_present(queue.handle, &present) }.map_err(vk_err("vkQueuePresentKHR"))
    }

    fn create_staging_image(
        &self,
        format: ImageFormat,
        extent: Extent,
    ) -> DeviceResult<(vk::Image, StagingMemory, SubresourceLayout)> {
        let info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: to_vk_format(format),
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::LINEAR,
            usage: vk::ImageUsageFlags::TRANSFER_SRC,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::PREINITIALIZED,
            ..Default::default()
        };

        unsafe {
            let d = &self.device;
            let image = d.create_image(&info, None).map_err(vk_err("vkCreateImage"))?;
            let req = d.get_image_memory_requirements(image);
            let Some(memory_type_index) = self.find_memory_type(
                req.memory_type_bits,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ) else {
                d.destroy_image(image, None);
                return Err(DeviceError::failed(
                    "vkAllocateMemory",
                    "no host-visible coherent memory type",
                ));
            };
            let alloc = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index,
                ..Default::default()
            };
            let memory = match d.allocate_memory(&alloc, None) {
                Ok(m) => m,
                Err(e) => {
                    d.destroy_image(image, None);
                    return Err(vk_err("vkAllocateMemory")(e));
                }
            };
            if let Err(e) = d.bind_image_memory(image, memory, 0) {
                d.destroy_image(image, None);
                d.free_memory(memory, None);
                return Err(vk_err("vkBindImageMemory")(e));
            }

            let layout = d.get_image_subresource_layout(
                image,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            );
            Ok((
                image,
                StagingMemory {
                    memory,
                    size: req.size,
                },
                SubresourceLayout {
                    offset: layout.offset,
                    size: layout.size,
                    row_pitch: layout.row_pitch,
                },
            ))
        }
    }

    fn destroy_staging_image(&self, image: vk::Image, memory: StagingMemory) {
        unsafe {
            self.device.destroy_image(image, None);
            self.device.free_memory(memory.memory, None);
        }
    }

    fn write_memory(
        &self,
        memory: StagingMemory,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> DeviceResult<()> {
        let len = usize::try_from(memory.size)
            .map_err(|_| DeviceError::failed("vkMapMemory", "allocation larger than address space"))?;
        unsafe {
            let ptr = self
                .device
                .map_memory(memory.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(vk_err("vkMapMemory"))?;
            // SAFETY: the whole allocation is mapped and nothing else aliases it until unmap.
            let bytes = std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len);
            write(bytes);
            self.device.unmap_memory(memory.memory);
        }
        Ok(())
    }

    fn create_semaphore(&self) -> DeviceResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.device.create_semaphore(&info, None) }.map_err(vk_err("vkCreateSemaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self) -> DeviceResult<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.device.create_fence(&info, None) }.map_err(vk_err("vkCreateFence"))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> DeviceResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(vk_err("vkWaitForFences"))
    }

    fn allocate_command_buffer(&self, queue: VkQueue) -> DeviceResult<vk::CommandBuffer> {
        let pools = self.pools.lock();
        let pool = pool_for(&pools, queue.family)
            .ok_or_else(|| DeviceError::failed("vkAllocateCommandBuffers", "no pool for queue family"))?;
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let bufs = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(vk_err("vkAllocateCommandBuffers"))?;
        bufs.into_iter()
            .next()
            .ok_or_else(|| DeviceError::failed("vkAllocateCommandBuffers", "no buffer returned"))
    }

    fn free_command_buffer(&self, queue: VkQueue, cmd: vk::CommandBuffer) {
        // Pools are externally synchronized; hold the lock across the free.
        let pools = self.pools.lock();
        match pool_for(&pools, queue.family) {
            Some(pool) => unsafe { self.device.free_command_buffers(pool, &[cmd]) },
            None => warn!("freeing command buffer of unknown family {}", queue.family),
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> DeviceResult<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe { self.device.begin_command_buffer(cmd, &begin) }
            .map_err(vk_err("vkBeginCommandBuffer"))
    }

    fn cmd_transition_layout(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old: ImageLayout,
        new: ImageLayout,
    ) {
        let (src_access_mask, src_stage) = src_scope(old);
        let (dst_access_mask, dst_stage) = dst_scope(new);
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask,
            dst_access_mask,
            old_layout: to_vk_layout(old),
            new_layout: to_vk_layout(new),
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn cmd_copy_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        extent: Extent,
    ) {
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        unsafe {
            self.device.cmd_copy_image(
                cmd,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> DeviceResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }.map_err(vk_err("vkEndCommandBuffer"))
    }

    fn queue_submit(
        &self,
        queue: VkQueue,
        cmd: vk::CommandBuffer,
        sync: SubmitSync<Self>,
    ) -> DeviceResult<()> {
        let wait: Vec<vk::Semaphore> = sync.wait.into_iter().collect();
        let stages = vec![vk::PipelineStageFlags::TRANSFER; wait.len()];
        let signal: Vec<vk::Semaphore> = sync.signal.into_iter().collect();
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            p_wait_dst_stage_mask: stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: signal.len() as u32,
            p_signal_semaphores: signal.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(queue.handle, std::slice::from_ref(&submit), sync.fence)
        }
        .map_err(vk_err("vkQueueSubmit"))
    }
}
