//! GPU memory management via gpu-allocator.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{GpuError, Result};
use crate::memory::{BufferDesc, BufferId, BufferUsage, GpuAddress, GpuBuffer, HeapType, MemoryAllocator};

/// GPU memory allocator backed by `gpu-allocator`.
///
/// Buffers handed out through [`MemoryAllocator`] are tracked by id so the
/// backend-neutral [`GpuBuffer`] never carries Vulkan handles.
pub struct VulkanAllocator {
    device: Arc<ash::Device>,
    allocator: Mutex<Option<Allocator>>,
    buffers: Mutex<HashMap<BufferId, VkBuffer>>,
}

impl VulkanAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid, and the
    /// device must have the `bufferDeviceAddress` feature enabled.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: cfg!(debug_assertions),
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            device,
            allocator: Mutex::new(Some(allocator)),
            buffers: Mutex::new(HashMap::new()),
        })
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.allocator
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    fn free(&self, allocation: Allocation) -> Result<()> {
        self.allocator
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Allocate a raw Vulkan buffer.
    pub fn create_raw_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<VkBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            if let Err(free_err) = self.free(allocation) {
                tracing::warn!("Failed to free allocation of unbound buffer {name}: {free_err}");
            }
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok(VkBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Free a raw Vulkan buffer.
    pub fn free_raw_buffer(&self, buffer: &mut VkBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.free(allocation)?;
        }

        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        buffer.buffer = vk::Buffer::null();

        Ok(())
    }

    /// Allocate an image.
    pub fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<VkImage> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(name, requirements, location, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            if let Err(free_err) = self.free(allocation) {
                tracing::warn!("Failed to free allocation of unbound image {name}: {free_err}");
            }
            unsafe { self.device.destroy_image(image, None) };
            return Err(e.into());
        }

        Ok(VkImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
            mip_levels: create_info.mip_levels,
        })
    }

    /// Free an image allocation.
    pub fn free_image(&self, image: &mut VkImage) -> Result<()> {
        if let Some(allocation) = image.allocation.take() {
            self.free(allocation)?;
        }

        unsafe {
            self.device.destroy_image(image.image, None);
        }
        image.image = vk::Image::null();

        Ok(())
    }

    /// Number of buffers handed out through [`MemoryAllocator`] and not yet freed.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations are logged as leaks.
    pub fn shutdown(&self) {
        let leaked: Vec<VkBuffer> = self.buffers.lock().drain().map(|(_, b)| b).collect();
        for mut buffer in leaked {
            tracing::warn!("Freeing leaked buffer of {} bytes at shutdown", buffer.size);
            if let Err(e) = self.free_raw_buffer(&mut buffer) {
                tracing::warn!("Failed to free leaked buffer: {e}");
            }
        }
        drop(self.allocator.lock().take());
    }
}

impl Drop for VulkanAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

const fn memory_location(heap_type: HeapType) -> MemoryLocation {
    match heap_type {
        HeapType::Default => MemoryLocation::GpuOnly,
        HeapType::Upload => MemoryLocation::CpuToGpu,
        HeapType::Readback => MemoryLocation::GpuToCpu,
    }
}

fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => {
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        }
        BufferUsage::Constant => {
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        }
        BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
    }
}

impl MemoryAllocator for VulkanAllocator {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<GpuBuffer> {
        let usage = buffer_usage(desc.usage);
        let raw = self.create_raw_buffer(desc.size, usage, memory_location(desc.heap_type), desc.name)?;

        let address = if usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            GpuAddress(raw.device_address(&self.device))
        } else {
            GpuAddress::default()
        };
        let id = BufferId(raw.buffer.as_raw());

        self.buffers.lock().insert(id, raw);

        Ok(GpuBuffer {
            id,
            address,
            size: desc.size,
            heap_type: desc.heap_type,
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<()> {
        let buffers = self.buffers.lock();
        let raw = buffers
            .get(&buffer.id)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer {}", buffer.id.0)))?;
        raw.write_bytes(offset, data)
    }

    fn free_buffer(&self, buffer: GpuBuffer) -> Result<()> {
        let raw = self.buffers.lock().remove(&buffer.id);
        match raw {
            Some(mut raw) => self.free_raw_buffer(&mut raw),
            None => Err(GpuError::ResourceNotFound(format!("buffer {}", buffer.id.0))),
        }
    }
}

/// A Vulkan buffer with its allocation.
pub struct VkBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl VkBuffer {
    /// Get the device address of this buffer.
    pub fn device_address(&self, device: &ash::Device) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { device.get_buffer_device_address(&info) }
    }

    /// Persistently mapped pointer, for host-visible buffers.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "Data range too large for buffer".to_string(),
            ));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

/// A Vulkan image with its allocation.
pub struct VkImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
}
