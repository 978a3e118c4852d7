//! Vulkan renderer services.

use std::sync::Arc;

use ash::vk;
use parking_lot::{Mutex, MutexGuard};

use crate::device::GpuDevice;
use crate::error::Result;
use crate::memory::MemoryAllocator;
use crate::renderer::Renderer;
use crate::vulkan::allocator::VulkanAllocator;
use crate::vulkan::device::VulkanDevice;
use crate::vulkan::sync::FrameSyncManager;

/// [`Renderer`] on a caller-created Vulkan device.
///
/// Owns the allocator, the descriptor device and the frame fences. The
/// frame loop drives [`FrameSyncManager`] through [`Self::frames`].
pub struct VulkanRenderer {
    device: Arc<ash::Device>,
    allocator: Arc<VulkanAllocator>,
    descriptors: VulkanDevice,
    frames: Mutex<FrameSyncManager>,
}

impl VulkanRenderer {
    /// Create renderer services.
    ///
    /// # Safety
    /// The instance, device and physical device must be valid and outlive
    /// the renderer. The device must have the Vulkan 1.3 `dynamicRendering`
    /// and 1.2 `bufferDeviceAddress` features enabled.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let allocator = VulkanAllocator::new(instance, device.clone(), physical_device)?;
        let descriptors = VulkanDevice::new(device.clone())?;
        let frames = FrameSyncManager::new(&device, frames_in_flight)?;

        tracing::info!("Vulkan renderer ready with {frames_in_flight} frames in flight");

        Ok(Self {
            device,
            allocator: Arc::new(allocator),
            descriptors,
            frames: Mutex::new(frames),
        })
    }

    /// Get the Vulkan device handle.
    pub fn raw_device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Shared handle to the allocator, for uploaders running off the render thread.
    pub fn vulkan_allocator(&self) -> &Arc<VulkanAllocator> {
        &self.allocator
    }

    /// Frame fences, locked.
    pub fn frames(&self) -> MutexGuard<'_, FrameSyncManager> {
        self.frames.lock()
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Renderer for VulkanRenderer {
    fn allocator(&self) -> &dyn MemoryAllocator {
        self.allocator.as_ref()
    }

    fn device(&self) -> &dyn GpuDevice {
        &self.descriptors
    }

    fn wait_for_previous_frame(&self) -> Result<()> {
        let frames = self.frames.lock();
        unsafe { frames.previous().wait(&self.device) }
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::warn!("Device wait before renderer teardown failed: {e}");
            }
            self.frames.lock().destroy(&self.device);
        }
    }
}
