//! Frame pacing primitives.

use ash::vk;

use crate::error::{GpuError, Result};

/// Synchronization resources of one frame in flight.
pub struct FrameSync {
    /// Semaphore signaled when the swapchain image is available
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when rendering is complete
    pub render_finished: vk::Semaphore,
    /// Fence signaled when the frame's submission has completed
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources. The fence starts signaled.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        Ok(Self {
            image_available: device.create_semaphore(&semaphore_info, None)?,
            render_finished: device.create_semaphore(&semaphore_info, None)?,
            in_flight: device.create_fence(&fence_info, None)?,
        })
    }

    /// Wait for this frame's submission to complete.
    ///
    /// # Safety
    /// The device must be valid.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        device
            .wait_for_fences(&[self.in_flight], true, u64::MAX)
            .map_err(|e| GpuError::FrameSync(e.to_string()))
    }

    /// Reset the fence before resubmitting the frame.
    ///
    /// # Safety
    /// The device must be valid and the fence must not be pending.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        device.reset_fences(&[self.in_flight])?;
        Ok(())
    }

    /// Destroy synchronization resources.
    ///
    /// # Safety
    /// The device must be valid and resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight, None);
    }
}

/// Manages synchronization for multiple frames in flight.
pub struct FrameSyncManager {
    frame_syncs: Vec<FrameSync>,
    current_frame: usize,
    frame_number: u64,
}

impl FrameSyncManager {
    /// Create a sync manager for the given number of frames in flight.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "at least one frame in flight is required".to_string(),
            ));
        }

        let mut frame_syncs = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match FrameSync::new(device) {
                Ok(sync) => frame_syncs.push(sync),
                Err(e) => {
                    for sync in &frame_syncs {
                        sync.destroy(device);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            frame_syncs,
            current_frame: 0,
            frame_number: 0,
        })
    }

    /// Get the current frame's sync resources.
    pub fn current(&self) -> &FrameSync {
        &self.frame_syncs[self.current_frame]
    }

    /// Sync resources of the most recently submitted frame.
    pub fn previous(&self) -> &FrameSync {
        let count = self.frame_syncs.len();
        &self.frame_syncs[(self.current_frame + count - 1) % count]
    }

    /// Advance to the next frame.
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frame_syncs.len();
        self.frame_number += 1;
    }

    /// Get the current frame slot index.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Monotonic number of frames advanced so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frame_syncs.len()
    }

    /// Destroy all resources.
    ///
    /// # Safety
    /// The device must be valid and all resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for sync in &self.frame_syncs {
            sync.destroy(device);
        }
    }
}
