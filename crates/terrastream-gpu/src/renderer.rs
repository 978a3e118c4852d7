//! Renderer seam consumed by renderable objects.

use crate::device::GpuDevice;
use crate::error::Result;
use crate::memory::MemoryAllocator;

/// Services the owning renderer provides to renderable objects.
pub trait Renderer: Send + Sync {
    /// Pooled GPU memory allocator.
    fn allocator(&self) -> &dyn MemoryAllocator;

    /// Device used for descriptor heaps and views.
    fn device(&self) -> &dyn GpuDevice;

    /// Block until the GPU has finished the previously submitted frame.
    fn wait_for_previous_frame(&self) -> Result<()>;
}
