//! GPU memory seam: buffer/image handles and the allocator interface.

use crate::error::Result;

/// Memory heap a buffer is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// Device-local memory, not host-visible.
    Default,
    /// Host-visible write-combined memory, read by the GPU.
    Upload,
    /// Host-visible cached memory, written by the GPU.
    Readback,
}

/// How a buffer will be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Constant,
    Staging,
}

/// Buffer allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc<'a> {
    pub size: u64,
    pub heap_type: HeapType,
    pub usage: BufferUsage,
    /// Debug name forwarded to the allocator.
    pub name: &'a str,
}

impl<'a> BufferDesc<'a> {
    /// Host-visible vertex buffer of `size` bytes.
    pub const fn upload_vertices(size: u64, name: &'a str) -> Self {
        Self {
            size,
            heap_type: HeapType::Upload,
            usage: BufferUsage::Vertex,
            name,
        }
    }

    /// Host-visible constant buffer of `size` bytes.
    pub const fn upload_constants(size: u64, name: &'a str) -> Self {
        Self {
            size,
            heap_type: HeapType::Upload,
            usage: BufferUsage::Constant,
            name,
        }
    }
}

/// Opaque buffer identifier. The Vulkan backend stores the raw `VkBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// GPU virtual address of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpuAddress(pub u64);

/// A GPU buffer allocation.
///
/// Owned by whoever created it; release it through the allocator that
/// produced it.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    pub id: BufferId,
    pub address: GpuAddress,
    pub size: u64,
    pub heap_type: HeapType,
}

/// Opaque image identifier. The Vulkan backend stores the raw `VkImage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

/// Two-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

/// Non-owning reference to a GPU-resident 2D image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub id: ImageId,
    pub extent: Extent2D,
    pub mip_levels: u32,
}

/// Allocates buffers from pooled device heaps.
pub trait MemoryAllocator: Send + Sync {
    /// Allocate a buffer.
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<GpuBuffer>;

    /// Copy `data` into a host-visible buffer at `offset`.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<()>;

    /// Release a buffer allocation.
    fn free_buffer(&self, buffer: GpuBuffer) -> Result<()>;
}
