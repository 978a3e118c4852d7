//! Device seam: descriptor heap creation and view writes.

use crate::descriptors::{DescriptorHeap, DescriptorHeapDesc, ShaderResourceViewDesc};
use crate::error::Result;
use crate::memory::{GpuBuffer, ImageRef};

/// Creates descriptor heaps and writes views into their slots.
///
/// Slot writes mutate the heap in place; a heap is never resized.
pub trait GpuDevice: Send + Sync {
    /// Create a descriptor heap.
    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> Result<DescriptorHeap>;

    /// Destroy a descriptor heap and every view written into it.
    fn destroy_descriptor_heap(&self, heap: DescriptorHeap);

    /// Write a shader-resource view of `image` into `slot` of `heap`,
    /// replacing whatever the slot held before.
    ///
    /// `image` is only borrowed for the duration of the call.
    fn create_shader_resource_view(
        &self,
        image: &ImageRef,
        desc: &ShaderResourceViewDesc,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Result<()>;

    /// Description of the view currently held by `slot`, if any.
    fn read_shader_resource_view(
        &self,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Option<ShaderResourceViewDesc>;

    /// Write a constant-buffer view over the whole of `buffer` into `slot`.
    fn create_constant_buffer_view(
        &self,
        buffer: &GpuBuffer,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Result<()>;
}
