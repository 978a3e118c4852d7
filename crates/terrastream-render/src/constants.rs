//! Per-frame shader constants shared by every tile.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use glam::{Mat4, Vec4};
use terrastream_gpu::{
    BufferDesc, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind, GpuBuffer, MemoryAllocator,
    Renderer, Result,
};

/// Constant buffer contents for the tile shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameConstants {
    pub view_projection: [[f32; 4]; 4],
    /// xy: tile offset in world units, z: tile scale, w: unused
    pub tile_offset: [f32; 4],
}

impl Default for FrameConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Vec4::new(0.0, 0.0, 1.0, 0.0))
    }
}

impl FrameConstants {
    pub fn new(view_projection: Mat4, tile_offset: Vec4) -> Self {
        Self {
            view_projection: view_projection.to_cols_array_2d(),
            tile_offset: tile_offset.to_array(),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_projection)
    }
}

fn free_constants(allocator: &dyn MemoryAllocator, buffer: GpuBuffer) {
    if let Err(e) = allocator.free_buffer(buffer) {
        tracing::warn!("Failed to free constant buffer: {e}");
    }
}

/// Owner of the constant-buffer heap bound at root slot 0 by every draw.
pub trait ConstantBufferManager: Send + Sync {
    fn heap(&self) -> &DescriptorHeap;
}

/// One host-visible [`FrameConstants`] buffer viewed through a single-slot
/// constant heap.
pub struct SharedConstantBuffers {
    renderer: Arc<dyn Renderer>,
    buffer: ManuallyDrop<GpuBuffer>,
    heap: ManuallyDrop<DescriptorHeap>,
}

impl SharedConstantBuffers {
    /// Allocate the buffer, fill it with `initial` and write its view.
    pub fn new(renderer: Arc<dyn Renderer>, initial: &FrameConstants) -> Result<Self> {
        let allocator = renderer.allocator();
        let device = renderer.device();

        let size = std::mem::size_of::<FrameConstants>() as u64;
        let buffer = allocator.create_buffer(&BufferDesc::upload_constants(size, "frame_constants"))?;

        let heap = match allocator
            .write_buffer(&buffer, 0, bytemuck::bytes_of(initial))
            .and_then(|()| {
                device.create_descriptor_heap(&DescriptorHeapDesc::single_slot(
                    DescriptorHeapKind::Constant,
                ))
            }) {
            Ok(heap) => heap,
            Err(e) => {
                free_constants(allocator, buffer);
                return Err(e);
            }
        };

        if let Err(e) = device.create_constant_buffer_view(&buffer, &heap, 0) {
            device.destroy_descriptor_heap(heap);
            free_constants(allocator, buffer);
            return Err(e);
        }

        tracing::debug!("Created shared constant buffer of {size} bytes");

        Ok(Self {
            renderer,
            buffer: ManuallyDrop::new(buffer),
            heap: ManuallyDrop::new(heap),
        })
    }

    /// Overwrite the constants. The caller must not race an in-flight frame
    /// reading them.
    pub fn update(&self, constants: &FrameConstants) -> Result<()> {
        self.renderer
            .allocator()
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(constants))
    }
}

impl ConstantBufferManager for SharedConstantBuffers {
    fn heap(&self) -> &DescriptorHeap {
        &self.heap
    }
}

impl Drop for SharedConstantBuffers {
    fn drop(&mut self) {
        if let Err(e) = self.renderer.wait_for_previous_frame() {
            tracing::warn!("Waiting for the previous frame before releasing constants failed: {e}");
        }
        // SAFETY: both fields are read exactly once, here, and never touched again.
        let (heap, buffer) = unsafe {
            (
                ManuallyDrop::take(&mut self.heap),
                ManuallyDrop::take(&mut self.buffer),
            )
        };
        self.renderer.device().destroy_descriptor_heap(heap);
        free_constants(self.renderer.allocator(), buffer);
    }
}
