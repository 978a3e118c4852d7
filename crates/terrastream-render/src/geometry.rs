//! Static vertex geometry in host-visible memory.

use terrastream_core::Vertex;
use terrastream_gpu::{BufferDesc, GpuBuffer, MemoryAllocator, Result, VertexBufferView};

/// A vertex buffer written once at creation and read-only afterwards.
#[derive(Debug)]
pub struct StaticGeometry {
    buffer: GpuBuffer,
    view: VertexBufferView,
}

impl StaticGeometry {
    /// Allocate an upload-heap buffer sized exactly for `vertices` and copy
    /// them in. Nothing stays allocated on failure.
    pub fn upload(allocator: &dyn MemoryAllocator, vertices: &[Vertex], name: &str) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buffer = allocator.create_buffer(&BufferDesc::upload_vertices(bytes.len() as u64, name))?;

        if let Err(e) = allocator.write_buffer(&buffer, 0, bytes) {
            if let Err(free_err) = allocator.free_buffer(buffer) {
                tracing::warn!("Failed to free vertex buffer {name} after write error: {free_err}");
            }
            return Err(e);
        }

        let view = VertexBufferView {
            buffer: buffer.id,
            location: buffer.address,
            stride: Vertex::STRIDE,
            size_in_bytes: bytes.len() as u32,
        };

        Ok(Self { buffer, view })
    }

    pub fn view(&self) -> &VertexBufferView {
        &self.view
    }

    pub fn vertex_count(&self) -> u32 {
        self.view.vertex_count()
    }

    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    /// Return the buffer to the allocator that created it.
    pub fn release(self, allocator: &dyn MemoryAllocator) -> Result<()> {
        allocator.free_buffer(self.buffer)
    }
}
