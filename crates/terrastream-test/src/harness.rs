//! In-memory stand-ins for the GPU and streaming collaborators.
//!
//! Every fake records what it was asked to do and can be told to fail, so
//! tile behavior can be checked without a device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use terrastream_core::PixelFormat;
use terrastream_gpu::{
    BufferDesc, BufferId, CommandList, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind,
    Extent2D, GpuAddress, GpuBuffer, GpuDescriptorHandle, GpuDevice, GpuError, HeapId, ImageId,
    ImageRef, MemoryAllocator, PipelineBinding, PipelineId, Renderer, Result, RootSignatureId,
    ShaderResourceViewDesc,
};
use terrastream_render::{ConstantBufferManager, ShaderPass, TileServices};
use terrastream_streaming::{ResourceHandle, ResourceState, StreamingService};

/// Allocator keeping buffer contents in host memory.
#[derive(Debug, Default)]
pub struct FakeAllocator {
    next_id: AtomicU64,
    buffers: Mutex<HashMap<BufferId, Vec<u8>>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
    fail_write: AtomicBool,
    fail_free: AtomicBool,
}

impl FakeAllocator {
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }

    /// Make frees fail, leaving the buffer alive.
    pub fn fail_free(&self, fail: bool) {
        self.fail_free.store(fail, Ordering::SeqCst);
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.buffers.lock().get(&id).cloned()
    }
}

impl MemoryAllocator for FakeAllocator {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<GpuBuffer> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GpuError::AllocationFailed(format!("injected failure for {}", desc.name)));
        }
        let id = BufferId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.buffers.lock().insert(id, vec![0; desc.size as usize]);
        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(GpuBuffer {
            id,
            address: GpuAddress(0x1000 * id.0),
            size: desc.size,
            heap_type: desc.heap_type,
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(GpuError::InvalidState("injected write failure".to_string()));
        }
        let mut buffers = self.buffers.lock();
        let contents = buffers
            .get_mut(&buffer.id)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer {}", buffer.id.0)))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GpuError::InvalidState("write out of range".to_string()));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn free_buffer(&self, buffer: GpuBuffer) -> Result<()> {
        if self.fail_free.load(Ordering::SeqCst) {
            return Err(GpuError::InvalidState(format!("injected free failure for {}", buffer.id.0)));
        }
        self.buffers
            .lock()
            .remove(&buffer.id)
            .map(|_| ())
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer {}", buffer.id.0)))
    }
}

#[derive(Debug)]
struct FakeHeap {
    desc: DescriptorHeapDesc,
    views: Vec<Option<ShaderResourceViewDesc>>,
}

/// Device tracking heaps and the views written into them.
#[derive(Debug, Default)]
pub struct FakeDevice {
    next_id: AtomicU64,
    heaps: Mutex<HashMap<HeapId, FakeHeap>>,
    fail_heap_kind: Mutex<Option<DescriptorHeapKind>>,
    view_failures: AtomicUsize,
    srv_writes: AtomicUsize,
    cbv_writes: AtomicUsize,
}

impl FakeDevice {
    /// Make heap creation of `kind` fail until cleared with `None`.
    pub fn fail_heap(&self, kind: Option<DescriptorHeapKind>) {
        *self.fail_heap_kind.lock() = kind;
    }

    /// Make the next `count` shader-resource view writes fail.
    pub fn fail_next_views(&self, count: usize) {
        self.view_failures.store(count, Ordering::SeqCst);
    }

    pub fn live_heap_count(&self) -> usize {
        self.heaps.lock().len()
    }

    /// Shader-resource view writes that succeeded.
    pub fn srv_write_count(&self) -> usize {
        self.srv_writes.load(Ordering::SeqCst)
    }

    pub fn cbv_write_count(&self) -> usize {
        self.cbv_writes.load(Ordering::SeqCst)
    }
}

impl GpuDevice for FakeDevice {
    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> Result<DescriptorHeap> {
        if *self.fail_heap_kind.lock() == Some(desc.kind) {
            return Err(GpuError::HeapCreation(format!("injected {:?} failure", desc.kind)));
        }
        let id = HeapId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.heaps.lock().insert(
            id,
            FakeHeap {
                desc: *desc,
                views: vec![None; desc.capacity as usize],
            },
        );

        Ok(DescriptorHeap {
            id,
            desc: *desc,
            gpu_start: GpuDescriptorHandle(0xd000 + id.0),
        })
    }

    fn destroy_descriptor_heap(&self, heap: DescriptorHeap) {
        if self.heaps.lock().remove(&heap.id).is_none() {
            tracing::warn!("Destroying unknown fake heap {}", heap.id.0);
        }
    }

    fn create_shader_resource_view(
        &self,
        _image: &ImageRef,
        desc: &ShaderResourceViewDesc,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Result<()> {
        let failures = self.view_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.view_failures.store(failures - 1, Ordering::SeqCst);
            return Err(GpuError::ViewCreation("injected view failure".to_string()));
        }

        let mut heaps = self.heaps.lock();
        let record = heaps
            .get_mut(&heap.id)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("heap {}", heap.id.0)))?;
        if record.desc.kind != DescriptorHeapKind::ShaderResource {
            return Err(GpuError::ViewCreation("not a shader resource heap".to_string()));
        }
        let view = record
            .views
            .get_mut(slot as usize)
            .ok_or_else(|| GpuError::ViewCreation(format!("slot {slot} out of range")))?;
        *view = Some(*desc);
        self.srv_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_shader_resource_view(
        &self,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Option<ShaderResourceViewDesc> {
        self.heaps
            .lock()
            .get(&heap.id)
            .and_then(|record| record.views.get(slot as usize).copied().flatten())
    }

    fn create_constant_buffer_view(
        &self,
        _buffer: &GpuBuffer,
        heap: &DescriptorHeap,
        _slot: u32,
    ) -> Result<()> {
        if !self.heaps.lock().contains_key(&heap.id) {
            return Err(GpuError::ResourceNotFound(format!("heap {}", heap.id.0)));
        }
        self.cbv_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Renderer made of a [`FakeAllocator`] and a [`FakeDevice`].
#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub allocator: FakeAllocator,
    pub device: FakeDevice,
    waits: AtomicUsize,
    fail_wait: AtomicBool,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_wait(&self, fail: bool) {
        self.fail_wait.store(fail, Ordering::SeqCst);
    }

    /// Number of `wait_for_previous_frame` calls.
    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

impl Renderer for FakeRenderer {
    fn allocator(&self) -> &dyn MemoryAllocator {
        &self.allocator
    }

    fn device(&self) -> &dyn GpuDevice {
        &self.device
    }

    fn wait_for_previous_frame(&self) -> Result<()> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        if self.fail_wait.load(Ordering::SeqCst) {
            return Err(GpuError::FrameSync("injected fence failure".to_string()));
        }
        Ok(())
    }
}

/// Streaming service replaying a fixed sequence of states.
///
/// Each query pops the next scripted state; once the script runs out the
/// last state repeats.
#[derive(Debug)]
pub struct ScriptedStreamingService {
    script: Mutex<VecDeque<ResourceState>>,
    last: Mutex<ResourceState>,
    handle: Mutex<Option<ResourceHandle>>,
    queries: AtomicUsize,
    names: Mutex<Vec<String>>,
    uses: AtomicUsize,
}

impl ScriptedStreamingService {
    pub fn new(script: impl IntoIterator<Item = ResourceState>, handle: Option<ResourceHandle>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(ResourceState::Unavailable),
            handle: Mutex::new(handle),
            queries: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
            uses: AtomicUsize::new(0),
        }
    }

    /// Service that reports `handle` available on every query.
    pub fn available(handle: ResourceHandle) -> Self {
        Self::new([ResourceState::Available], Some(handle))
    }

    /// Append states to the script.
    pub fn push(&self, states: impl IntoIterator<Item = ResourceState>) {
        self.script.lock().extend(states);
    }

    pub fn set_handle(&self, handle: Option<ResourceHandle>) {
        *self.handle.lock() = handle;
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of `mark_used` calls.
    pub fn use_count(&self) -> usize {
        self.uses.load(Ordering::SeqCst)
    }

    /// Names queried, in order.
    pub fn queried_names(&self) -> Vec<String> {
        self.names.lock().clone()
    }
}

impl StreamingService for ScriptedStreamingService {
    fn query(&self, name: &str) -> ResourceState {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.names.lock().push(name.to_string());

        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        *last
    }

    fn get(&self, _name: &str) -> Option<ResourceHandle> {
        *self.handle.lock()
    }

    fn mark_used(&self, _name: &str) {
        self.uses.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shader pass binding a fixed pipeline.
#[derive(Debug, Default)]
pub struct StubShaderPass {
    creates: AtomicUsize,
    fail_create: AtomicBool,
}

impl StubShaderPass {
    pub const BINDING: PipelineBinding = PipelineBinding {
        root_signature: RootSignatureId(0xa0),
        pipeline: PipelineId(0xb0),
    };

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl ShaderPass for StubShaderPass {
    fn create(&self, _renderer: &dyn Renderer) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GpuError::PipelineCreation("injected failure".to_string()));
        }
        Ok(())
    }

    fn setup(&self, command_list: &mut dyn CommandList) {
        command_list.set_pipeline(Self::BINDING);
    }
}

/// Constant buffer manager with a fixed, device-independent heap.
#[derive(Debug)]
pub struct StubConstantBuffers {
    heap: DescriptorHeap,
}

impl StubConstantBuffers {
    pub const HEAP_ID: HeapId = HeapId(0xc0);
    pub const GPU_START: GpuDescriptorHandle = GpuDescriptorHandle(0xc000);

    pub fn new() -> Self {
        Self {
            heap: DescriptorHeap {
                id: Self::HEAP_ID,
                desc: DescriptorHeapDesc::single_slot(DescriptorHeapKind::Constant),
                gpu_start: Self::GPU_START,
            },
        }
    }
}

impl Default for StubConstantBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantBufferManager for StubConstantBuffers {
    fn heap(&self) -> &DescriptorHeap {
        &self.heap
    }
}

/// Handle of a 256x256 texture in `format`.
pub fn sample_handle(format: PixelFormat) -> ResourceHandle {
    ResourceHandle {
        image: ImageRef {
            id: ImageId(0x51),
            extent: Extent2D {
                width: 256,
                height: 256,
            },
            mip_levels: 1,
        },
        format,
    }
}

/// The fakes a tile is built with, kept concretely typed for inspection.
#[derive(Clone)]
pub struct TestServices {
    pub renderer: Arc<FakeRenderer>,
    pub streaming: Arc<ScriptedStreamingService>,
    pub constants: Arc<StubConstantBuffers>,
    pub shader_pass: Arc<StubShaderPass>,
}

impl TestServices {
    pub fn new(streaming: ScriptedStreamingService) -> Self {
        Self {
            renderer: Arc::new(FakeRenderer::new()),
            streaming: Arc::new(streaming),
            constants: Arc::new(StubConstantBuffers::new()),
            shader_pass: Arc::new(StubShaderPass::default()),
        }
    }

    pub fn tile_services(&self) -> TileServices {
        TileServices {
            renderer: self.renderer.clone(),
            streaming: self.streaming.clone(),
            constants: self.constants.clone(),
            shader_pass: self.shader_pass.clone(),
        }
    }
}
