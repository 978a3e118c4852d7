//! Command buffer management and the Vulkan command list.

use ash::vk;
use ash::vk::Handle;

use crate::command::{
    CommandList, PipelineBinding, PrimitiveTopology, RootTableTracker, VertexBufferView,
};
use crate::descriptors::{DescriptorHeap, GpuDescriptorHandle};
use crate::error::Result;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = device.allocate_command_buffers(&alloc_info)?;
        Ok(buffers[0])
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Record and synchronously execute a one-off command buffer.
///
/// Returns once the queue has finished executing it.
///
/// # Safety
/// All handles must be valid and `queue` must not be used concurrently.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = pool.allocate_command_buffer(device)?;

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(cmd, &begin_info)?;
    f(cmd);
    device.end_command_buffer(cmd)?;

    let fence = device.create_fence(&vk::FenceCreateInfo::default(), None)?;
    let cmd_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);

    let result = device
        .queue_submit(queue, &[submit_info], fence)
        .and_then(|()| device.wait_for_fences(&[fence], true, u64::MAX));

    device.destroy_fence(fence, None);
    device.free_command_buffers(pool.handle(), &cmd_buffers);

    result?;
    Ok(())
}

const fn vk_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

/// [`CommandList`] recording into a Vulkan command buffer.
///
/// Root table slot `N` binds descriptor set `N` of the current pipeline
/// layout. Vulkan has no notion of an active heap set, so
/// `set_descriptor_heaps` records nothing.
///
/// The tile pipeline layout declares a texture set that untextured tiles
/// never bind, and Vulkan requires every set a pipeline statically uses to
/// be bound at draw time. Register a placeholder with
/// [`Self::with_fallback_table`], typically a single-slot shader-resource
/// heap holding a view of a 1x1 image, and draws bind it to any slot left
/// unbound since the last `set_pipeline`.
pub struct VulkanCommandList<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    layout: Option<vk::PipelineLayout>,
    tables: RootTableTracker,
}

impl<'a> VulkanCommandList<'a> {
    /// Wrap a command buffer in the recording state.
    ///
    /// # Safety
    /// `cmd` must be a valid command buffer in the recording state, inside
    /// a dynamic rendering scope, for the lifetime of the returned value.
    pub unsafe fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self {
            device,
            cmd,
            layout: None,
            tables: RootTableTracker::new(),
        }
    }

    /// Bind `table` to `slot` before any draw that left the slot unbound.
    pub fn with_fallback_table(mut self, slot: u32, table: GpuDescriptorHandle) -> Self {
        self.tables.set_fallback(slot, table);
        self
    }

    fn bind_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        let Some(layout) = self.layout else {
            debug_assert!(false, "root table bound before a pipeline was set");
            return;
        };
        let sets = [vk::DescriptorSet::from_raw(table.0)];
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                slot,
                &sets,
                &[],
            );
        }
        self.tables.mark_bound(slot);
    }

    /// The wrapped command buffer.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

impl CommandList for VulkanCommandList<'_> {
    fn set_pipeline(&mut self, binding: PipelineBinding) {
        let pipeline = vk::Pipeline::from_raw(binding.pipeline.0);
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        self.layout = Some(vk::PipelineLayout::from_raw(binding.root_signature.0));
        self.tables.reset();
    }

    fn set_descriptor_heaps(&mut self, heaps: &[&DescriptorHeap]) {
        tracing::trace!("set_descriptor_heaps({}) is implicit on Vulkan", heaps.len());
    }

    fn set_graphics_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        self.bind_table(slot, table);
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        unsafe {
            self.device
                .cmd_set_primitive_topology(self.cmd, vk_topology(topology));
        }
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        // Bounded by the vertex input binding count of the pipeline.
        let mut buffers = [vk::Buffer::null(); 4];
        let offsets = [0u64; 4];
        let count = views.len().min(buffers.len());
        debug_assert_eq!(count, views.len(), "too many vertex buffer views");

        for (i, view) in views.iter().take(count).enumerate() {
            buffers[i] = vk::Buffer::from_raw(view.buffer.0);
        }

        unsafe {
            self.device.cmd_bind_vertex_buffers(
                self.cmd,
                start_slot,
                &buffers[..count],
                &offsets[..count],
            );
        }
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        for (slot, table) in self.tables.take_unbound_fallbacks() {
            tracing::trace!("Binding fallback table to root slot {slot}");
            self.bind_table(slot, table);
        }
        unsafe {
            self.device.cmd_draw(
                self.cmd,
                vertex_count,
                instance_count,
                start_vertex,
                start_instance,
            );
        }
    }
}
