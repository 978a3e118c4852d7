//! GPU abstraction layer for the Terrastream terrain renderer.
//!
//! This crate provides:
//! - Backend-neutral seams: [`MemoryAllocator`], [`GpuDevice`], [`Renderer`]
//!   and [`CommandList`]
//! - Descriptor heaps and shader resource view descriptions
//! - A recording command list for inspecting draw submissions
//! - Frame-deferred resource release
//! - A Vulkan backend built on `ash` and `gpu-allocator`

pub mod command;
pub mod deferred;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod memory;
pub mod renderer;
pub mod vulkan;

pub use command::{
    Command, CommandList, PipelineBinding, PipelineId, PrimitiveTopology, RecordingCommandList,
    RootSignatureId, RootTableTracker, VertexBufferView,
};
pub use deferred::{DeferredReleaseQueue, PendingRelease};
pub use descriptors::{
    ComponentMapping, ComponentSwizzle, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind,
    GpuDescriptorHandle, HeapId, ShaderResourceViewDesc, ViewDimension,
};
pub use device::GpuDevice;
pub use error::{GpuError, Result};
pub use memory::{
    BufferDesc, BufferId, BufferUsage, Extent2D, GpuAddress, GpuBuffer, HeapType, ImageId,
    ImageRef, MemoryAllocator,
};
pub use renderer::Renderer;
