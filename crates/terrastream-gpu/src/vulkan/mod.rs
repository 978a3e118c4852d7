//! Vulkan backend.
//!
//! Implements the backend-neutral seams on top of `ash` and
//! `gpu-allocator`. Instance/device bootstrap is left to the caller, who
//! hands the created `ash::Device` to [`VulkanRenderer`].

pub mod allocator;
pub mod command;
pub mod device;
pub mod format;
pub mod pipeline;
pub mod renderer;
pub mod sync;

pub use allocator::{VkBuffer, VkImage, VulkanAllocator};
pub use command::{execute_single_time_commands, CommandPool, VulkanCommandList};
pub use device::{heap_set_layout, VulkanDevice};
pub use format::to_vk_format;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use renderer::VulkanRenderer;
pub use sync::{FrameSync, FrameSyncManager};
