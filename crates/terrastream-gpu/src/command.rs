//! Command list seam.
//!
//! Renderable objects record into a [`CommandList`]; the Vulkan backend
//! translates the calls into a `vk::CommandBuffer`, while
//! [`RecordingCommandList`] keeps them as data for inspection.

use std::fmt;

use crate::descriptors::{DescriptorHeap, GpuDescriptorHandle, HeapId};
use crate::memory::{BufferId, GpuAddress};

/// Opaque root signature (pipeline layout) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootSignatureId(pub u64);

/// Opaque pipeline state identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u64);

/// Root signature + pipeline state pair configured by a shader pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineBinding {
    pub root_signature: RootSignatureId,
    pub pipeline: PipelineId,
}

/// Primitive topology used by draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// View of a vertex buffer bound to an input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferView {
    pub buffer: BufferId,
    pub location: GpuAddress,
    pub stride: u32,
    pub size_in_bytes: u32,
}

impl VertexBufferView {
    /// Number of whole vertices covered by the view.
    pub const fn vertex_count(&self) -> u32 {
        if self.stride == 0 {
            0
        } else {
            self.size_in_bytes / self.stride
        }
    }
}

/// A graphics command stream.
pub trait CommandList {
    /// Configure root signature and pipeline state.
    fn set_pipeline(&mut self, binding: PipelineBinding);

    /// Make `heaps` the active descriptor heap set.
    fn set_descriptor_heaps(&mut self, heaps: &[&DescriptorHeap]);

    /// Bind a descriptor table to a root parameter slot.
    fn set_graphics_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle);

    /// Set the input assembler topology.
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    /// Bind vertex buffers starting at input slot `start_slot`.
    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);

    /// Issue a non-indexed draw.
    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );
}

/// A single recorded command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    SetPipeline(PipelineBinding),
    SetDescriptorHeaps(Vec<HeapId>),
    SetRootDescriptorTable {
        slot: u32,
        table: GpuDescriptorHandle,
    },
    SetPrimitiveTopology(PrimitiveTopology),
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetPipeline(binding) => write!(
                f,
                "set_pipeline root_signature={} pipeline={}",
                binding.root_signature.0, binding.pipeline.0
            ),
            Self::SetDescriptorHeaps(heaps) => {
                let ids: Vec<String> = heaps.iter().map(|h| h.0.to_string()).collect();
                write!(f, "set_descriptor_heaps [{}]", ids.join(", "))
            }
            Self::SetRootDescriptorTable { slot, table } => {
                write!(f, "set_root_table slot={slot} table={}", table.0)
            }
            Self::SetPrimitiveTopology(topology) => write!(f, "set_topology {topology:?}"),
            Self::SetVertexBuffers { start_slot, views } => {
                write!(f, "set_vertex_buffers start={start_slot}")?;
                for view in views {
                    write!(
                        f,
                        " [buffer={} stride={} size={}]",
                        view.buffer.0, view.stride, view.size_in_bytes
                    )?;
                }
                Ok(())
            }
            Self::DrawInstanced {
                vertex_count,
                instance_count,
                start_vertex,
                start_instance,
            } => write!(
                f,
                "draw vertices={vertex_count} instances={instance_count} \
                 first_vertex={start_vertex} first_instance={start_instance}"
            ),
        }
    }
}

/// Root table slots bound since the last pipeline change.
///
/// Backends whose pipeline layouts require every declared table to be bound
/// at draw time register a fallback table per slot; slots left unbound are
/// filled from it before the draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootTableTracker {
    bound: u64,
    fallbacks: Vec<(u32, GpuDescriptorHandle)>,
}

impl RootTableTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `table` for `slot` when a draw finds it unbound.
    pub fn set_fallback(&mut self, slot: u32, table: GpuDescriptorHandle) {
        debug_assert!(slot < u64::BITS, "root table slot {slot} out of range");
        self.fallbacks.retain(|(s, _)| *s != slot);
        self.fallbacks.push((slot, table));
    }

    /// Forget all bindings. A new pipeline layout invalidates them.
    pub fn reset(&mut self) {
        self.bound = 0;
    }

    pub fn mark_bound(&mut self, slot: u32) {
        if slot < u64::BITS {
            self.bound |= 1 << slot;
        }
    }

    pub fn is_bound(&self, slot: u32) -> bool {
        slot < u64::BITS && self.bound & (1 << slot) != 0
    }

    /// Fallback tables for slots that are still unbound, marking them bound.
    pub fn take_unbound_fallbacks(&mut self) -> Vec<(u32, GpuDescriptorHandle)> {
        let missing: Vec<_> = self
            .fallbacks
            .iter()
            .copied()
            .filter(|(slot, _)| !self.is_bound(*slot))
            .collect();
        for (slot, _) in &missing {
            self.mark_bound(*slot);
        }
        missing
    }
}

/// Command list that records commands as data.
///
/// Used by tests and tooling to inspect what a renderable emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingCommandList {
    commands: Vec<Command>,
}

impl RecordingCommandList {
    /// Create an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Take the recorded commands, leaving the list empty.
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Root parameter slots bound by `SetRootDescriptorTable`, in order.
    pub fn bound_root_slots(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::SetRootDescriptorTable { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect()
    }

    /// One line per command.
    pub fn to_text(&self) -> String {
        self.commands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl CommandList for RecordingCommandList {
    fn set_pipeline(&mut self, binding: PipelineBinding) {
        self.commands.push(Command::SetPipeline(binding));
    }

    fn set_descriptor_heaps(&mut self, heaps: &[&DescriptorHeap]) {
        self.commands
            .push(Command::SetDescriptorHeaps(heaps.iter().map(|h| h.id).collect()));
    }

    fn set_graphics_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        self.commands
            .push(Command::SetRootDescriptorTable { slot, table });
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.commands.push(Command::SetPrimitiveTopology(topology));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.commands.push(Command::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.commands.push(Command::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        });
    }
}
