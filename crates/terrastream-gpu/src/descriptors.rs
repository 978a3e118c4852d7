//! Descriptor heaps and view descriptions.

use terrastream_core::PixelFormat;

/// Kind of views a descriptor heap holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Sampled texture views.
    ShaderResource,
    /// Constant (uniform) buffer views.
    Constant,
}

/// Descriptor heap creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHeapDesc {
    pub kind: DescriptorHeapKind,
    /// Number of view slots. Fixed for the heap's lifetime.
    pub capacity: u32,
    /// Whether the heap can be bound to the pipeline.
    pub shader_visible: bool,
}

impl DescriptorHeapDesc {
    /// Shader-visible heap with a single slot.
    pub const fn single_slot(kind: DescriptorHeapKind) -> Self {
        Self {
            kind,
            capacity: 1,
            shader_visible: true,
        }
    }
}

/// Opaque heap identifier. The Vulkan backend stores the raw `VkDescriptorPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub u64);

/// GPU handle of the first slot of a heap, used to bind descriptor tables.
/// The Vulkan backend stores the raw `VkDescriptorSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpuDescriptorHandle(pub u64);

/// A descriptor heap.
///
/// Owned by whoever created it; destroy it through the device that
/// produced it.
#[derive(Debug, PartialEq, Eq)]
pub struct DescriptorHeap {
    pub id: HeapId,
    pub desc: DescriptorHeapDesc,
    pub gpu_start: GpuDescriptorHandle,
}

impl DescriptorHeap {
    /// Number of view slots.
    pub fn capacity(&self) -> u32 {
        self.desc.capacity
    }
}

/// Dimension of a shader-resource view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    Texture2D { most_detailed_mip: u32, mip_levels: u32 },
}

/// Source of one channel in a view's component mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentSwizzle {
    Identity,
    Zero,
    One,
}

/// Per-channel swizzle applied when sampling through a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentMapping {
    pub r: ComponentSwizzle,
    pub g: ComponentSwizzle,
    pub b: ComponentSwizzle,
    pub a: ComponentSwizzle,
}

impl ComponentMapping {
    /// Channels pass through unchanged.
    pub const IDENTITY: Self = Self {
        r: ComponentSwizzle::Identity,
        g: ComponentSwizzle::Identity,
        b: ComponentSwizzle::Identity,
        a: ComponentSwizzle::Identity,
    };
}

impl Default for ComponentMapping {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Typed description of how a shader samples an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderResourceViewDesc {
    pub format: PixelFormat,
    pub dimension: ViewDimension,
    pub mapping: ComponentMapping,
}

impl ShaderResourceViewDesc {
    /// Single-mip 2D view of an image in `format`.
    pub const fn texture_2d(format: PixelFormat) -> Self {
        Self {
            format,
            dimension: ViewDimension::Texture2D {
                most_detailed_mip: 0,
                mip_levels: 1,
            },
            mapping: ComponentMapping::IDENTITY,
        }
    }

    /// Number of mip levels visible through the view.
    pub const fn mip_levels(&self) -> u32 {
        match self.dimension {
            ViewDimension::Texture2D { mip_levels, .. } => mip_levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_2d_is_single_mip() {
        for format in PixelFormat::ALL {
            let desc = ShaderResourceViewDesc::texture_2d(format);
            assert_eq!(desc.format, format);
            assert_eq!(desc.mip_levels(), 1);
            assert_eq!(
                desc.dimension,
                ViewDimension::Texture2D {
                    most_detailed_mip: 0,
                    mip_levels: 1
                }
            );
            assert_eq!(desc.mapping, ComponentMapping::IDENTITY);
        }
    }

    #[test]
    fn single_slot_heap_desc() {
        let desc = DescriptorHeapDesc::single_slot(DescriptorHeapKind::Constant);
        assert_eq!(desc.capacity, 1);
        assert!(desc.shader_visible);
    }
}
