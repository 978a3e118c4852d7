//! Descriptor heaps on Vulkan descriptor pools.
//!
//! Each heap is one descriptor pool holding one set with a single arrayed
//! binding of `capacity` elements. Heap slots map to array elements;
//! root table slots map to descriptor set indices (see `VulkanCommandList`).

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::descriptors::{
    ComponentMapping, ComponentSwizzle, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind,
    GpuDescriptorHandle, HeapId, ShaderResourceViewDesc, ViewDimension,
};
use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use crate::memory::{GpuBuffer, ImageRef};
use crate::vulkan::format::to_vk_format;

/// Binding index used by every heap's set layout.
const HEAP_BINDING: u32 = 0;

const fn descriptor_type(kind: DescriptorHeapKind) -> vk::DescriptorType {
    match kind {
        DescriptorHeapKind::ShaderResource => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorHeapKind::Constant => vk::DescriptorType::UNIFORM_BUFFER,
    }
}

/// Create the descriptor set layout matching a heap of `kind` with
/// `capacity` slots.
///
/// Pipelines built from layouts created here are compatible with the sets
/// of every heap of the same kind and capacity.
///
/// # Safety
/// The device must be valid.
pub unsafe fn heap_set_layout(
    device: &ash::Device,
    kind: DescriptorHeapKind,
    capacity: u32,
) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding::default()
        .binding(HEAP_BINDING)
        .descriptor_type(descriptor_type(kind))
        .descriptor_count(capacity)
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);

    let layout_info =
        vk::DescriptorSetLayoutCreateInfo::default().bindings(std::slice::from_ref(&binding));

    let layout = device.create_descriptor_set_layout(&layout_info, None)?;
    Ok(layout)
}

const fn swizzle(component: ComponentSwizzle) -> vk::ComponentSwizzle {
    match component {
        ComponentSwizzle::Identity => vk::ComponentSwizzle::IDENTITY,
        ComponentSwizzle::Zero => vk::ComponentSwizzle::ZERO,
        ComponentSwizzle::One => vk::ComponentSwizzle::ONE,
    }
}

const fn component_mapping(mapping: ComponentMapping) -> vk::ComponentMapping {
    vk::ComponentMapping {
        r: swizzle(mapping.r),
        g: swizzle(mapping.g),
        b: swizzle(mapping.b),
        a: swizzle(mapping.a),
    }
}

struct HeapRecord {
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
    desc: DescriptorHeapDesc,
    views: Vec<Option<(vk::ImageView, ShaderResourceViewDesc)>>,
}

/// Vulkan implementation of [`GpuDevice`].
pub struct VulkanDevice {
    device: Arc<ash::Device>,
    sampler: vk::Sampler,
    heaps: Mutex<HashMap<HeapId, HeapRecord>>,
}

impl VulkanDevice {
    /// Wrap a logical device.
    ///
    /// # Safety
    /// The device must be valid and outlive the returned value.
    pub unsafe fn new(device: Arc<ash::Device>) -> Result<Self> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = device.create_sampler(&sampler_info, None)?;

        Ok(Self {
            device,
            sampler,
            heaps: Mutex::new(HashMap::new()),
        })
    }

    /// Get the Vulkan device handle.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Number of heaps created and not yet destroyed.
    pub fn live_heap_count(&self) -> usize {
        self.heaps.lock().len()
    }

    unsafe fn destroy_record(&self, record: HeapRecord) {
        for (view, _) in record.views.into_iter().flatten() {
            self.device.destroy_image_view(view, None);
        }
        // Destroying the pool frees the set allocated from it.
        self.device.destroy_descriptor_pool(record.pool, None);
        self.device.destroy_descriptor_set_layout(record.layout, None);
    }

    fn expect_kind(record: &HeapRecord, kind: DescriptorHeapKind, slot: u32) -> Result<()> {
        if record.desc.kind != kind {
            return Err(GpuError::ViewCreation(format!(
                "heap holds {:?} views, not {kind:?}",
                record.desc.kind
            )));
        }
        if slot >= record.desc.capacity {
            return Err(GpuError::ViewCreation(format!(
                "slot {slot} out of range for heap of capacity {}",
                record.desc.capacity
            )));
        }
        Ok(())
    }
}

impl GpuDevice for VulkanDevice {
    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> Result<DescriptorHeap> {
        if desc.capacity == 0 {
            return Err(GpuError::HeapCreation("capacity must be non-zero".to_string()));
        }

        let layout = unsafe { heap_set_layout(&self.device, desc.kind, desc.capacity) }
            .map_err(|e| GpuError::HeapCreation(e.to_string()))?;

        let pool_size = vk::DescriptorPoolSize::default()
            .ty(descriptor_type(desc.kind))
            .descriptor_count(desc.capacity);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(std::slice::from_ref(&pool_size));

        let pool = match unsafe { self.device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
                return Err(GpuError::HeapCreation(e.to_string()));
            }
        };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let set = match unsafe { self.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets[0],
            Err(e) => {
                unsafe {
                    self.device.destroy_descriptor_pool(pool, None);
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(GpuError::HeapCreation(e.to_string()));
            }
        };

        let id = HeapId(pool.as_raw());
        self.heaps.lock().insert(
            id,
            HeapRecord {
                pool,
                layout,
                set,
                desc: *desc,
                views: vec![None; desc.capacity as usize],
            },
        );

        tracing::debug!("Created {:?} descriptor heap with {} slots", desc.kind, desc.capacity);

        Ok(DescriptorHeap {
            id,
            desc: *desc,
            gpu_start: GpuDescriptorHandle(set.as_raw()),
        })
    }

    fn destroy_descriptor_heap(&self, heap: DescriptorHeap) {
        let record = self.heaps.lock().remove(&heap.id);
        match record {
            Some(record) => unsafe { self.destroy_record(record) },
            None => tracing::warn!("Destroying unknown descriptor heap {}", heap.id.0),
        }
    }

    fn create_shader_resource_view(
        &self,
        image: &ImageRef,
        desc: &ShaderResourceViewDesc,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Result<()> {
        let mut heaps = self.heaps.lock();
        let record = heaps
            .get_mut(&heap.id)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("descriptor heap {}", heap.id.0)))?;
        Self::expect_kind(record, DescriptorHeapKind::ShaderResource, slot)?;

        let ViewDimension::Texture2D {
            most_detailed_mip,
            mip_levels,
        } = desc.dimension;
        if most_detailed_mip + mip_levels > image.mip_levels {
            return Err(GpuError::ViewCreation(format!(
                "mips {most_detailed_mip}..{} exceed the image's {} levels",
                most_detailed_mip + mip_levels,
                image.mip_levels
            )));
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(vk::Image::from_raw(image.id.0))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(to_vk_format(desc.format))
            .components(component_mapping(desc.mapping))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: most_detailed_mip,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { self.device.create_image_view(&view_info, None) }
            .map_err(|e| GpuError::ViewCreation(e.to_string()))?;

        let image_info = vk::DescriptorImageInfo::default()
            .sampler(self.sampler)
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let write = vk::WriteDescriptorSet::default()
            .dst_set(record.set)
            .dst_binding(HEAP_BINDING)
            .dst_array_element(slot)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info));

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };

        if let Some((previous, _)) = record.views[slot as usize].replace((view, *desc)) {
            unsafe { self.device.destroy_image_view(previous, None) };
        }

        Ok(())
    }

    fn read_shader_resource_view(
        &self,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Option<ShaderResourceViewDesc> {
        let heaps = self.heaps.lock();
        let record = heaps.get(&heap.id)?;
        record
            .views
            .get(slot as usize)
            .and_then(|view| view.as_ref().map(|(_, desc)| *desc))
    }

    fn create_constant_buffer_view(
        &self,
        buffer: &GpuBuffer,
        heap: &DescriptorHeap,
        slot: u32,
    ) -> Result<()> {
        let heaps = self.heaps.lock();
        let record = heaps
            .get(&heap.id)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("descriptor heap {}", heap.id.0)))?;
        Self::expect_kind(record, DescriptorHeapKind::Constant, slot)?;

        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(vk::Buffer::from_raw(buffer.id.0))
            .offset(0)
            .range(buffer.size);

        let write = vk::WriteDescriptorSet::default()
            .dst_set(record.set)
            .dst_binding(HEAP_BINDING)
            .dst_array_element(slot)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info));

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let leaked: Vec<HeapRecord> = self.heaps.lock().drain().map(|(_, r)| r).collect();
        unsafe {
            for record in leaked {
                self.destroy_record(record);
            }
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
