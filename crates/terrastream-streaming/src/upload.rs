//! Moving decoded textures into GPU-visible images.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use parking_lot::Mutex;
use terrastream_gpu::vulkan::{
    execute_single_time_commands, to_vk_format, CommandPool, VkImage, VulkanAllocator,
};
use terrastream_gpu::{Extent2D, GpuError, ImageId, ImageRef};

use crate::source::DecodedTexture;
use crate::state::ResourceHandle;

/// Turns decoded textures into resident images.
///
/// `upload` runs on the streaming worker (possibly on several rayon threads
/// at once) and returns only once the image is usable by the GPU.
pub trait TextureUploader: Send + Sync {
    fn upload(&self, name: &str, texture: &DecodedTexture) -> terrastream_gpu::Result<ResourceHandle>;

    /// Free an image produced by `upload`. The GPU must no longer use it.
    fn release(&self, handle: ResourceHandle);
}

/// Keeps decoded pixels in host memory under synthetic image ids.
///
/// Used for headless tooling and tests where no device exists.
#[derive(Debug)]
pub struct HostTextureUploader {
    next_id: AtomicU64,
    textures: Mutex<HashMap<ImageId, DecodedTexture>>,
}

impl Default for HostTextureUploader {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            textures: Mutex::new(HashMap::new()),
        }
    }
}

impl HostTextureUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures uploaded and not yet released.
    pub fn resident_count(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn pixels(&self, id: ImageId) -> Option<Vec<u8>> {
        self.textures.lock().get(&id).map(|t| t.pixels.clone())
    }
}

impl TextureUploader for HostTextureUploader {
    fn upload(&self, name: &str, texture: &DecodedTexture) -> terrastream_gpu::Result<ResourceHandle> {
        let id = ImageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.textures.lock().insert(id, texture.clone());
        tracing::trace!("Host upload of {name} as image {}", id.0);

        Ok(ResourceHandle {
            image: ImageRef {
                id,
                extent: Extent2D {
                    width: texture.width,
                    height: texture.height,
                },
                mip_levels: 1,
            },
            format: texture.format,
        })
    }

    fn release(&self, handle: ResourceHandle) {
        if self.textures.lock().remove(&handle.image.id).is_none() {
            tracing::warn!("Releasing unknown host image {}", handle.image.id.0);
        }
    }
}

struct Submission {
    queue: vk::Queue,
    pool: CommandPool,
}

/// Uploads through a host-visible staging buffer into a device-local image,
/// then transitions it to `SHADER_READ_ONLY_OPTIMAL`.
///
/// Submissions are serialized on one queue and fenced before returning.
pub struct VulkanTextureUploader {
    device: Arc<ash::Device>,
    allocator: Arc<VulkanAllocator>,
    submission: Mutex<Submission>,
    images: Mutex<HashMap<ImageId, VkImage>>,
}

impl VulkanTextureUploader {
    /// Create an uploader submitting to `queue`.
    ///
    /// # Safety
    /// The device and queue must be valid, `queue` must belong to
    /// `queue_family` and support transfer, and no other thread may submit
    /// to `queue` while an upload is running.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        allocator: Arc<VulkanAllocator>,
        queue: vk::Queue,
        queue_family: u32,
    ) -> terrastream_gpu::Result<Self> {
        let pool = unsafe {
            CommandPool::new(&device, queue_family, vk::CommandPoolCreateFlags::TRANSIENT)?
        };

        Ok(Self {
            device,
            allocator,
            submission: Mutex::new(Submission { queue, pool }),
            images: Mutex::new(HashMap::new()),
        })
    }

    /// Number of images uploaded and not yet released.
    pub fn resident_count(&self) -> usize {
        self.images.lock().len()
    }

    fn record_copy(
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        staging: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent3D,
    ) {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        let to_transfer = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image(image)
            .subresource_range(range);

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(extent);

        let to_shader = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags2::SHADER_SAMPLED_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image(image)
            .subresource_range(range);

        unsafe {
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_transfer)),
            );
            device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_shader)),
            );
        }
    }
}

impl TextureUploader for VulkanTextureUploader {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn upload(&self, name: &str, texture: &DecodedTexture) -> terrastream_gpu::Result<ResourceHandle> {
        let expected = texture.format.image_size(texture.width, texture.height);
        if texture.pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "{name}: {} pixel bytes for a {}x{} {:?} image",
                texture.pixels.len(),
                texture.width,
                texture.height,
                texture.format
            )));
        }

        let mut staging = self.allocator.create_raw_buffer(
            expected,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            name,
        )?;

        let extent = vk::Extent3D {
            width: texture.width,
            height: texture.height,
            depth: 1,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(to_vk_format(texture.format))
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let uploaded = staging.write_bytes(0, &texture.pixels).and_then(|()| {
            let mut image =
                self.allocator
                    .create_image(&image_info, MemoryLocation::GpuOnly, name)?;

            let submission = self.submission.lock();
            let copied = unsafe {
                execute_single_time_commands(
                    &self.device,
                    &submission.pool,
                    submission.queue,
                    |cmd| Self::record_copy(&self.device, cmd, staging.buffer, image.image, extent),
                )
            };
            drop(submission);

            match copied {
                Ok(()) => Ok(image),
                Err(e) => {
                    if let Err(free_err) = self.allocator.free_image(&mut image) {
                        tracing::warn!("Failed to free image for {name} after a failed copy: {free_err}");
                    }
                    Err(e)
                }
            }
        });

        if let Err(e) = self.allocator.free_raw_buffer(&mut staging) {
            tracing::warn!("Failed to free staging buffer for {name}: {e}");
        }

        let image = uploaded?;
        let id = ImageId(image.image.as_raw());
        self.images.lock().insert(id, image);

        tracing::debug!(
            "Uploaded {name} ({}x{}, {:?})",
            texture.width,
            texture.height,
            texture.format
        );

        Ok(ResourceHandle {
            image: ImageRef {
                id,
                extent: Extent2D {
                    width: texture.width,
                    height: texture.height,
                },
                mip_levels: 1,
            },
            format: texture.format,
        })
    }

    fn release(&self, handle: ResourceHandle) {
        let image = self.images.lock().remove(&handle.image.id);
        match image {
            Some(mut image) => {
                if let Err(e) = self.allocator.free_image(&mut image) {
                    tracing::warn!("Failed to free image {}: {e}", handle.image.id.0);
                }
            }
            None => tracing::warn!("Releasing unknown image {}", handle.image.id.0),
        }
    }
}

impl Drop for VulkanTextureUploader {
    fn drop(&mut self) {
        let leaked: Vec<VkImage> = self.images.lock().drain().map(|(_, image)| image).collect();
        for mut image in leaked {
            tracing::warn!("Freeing streamed image still resident at shutdown");
            if let Err(e) = self.allocator.free_image(&mut image) {
                tracing::warn!("Failed to free streamed image at shutdown: {e}");
            }
        }
        unsafe {
            self.submission.lock().pool.destroy(&self.device);
        }
    }
}
