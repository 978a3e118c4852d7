//! A terrain tile whose texture is streamed in after the tile is created.
//!
//! The tile draws from its first frame. Until the streaming service reports
//! the texture `Available` it draws untextured (vertex colors only); once a
//! view of the texture has been written into the tile's texture heap it
//! binds that heap on every draw.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use terrastream_core::constants::{CONSTANTS_ROOT_SLOT, TEXTURE_ROOT_SLOT, TILE_VERTEX_COUNT};
use terrastream_core::{TileCoord, TILE_VERTICES};
use terrastream_gpu::{
    CommandList, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapKind, GpuError,
    PrimitiveTopology, Renderer, ShaderResourceViewDesc, VertexBufferView,
};
use terrastream_streaming::{ResourceState, StreamingService};

use crate::config::TileConfig;
use crate::constants::ConstantBufferManager;
use crate::error::{InitStage, Result, TileError};
use crate::geometry::StaticGeometry;
use crate::shader_pass::ShaderPass;

/// Collaborators a tile is built with.
#[derive(Clone)]
pub struct TileServices {
    pub renderer: Arc<dyn Renderer>,
    pub streaming: Arc<dyn StreamingService>,
    pub constants: Arc<dyn ConstantBufferManager>,
    pub shader_pass: Arc<dyn ShaderPass>,
}

/// Whether draws bind the streamed texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Untextured,
    Textured,
}

impl RenderMode {
    pub const fn is_textured(self) -> bool {
        matches!(self, Self::Textured)
    }
}

struct TileResources {
    geometry: StaticGeometry,
    texture_heap: DescriptorHeap,
    /// Per-tile constants slot. Draws bind the shared heap instead.
    constants_heap: DescriptorHeap,
}

/// A single streamed terrain tile.
pub struct TerrainTile {
    services: TileServices,
    config: TileConfig,
    resource_name: String,
    resources: ManuallyDrop<TileResources>,
    mode: RenderMode,
    /// Views written into the texture slot so far.
    views_written: u32,
}

fn fatal(stage: InitStage) -> impl FnOnce(GpuError) -> TileError {
    move |source| TileError::FatalInit { stage, source }
}

fn release_geometry(renderer: &dyn Renderer, geometry: StaticGeometry) {
    if let Err(e) = geometry.release(renderer.allocator()) {
        tracing::warn!("Failed to free tile vertex buffer: {e}");
    }
}

impl TerrainTile {
    /// Create the tile's GPU resources.
    ///
    /// Builds the shader pass, uploads the vertex buffer, waits for the
    /// previous frame and creates the texture and constants heaps, in that
    /// order. If a step fails, whatever earlier steps created is released
    /// before the error is returned.
    pub fn allocate_resources(config: TileConfig, services: TileServices) -> Result<Self> {
        let renderer = services.renderer.as_ref();
        let device = renderer.device();

        services
            .shader_pass
            .create(renderer)
            .map_err(fatal(InitStage::ShaderPass))?;

        let geometry = StaticGeometry::upload(
            renderer.allocator(),
            &TILE_VERTICES,
            &format!("tile {} vertices", config.coord),
        )
        .map_err(fatal(InitStage::GeometryUpload))?;

        if let Err(e) = renderer.wait_for_previous_frame() {
            release_geometry(renderer, geometry);
            return Err(fatal(InitStage::FrameSync)(e));
        }

        let texture_heap = match device
            .create_descriptor_heap(&DescriptorHeapDesc::single_slot(DescriptorHeapKind::ShaderResource))
        {
            Ok(heap) => heap,
            Err(e) => {
                release_geometry(renderer, geometry);
                return Err(fatal(InitStage::TextureHeap)(e));
            }
        };

        let constants_heap = match device
            .create_descriptor_heap(&DescriptorHeapDesc::single_slot(DescriptorHeapKind::Constant))
        {
            Ok(heap) => heap,
            Err(e) => {
                device.destroy_descriptor_heap(texture_heap);
                release_geometry(renderer, geometry);
                return Err(fatal(InitStage::ConstantsHeap)(e));
            }
        };

        let resource_name = config.resource_name();
        tracing::info!("Allocated terrain tile {} streaming {resource_name}", config.coord);

        Ok(Self {
            services,
            config,
            resource_name,
            resources: ManuallyDrop::new(TileResources {
                geometry,
                texture_heap,
                constants_heap,
            }),
            mode: RenderMode::Untextured,
            views_written: 0,
        })
    }

    /// Poll the streaming service and bind the texture once it is available.
    ///
    /// Never blocks on the streamer and never fails: a view that cannot be
    /// written is logged and retried on the next call. Once textured, the
    /// tile stops polling and only marks its texture as used.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn update(&mut self) -> RenderMode {
        if self.mode.is_textured() {
            self.services.streaming.mark_used(&self.resource_name);
            return self.mode;
        }

        let streaming = self.services.streaming.as_ref();
        let state = streaming.query(&self.resource_name);
        tracing::trace!("{} is {state}", self.resource_name);
        if state != ResourceState::Available {
            return self.mode;
        }

        let Some(handle) = streaming.get(&self.resource_name) else {
            tracing::warn!("{} reported available without a handle", self.resource_name);
            return self.mode;
        };

        let renderer = self.services.renderer.as_ref();
        // The slot may still be read by a frame that bound the previous view.
        if self.views_written > 0 {
            if let Err(e) = renderer.wait_for_previous_frame() {
                tracing::warn!("Cannot rebind {}: {e}", self.resource_name);
                return self.mode;
            }
        }

        let desc = ShaderResourceViewDesc::texture_2d(handle.format);
        match renderer.device().create_shader_resource_view(
            &handle.image,
            &desc,
            &self.resources.texture_heap,
            0,
        ) {
            Ok(()) => {
                self.views_written += 1;
                self.mode = RenderMode::Textured;
                tracing::debug!(
                    "Bound {} ({:?}) to tile {}",
                    self.resource_name,
                    handle.format,
                    self.config.coord
                );
            }
            Err(e) => {
                tracing::warn!("Failed to write view of {}: {e}", self.resource_name);
            }
        }

        self.mode
    }

    /// Record the tile's draw.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn render(&self, command_list: &mut dyn CommandList) {
        self.services.shader_pass.setup(command_list);

        if self.mode.is_textured() {
            let heap = &self.resources.texture_heap;
            command_list.set_descriptor_heaps(&[heap]);
            command_list.set_graphics_root_descriptor_table(TEXTURE_ROOT_SLOT, heap.gpu_start);
        }

        let constants = self.services.constants.heap();
        command_list.set_descriptor_heaps(&[constants]);
        command_list.set_graphics_root_descriptor_table(CONSTANTS_ROOT_SLOT, constants.gpu_start);

        command_list.set_primitive_topology(PrimitiveTopology::TriangleList);
        command_list.set_vertex_buffers(0, std::slice::from_ref(self.resources.geometry.view()));
        command_list.draw_instanced(TILE_VERTEX_COUNT, 1, 0, 0);
    }

    /// Forget the bound texture if `name` is this tile's resource.
    ///
    /// The next [`Self::update`] polls again and rewrites the slot once the
    /// resource is back. Returns whether the tile was affected.
    pub fn on_resource_evicted(&mut self, name: &str) -> bool {
        if name != self.resource_name || !self.mode.is_textured() {
            return false;
        }
        self.mode = RenderMode::Untextured;
        tracing::debug!("{name} evicted, tile {} untextured", self.config.coord);
        true
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_textured(&self) -> bool {
        self.mode.is_textured()
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn coord(&self) -> TileCoord {
        self.config.coord
    }

    pub fn config(&self) -> &TileConfig {
        &self.config
    }

    pub fn vertex_buffer_view(&self) -> &VertexBufferView {
        self.resources.geometry.view()
    }

    pub fn texture_heap(&self) -> &DescriptorHeap {
        &self.resources.texture_heap
    }

    pub fn constants_heap(&self) -> &DescriptorHeap {
        &self.resources.constants_heap
    }
}

impl Drop for TerrainTile {
    fn drop(&mut self) {
        let renderer = self.services.renderer.as_ref();
        if let Err(e) = renderer.wait_for_previous_frame() {
            tracing::warn!("Waiting for the previous frame before releasing tile failed: {e}");
        }

        // SAFETY: read exactly once, here, and never touched again.
        let resources = unsafe { ManuallyDrop::take(&mut self.resources) };
        let device = renderer.device();
        device.destroy_descriptor_heap(resources.texture_heap);
        device.destroy_descriptor_heap(resources.constants_heap);
        release_geometry(renderer, resources.geometry);
    }
}
