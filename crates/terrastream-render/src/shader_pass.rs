//! Shader passes: pipeline state bound before a draw.

use std::sync::Arc;

use parking_lot::Mutex;
use terrastream_gpu::vulkan::{GraphicsPipeline, GraphicsPipelineConfig};
use terrastream_gpu::{CommandList, PipelineBinding, Renderer, Result};

/// Pipeline state object shared by the draws of one material.
pub trait ShaderPass: Send + Sync {
    /// Build the pipeline. Called at tile initialization; repeated calls
    /// after a success are no-ops.
    fn create(&self, renderer: &dyn Renderer) -> Result<()>;

    /// Bind the pipeline on `command_list`.
    fn setup(&self, command_list: &mut dyn CommandList);
}

/// The terrain tile pipeline on Vulkan.
pub struct TerrainShaderPass {
    device: Arc<ash::Device>,
    config: GraphicsPipelineConfig,
    pipeline: Mutex<Option<GraphicsPipeline>>,
}

impl TerrainShaderPass {
    /// Create an unbuilt pass; the pipeline is built on the first `create`.
    ///
    /// # Safety
    /// `device` must be valid and outlive the pass, and the shaders in
    /// `config` must be valid SPIR-V matching the tile vertex layout.
    pub unsafe fn new(device: Arc<ash::Device>, config: GraphicsPipelineConfig) -> Self {
        Self {
            device,
            config,
            pipeline: Mutex::new(None),
        }
    }

    pub fn binding(&self) -> Option<PipelineBinding> {
        self.pipeline.lock().as_ref().map(GraphicsPipeline::binding)
    }
}

impl ShaderPass for TerrainShaderPass {
    fn create(&self, _renderer: &dyn Renderer) -> Result<()> {
        let mut pipeline = self.pipeline.lock();
        if pipeline.is_none() {
            *pipeline = Some(unsafe { GraphicsPipeline::new(&self.device, &self.config)? });
        }
        Ok(())
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn setup(&self, command_list: &mut dyn CommandList) {
        match self.binding() {
            Some(binding) => command_list.set_pipeline(binding),
            None => tracing::warn!("Terrain shader pass used before create"),
        }
    }
}

impl Drop for TerrainShaderPass {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.get_mut().take() {
            unsafe {
                if let Err(e) = self.device.device_wait_idle() {
                    tracing::warn!("Device wait before pipeline teardown failed: {e}");
                }
                pipeline.destroy(&self.device);
            }
        }
    }
}
