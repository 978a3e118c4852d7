//! Tile graphics pipeline.

use ash::vk;
use ash::vk::Handle;
use terrastream_core::constants::{CONSTANTS_ROOT_SLOT, TEXTURE_ROOT_SLOT, TILE_HEAP_CAPACITY};
use terrastream_core::Vertex;

use crate::command::{PipelineBinding, PipelineId, RootSignatureId};
use crate::descriptors::DescriptorHeapKind;
use crate::error::{GpuError, Result};
use crate::vulkan::device::heap_set_layout;

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            color_formats: vec![vk::Format::B8G8R8A8_SRGB],
            depth_format: Some(vk::Format::D32_SFLOAT),
        }
    }
}

/// Vertex input matching [`Vertex`]: one interleaved binding, position at
/// location 0 and color at location 1.
pub fn vertex_input_layout() -> (
    vk::VertexInputBindingDescription,
    [vk::VertexInputAttributeDescription; 2],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: Vertex::STRIDE,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: Vertex::POSITION_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: Vertex::COLOR_OFFSET,
        },
    ];
    (binding, attributes)
}

/// Graphics pipeline for tiles.
///
/// The layout has the constants heap at set [`CONSTANTS_ROOT_SLOT`] and the
/// texture heap at set [`TEXTURE_ROOT_SLOT`]. Topology is dynamic state.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    set_layouts: [vk::DescriptorSetLayout; 2],
}

impl GraphicsPipeline {
    /// Create a graphics pipeline using dynamic rendering (Vulkan 1.3).
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(device: &ash::Device, config: &GraphicsPipelineConfig) -> Result<Self> {
        debug_assert_eq!(CONSTANTS_ROOT_SLOT, 0);
        debug_assert_eq!(TEXTURE_ROOT_SLOT, 1);

        let constants_layout =
            heap_set_layout(device, DescriptorHeapKind::Constant, TILE_HEAP_CAPACITY)?;
        let texture_layout =
            match heap_set_layout(device, DescriptorHeapKind::ShaderResource, TILE_HEAP_CAPACITY) {
                Ok(layout) => layout,
                Err(e) => {
                    device.destroy_descriptor_set_layout(constants_layout, None);
                    return Err(e);
                }
            };
        let set_layouts = [constants_layout, texture_layout];

        let destroy_set_layouts = |device: &ash::Device| {
            for layout in set_layouts {
                device.destroy_descriptor_set_layout(layout, None);
            }
        };

        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                destroy_set_layouts(device);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        match Self::create_pipeline(device, config, layout) {
            Ok(pipeline) => {
                tracing::debug!("Created tile graphics pipeline");
                Ok(Self {
                    pipeline,
                    layout,
                    set_layouts,
                })
            }
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                destroy_set_layouts(device);
                Err(e)
            }
        }
    }

    unsafe fn create_pipeline(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let vert_shader_info = vk::ShaderModuleCreateInfo::default().code(&config.vertex_shader);
        let vert_module = device
            .create_shader_module(&vert_shader_info, None)
            .map_err(|e| GpuError::ShaderCompilation(format!("Vertex: {e}")))?;

        let frag_shader_info = vk::ShaderModuleCreateInfo::default().code(&config.fragment_shader);
        let frag_module = match device.create_shader_module(&frag_shader_info, None) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                return Err(GpuError::ShaderCompilation(format!("Fragment: {e}")));
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let (binding, attributes) = vertex_input_layout();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(std::slice::from_ref(&binding))
            .vertex_attribute_descriptions(&attributes);

        // Overridden per draw through dynamic state.
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<_> = config
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::PRIMITIVE_TOPOLOGY,
        ];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&config.color_formats);
        if let Some(depth_format) = config.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let result =
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);

        let pipelines = result.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
        Ok(pipelines[0])
    }

    /// Backend-neutral handle for [`crate::CommandList::set_pipeline`].
    pub fn binding(&self) -> PipelineBinding {
        PipelineBinding {
            root_signature: RootSignatureId(self.layout.as_raw()),
            pipeline: PipelineId(self.pipeline.as_raw()),
        }
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        for layout in self.set_layouts {
            device.destroy_descriptor_set_layout(layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_vertex_struct() {
        let (binding, attributes) = vertex_input_layout();
        assert_eq!(binding.stride, 28);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32A32_SFLOAT);
    }
}
