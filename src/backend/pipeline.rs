// Graphics pipeline creation
//
// Fixed-function state for a flat, unculled triangle list drawn into the
// swapchain extent. Shader modules only live for the duration of creation.

use super::command::full_area;
use super::shader::ShaderModule;
use super::{GraphicsDevice, PresentationSurface, RenderTargetPass};
use crate::config::{FRAGMENT_SHADER_PATH, VERTEX_SHADER_PATH};
use crate::error::{Result, VkResultExt};
use ash::vk;
use glam::Vec2;
use std::ffi::CStr;

const ENTRY_POINT: &CStr = c"main";

pub struct TrianglePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl TrianglePipeline {
    pub fn new(
        gpu: &GraphicsDevice,
        surface: &PresentationSurface,
        targets: &RenderTargetPass,
    ) -> Result<Self> {
        let device = &gpu.device;

        // Dropped (and destroyed) at the end of this function
        let vert_shader = ShaderModule::load(device, VERTEX_SHADER_PATH)?;
        let frag_shader = ShaderModule::load(device, FRAGMENT_SHADER_PATH)?;

        // No descriptors or push constants
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .during("vkCreatePipelineLayout")?;

        match create_graphics_pipeline(
            device,
            targets.render_pass,
            surface.extent,
            layout,
            vert_shader.module,
            frag_shader.module,
        ) {
            Ok(pipeline) => {
                log::info!(
                    "Created graphics pipeline for {}x{}",
                    surface.extent.width,
                    surface.extent.height
                );
                Ok(Self { pipeline, layout })
            }
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                Err(e)
            }
        }
    }

    /// Destroys the pipeline, then its layout.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let (pipeline, layout) = (self.pipeline, self.layout);
        move |device| unsafe {
            device.destroy_pipeline(pipeline, None);
            device.destroy_pipeline_layout(layout, None);
        }
    }
}

/// Vertex input for tightly packed 2D positions at location 0.
pub fn vertex_input_description() -> (
    vk::VertexInputBindingDescription,
    vk::VertexInputAttributeDescription,
) {
    let binding = vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(std::mem::size_of::<Vec2>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build();

    let position_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32_SFLOAT)
        .offset(0)
        .build();

    (binding, position_attr)
}

/// Viewport covering the whole extent with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Separate triangles, no primitive restart.
pub fn input_assembly_state() -> vk::PipelineInputAssemblyStateCreateInfo {
    vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false)
        .build()
}

/// Filled polygons with both windings drawn.
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

pub fn multisample_state() -> vk::PipelineMultisampleStateCreateInfo {
    vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .build()
}

/// Opaque writes to every channel.
pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()
}

fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    layout: vk::PipelineLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(ENTRY_POINT)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(ENTRY_POINT)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    let (binding, position_attr) = vertex_input_description();
    let bindings = &[binding];
    let attributes = &[position_attr];
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(bindings)
        .vertex_attribute_descriptions(attributes);

    let input_assembly = input_assembly_state();

    // Static viewport and scissor; the swapchain is never resized
    let viewports = &[full_viewport(extent)];
    let scissors = &[full_area(extent)];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    let rasterizer = rasterization_state();
    let multisampling = multisample_state();

    let color_blend_attachments = &[color_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, result)| result)
    .during("vkCreateGraphicsPipelines")?;

    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_packed_vec2() {
        let (binding, attribute) = vertex_input_description();

        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 8);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        assert_eq!(attribute.binding, 0);
        assert_eq!(attribute.location, 0);
        assert_eq!(attribute.format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attribute.offset, 0);
    }

    #[test]
    fn viewport_spans_extent() {
        let viewport = full_viewport(vk::Extent2D {
            width: 600,
            height: 400,
        });
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (600.0, 400.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn input_assembly_is_plain_triangle_list() {
        let state = input_assembly_state();
        assert_eq!(state.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(state.primitive_restart_enable, vk::FALSE);
    }

    #[test]
    fn rasterizer_fills_without_culling() {
        let state = rasterization_state();
        assert_eq!(state.depth_clamp_enable, vk::FALSE);
        assert_eq!(state.rasterizer_discard_enable, vk::FALSE);
        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(state.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.depth_bias_enable, vk::FALSE);
        assert_eq!(state.line_width, 1.0);
    }

    #[test]
    fn single_sample_without_sample_shading() {
        let state = multisample_state();
        assert_eq!(state.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(state.sample_shading_enable, vk::FALSE);
    }

    #[test]
    fn blending_is_off_and_all_channels_written() {
        let attachment = color_blend_attachment();
        assert_eq!(attachment.blend_enable, vk::FALSE);
        assert_eq!(attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
