//! Scene command recording.
//!
//! [`Renderer`] collects the triangles and rectangles drawn during a frame
//! and records them into the viewport image of the acquired swapchain index.
//!
//! # Per-slot Resources
//!
//! Every frame-in-flight slot owns a command buffer, a camera uniform buffer,
//! a dynamic uniform buffer holding one [`ObjectUbo`] per primitive, a
//! descriptor set over both, and one region of the shared geometry arena.
//! They are only touched after the slot's fence was waited.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec4};
use tracing::{debug, info, trace, warn};

use pacer_rhi::arena::{ArenaSpan, GeometryArena};
use pacer_rhi::buffer::{Buffer, BufferUsage};
use pacer_rhi::command::{CommandBuffer, CommandPool};
use pacer_rhi::descriptor::{
    self, CAMERA_BINDING, DescriptorPool, DescriptorSetLayout, OBJECT_BINDING,
};
use pacer_rhi::device::Device;
use pacer_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use pacer_rhi::shader::{Shader, ShaderStage};
use pacer_rhi::uniform::{DynamicUniformBuffer, aligned_size};
use pacer_rhi::vertex::ColoredVertex;
use pacer_rhi::{RhiError, RhiResult};

use crate::backend::CommandBufferRecorder;
use crate::camera::CameraInfo;
use crate::draw_list::DrawList;
use crate::render_target::RenderTargetDesc;
use crate::ubo::{CameraUbo, ObjectUbo};

/// Alignment of vertex and index data inside the arena.
const GEOMETRY_ALIGNMENT: vk::DeviceSize = 16;

/// Construction parameters of a [`Renderer`].
#[derive(Clone, Debug)]
pub struct RendererSettings {
    /// Number of frame-in-flight slots; must match the frame backend.
    pub frames_in_flight: usize,
    /// SPIR-V vertex shader.
    pub vertex_shader: PathBuf,
    /// SPIR-V fragment shader.
    pub fragment_shader: PathBuf,
    /// Viewport clear color.
    pub clear_color: [f32; 4],
    /// Initial geometry arena bytes per slot.
    pub geometry_budget: vk::DeviceSize,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: crate::MAX_FRAMES_IN_FLIGHT,
            vertex_shader: PathBuf::from("shaders/spirv/scene.vert.spv"),
            fragment_shader: PathBuf::from("shaders/spirv/scene.frag.spv"),
            clear_color: [0.1, 0.1, 0.12, 1.0],
            geometry_budget: 64 * 1024,
        }
    }
}

/// Where this frame's geometry landed in the arena.
struct UploadedGeometry {
    buffer: vk::Buffer,
    vertices: ArenaSpan,
    indices: ArenaSpan,
    /// Dynamic offset of each group's `ObjectUbo`.
    object_offsets: Vec<u32>,
}

/// Byte offset of object `index` in a dynamic uniform buffer with `stride`.
///
/// # Errors
///
/// Returns [`RhiError::OutOfBounds`] when the offset does not fit the `u32`
/// Vulkan takes for dynamic offsets.
pub fn dynamic_offset(index: usize, stride: vk::DeviceSize) -> RhiResult<u32> {
    (index as u64)
        .checked_mul(stride)
        .and_then(|offset| u32::try_from(offset).ok())
        .ok_or_else(|| {
            RhiError::OutOfBounds(format!(
                "object {} at stride {} exceeds the dynamic offset range",
                index, stride
            ))
        })
}

/// Records the scene into the offscreen viewport images.
///
/// # Resource Destruction Order
///
/// Fields drop in declaration order: pipeline objects, descriptor objects,
/// buffers, then command buffers before their pool. The owner must have
/// waited for rendering idle first.
pub struct Renderer {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,

    /// Sets are freed with the pool.
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    descriptor_set_layout: DescriptorSetLayout,

    camera_buffers: Vec<Buffer>,
    object_uniforms: Vec<DynamicUniformBuffer>,
    arena: GeometryArena,

    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,

    device: Arc<Device>,
    draw_list: DrawList,
    camera: CameraInfo,
    clear_color: [f32; 4],
    viewport: RenderTargetDesc,
    /// Slot of the open frame, between `begin_frame` and `end_frame`.
    frame_slot: Option<usize>,
}

impl Renderer {
    /// Creates the pipeline and every per-slot resource.
    ///
    /// `color_format` is the format of the viewport images.
    ///
    /// # Errors
    ///
    /// Returns an error if the shaders cannot be loaded or any Vulkan object
    /// creation fails.
    pub fn new(
        device: Arc<Device>,
        settings: &RendererSettings,
        color_format: vk::Format,
    ) -> RhiResult<Self> {
        let frames = settings.frames_in_flight;
        if frames == 0 {
            return Err(RhiError::InvalidHandle(
                "renderer needs at least one frame-in-flight slot".to_string(),
            ));
        }

        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics()?)?;
        let command_buffers = command_pool.allocate(frames as u32)?;

        let descriptor_set_layout =
            DescriptorSetLayout::new(device.clone(), &descriptor::uniform_bindings())?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            frames as u32,
            &descriptor::uniform_pool_sizes(frames as u32),
        )?;
        let layouts = vec![descriptor_set_layout.handle(); frames];
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;

        let mut camera_buffers = Vec::with_capacity(frames);
        for &set in &descriptor_sets {
            let buffer = Buffer::new(device.clone(), BufferUsage::Uniform, CameraUbo::SIZE as u64)?;
            descriptor::write_buffer(
                &device,
                set,
                CAMERA_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                buffer.handle(),
                CameraUbo::SIZE as u64,
            );
            camera_buffers.push(buffer);
        }

        let object_uniforms = (0..frames)
            .map(|_| DynamicUniformBuffer::new(device.clone()))
            .collect();

        let arena = GeometryArena::new(device.clone(), settings.geometry_budget, frames)?;

        let (pipeline, pipeline_layout) =
            Self::create_scene_pipeline(&device, settings, &descriptor_set_layout, color_format)?;

        info!(
            "Renderer initialized: {} frames in flight, {} bytes of geometry per slot",
            frames,
            arena.region_size()
        );

        Ok(Self {
            pipeline,
            pipeline_layout,
            descriptor_sets,
            descriptor_pool,
            descriptor_set_layout,
            camera_buffers,
            object_uniforms,
            arena,
            command_buffers,
            command_pool,
            device,
            draw_list: DrawList::new(),
            camera: CameraInfo::default(),
            clear_color: settings.clear_color,
            viewport: RenderTargetDesc::default(),
            frame_slot: None,
        })
    }

    /// Creates the flat-color scene pipeline.
    fn create_scene_pipeline(
        device: &Arc<Device>,
        settings: &RendererSettings,
        descriptor_set_layout: &DescriptorSetLayout,
        color_format: vk::Format,
    ) -> RhiResult<(Pipeline, PipelineLayout)> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &settings.vertex_shader,
            ShaderStage::Vertex,
            "main",
        )?;

        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &settings.fragment_shader,
            ShaderStage::Fragment,
            "main",
        )?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(ColoredVertex::binding_description())
            .vertex_attributes(&ColoredVertex::attribute_descriptions())
            .color_attachment_format(color_format)
            .cull_mode(CullMode::None)
            .front_face(FrontFace::CounterClockwise)
            .build(device.clone(), &pipeline_layout)?;

        info!("Scene pipeline created for {:?}", color_format);

        Ok((pipeline, pipeline_layout))
    }

    /// Queues the unit triangle, transformed by `transform`.
    ///
    /// Nothing reaches the GPU until the frame is recorded.
    pub fn draw_triangle(&mut self, transform: Mat4, color: Vec4) {
        self.draw_list.push_triangle(transform, color);
    }

    /// Queues the unit rectangle, transformed by `transform`.
    pub fn draw_rect(&mut self, transform: Mat4, color: Vec4) {
        self.draw_list.push_rect(transform, color);
    }

    /// Replaces the camera used from the next recorded frame on.
    pub fn set_camera(&mut self, camera: CameraInfo) {
        self.camera = camera;
    }

    #[inline]
    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    /// Draws accumulated since the last `end_frame`.
    #[inline]
    pub fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    /// Copies the frame's geometry and per-object data into `slot`'s
    /// resources.
    fn upload(&mut self, slot: usize, extent: vk::Extent2D) -> RhiResult<UploadedGeometry> {
        let vertex_bytes = self.draw_list.vertex_bytes();
        let index_bytes = self.draw_list.index_bytes();

        let needed = aligned_size(vertex_bytes.len() as u64, GEOMETRY_ALIGNMENT)
            + aligned_size(index_bytes.len() as u64, GEOMETRY_ALIGNMENT);
        self.arena.reserve(needed)?;
        let vertices = self.arena.push(vertex_bytes, GEOMETRY_ALIGNMENT)?;
        let indices = self.arena.push(index_bytes, GEOMETRY_ALIGNMENT)?;
        let buffer = self.arena.buffer_for(&vertices)?;

        let uniforms = &mut self.object_uniforms[slot];
        let object_stride = uniforms.stride::<ObjectUbo>();
        let object_count = self.draw_list.groups().len();
        let object_offsets = (0..object_count)
            .map(|index| dynamic_offset(index, object_stride))
            .collect::<RhiResult<Vec<_>>>()?;
        let required = object_count as u64 * object_stride;
        if uniforms.ensure_capacity(required)? {
            descriptor::write_buffer(
                &self.device,
                self.descriptor_sets[slot],
                OBJECT_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                uniforms.handle(),
                ObjectUbo::SIZE as u64,
            );
        }

        for (index, (transform, color)) in self
            .draw_list
            .transforms()
            .iter()
            .zip(self.draw_list.colors())
            .enumerate()
        {
            uniforms.write(index, &ObjectUbo::new(*transform, *color))?;
        }

        let camera = self.camera.to_ubo(extent.width, extent.height);
        self.camera_buffers[slot].write_data(0, bytemuck::bytes_of(&camera))?;

        Ok(UploadedGeometry {
            buffer,
            vertices,
            indices,
            object_offsets,
        })
    }

    fn record_draws(
        &self,
        command_buffer: &CommandBuffer,
        slot: usize,
        extent: vk::Extent2D,
        geometry: &UploadedGeometry,
    ) {
        command_buffer.bind_graphics_pipeline(self.pipeline.handle());
        command_buffer.set_viewport_and_scissor(extent);
        command_buffer.bind_vertex_buffer(geometry.buffer, geometry.vertices.offset);
        command_buffer.bind_index_buffer(geometry.buffer, geometry.indices.offset);

        let descriptor_sets = [self.descriptor_sets[slot]];
        for (group, &offset) in self.draw_list.groups().iter().zip(&geometry.object_offsets) {
            command_buffer.bind_descriptor_sets(
                self.pipeline_layout.handle(),
                0,
                &descriptor_sets,
                &[offset],
            );
            command_buffer.draw_indexed(group.index_count, group.first_index, 0);
        }
    }
}

impl CommandBufferRecorder for Renderer {
    fn begin_frame(&mut self, slot: usize) -> RhiResult<()> {
        if slot >= self.command_buffers.len() {
            return Err(RhiError::InvalidHandle(format!(
                "frame slot {} out of range ({} slots)",
                slot,
                self.command_buffers.len()
            )));
        }

        self.arena.begin_frame(slot)?;
        self.frame_slot = Some(slot);
        Ok(())
    }

    fn record_command_buffer(&mut self, image_index: u32) -> RhiResult<vk::CommandBuffer> {
        let slot = self.frame_slot.ok_or_else(|| {
            RhiError::FrameOrder("scene recorded outside begin_frame/end_frame".to_string())
        })?;

        let (image, image_view) = self.viewport.get(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "no viewport image for swapchain image {}",
                image_index
            ))
        })?;
        let extent = self.viewport.extent;

        let geometry = if self.draw_list.is_empty() {
            None
        } else {
            Some(self.upload(slot, extent)?)
        };

        let command_buffer = &self.command_buffers[slot];
        command_buffer.reset()?;
        command_buffer.begin()?;

        // The previous frame on this image may still be blitting from it.
        command_buffer.transition_image_layout_after(
            image,
            vk::PipelineStageFlags2::ALL_TRANSFER,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        command_buffer.begin_color_rendering(image_view, extent, self.clear_color);

        match &geometry {
            Some(geometry) => self.record_draws(command_buffer, slot, extent, geometry),
            None => trace!("Empty scene, recording clear only"),
        }

        command_buffer.end_rendering();
        command_buffer.transition_image_layout(
            image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        command_buffer.end()?;

        Ok(command_buffer.handle())
    }

    fn end_frame(&mut self) {
        self.draw_list.clear();
        self.frame_slot = None;
    }

    fn on_viewport_resized(&mut self, target: &RenderTargetDesc) {
        if self.viewport.format != vk::Format::UNDEFINED && self.viewport.format != target.format {
            warn!(
                "Viewport format changed from {:?} to {:?}; scene pipeline was built for the former",
                self.viewport.format, target.format
            );
        }

        debug!(
            "Renderer targets {} viewport image(s) at {}x{}",
            target.image_count(),
            target.extent.width,
            target.extent.height
        );
        self.viewport = target.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_offset_scales_with_stride() {
        assert_eq!(dynamic_offset(0, 256).unwrap(), 0);
        assert_eq!(dynamic_offset(3, 256).unwrap(), 768);
    }

    #[test]
    fn test_dynamic_offset_rejects_overflow() {
        let stride = 256;
        let last_fitting = (u32::MAX as u64 / stride) as usize;
        assert!(dynamic_offset(last_fitting, stride).is_ok());
        assert!(matches!(
            dynamic_offset(last_fitting + 1, stride),
            Err(RhiError::OutOfBounds(_))
        ));
        assert!(dynamic_offset(usize::MAX, stride).is_err());
    }

    #[test]
    fn test_default_settings_use_bundled_shaders() {
        let settings = RendererSettings::default();
        assert_eq!(settings.frames_in_flight, crate::MAX_FRAMES_IN_FLIGHT);
        assert!(settings.vertex_shader.ends_with("scene.vert.spv"));
        assert!(settings.fragment_shader.ends_with("scene.frag.spv"));
    }
}
