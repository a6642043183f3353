use std::borrow::Cow;

use crate::shaders::{spirv_words, ProgramError, ProgramFactory, ShaderFormat};
use crate::types::ShaderStage;

use super::uniforms::QuadVertex;

/// Creates shader modules on a cloned device handle.
///
/// wgpu error scopes are thread-local, so each loader thread captures the
/// validation errors of exactly the module it creates.
#[derive(Clone)]
pub struct WgpuProgramFactory {
    device: wgpu::Device,
}

impl WgpuProgramFactory {
    pub(crate) fn new(device: wgpu::Device) -> Self {
        Self { device }
    }
}

impl ProgramFactory for WgpuProgramFactory {
    type Program = wgpu::ShaderModule;

    fn create_program(
        &self,
        stage: ShaderStage,
        source: &[u8],
    ) -> Result<Self::Program, ProgramError> {
        let source = match ShaderFormat::detect(source)? {
            ShaderFormat::SpirV => wgpu::ShaderSource::SpirV(Cow::Owned(spirv_words(source)?)),
            ShaderFormat::Wgsl => {
                let text = std::str::from_utf8(source).map_err(|_| ProgramError::UnknownFormat)?;
                wgpu::ShaderSource::Wgsl(Cow::Owned(text.to_owned()))
            }
        };
        let label = format!("oledsaver {stage} program");

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ProgramError::Rejected(err.to_string()));
        }
        Ok(module)
    }
}

/// Layout shared by every program pair: one uniform block at group 0.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        Self {
            uniform_layout,
            pipeline_layout,
        }
    }
}

/// Links a vertex and pixel module into a pipeline that draws the rectangle.
pub(crate) fn link_programs(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    surface_format: wgpu::TextureFormat,
    vertex: &wgpu::ShaderModule,
    pixel: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let vertex_layout = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x2],
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("shutdown effect pipeline"),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: None,
            buffers: &[vertex_layout],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: pixel,
            entry_point: None,
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
