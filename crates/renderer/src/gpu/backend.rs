use std::sync::Arc;

use anyhow::Context as _;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::surface::{FrameUniforms, GpuBackend, RenderError};
use crate::types::GpuPowerPreference;

use super::context::GpuContext;
use super::pipeline::{link_programs, PipelineLayouts, WgpuProgramFactory};
use super::uniforms::{EffectParams, FULLSCREEN_QUAD};

/// [`GpuBackend`] that renders into a winit window through wgpu.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    quad: Option<wgpu::Buffer>,
    pipeline: Option<wgpu::RenderPipeline>,
    frame: Option<wgpu::SurfaceTexture>,
}

impl WgpuBackend {
    pub fn new(
        window: Arc<Window>,
        gpu_power: GpuPowerPreference,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let context = GpuContext::new(window, size, gpu_power, vsync)
            .context("failed to initialise GPU context")?;
        let layouts = PipelineLayouts::new(&context.device);

        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("effect uniforms"),
                contents: bytemuck::bytes_of(&EffectParams::default()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("effect uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        Ok(Self {
            context,
            layouts,
            uniform_buffer,
            uniform_bind_group,
            quad: None,
            pipeline: None,
            frame: None,
        })
    }

    /// Acquires the next swap-chain image, recovering once from a stale surface.
    fn acquire_frame(&mut self) -> Result<Option<wgpu::SurfaceTexture>, RenderError> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                match self.context.surface.get_current_texture() {
                    Ok(frame) => Ok(Some(frame)),
                    Err(wgpu::SurfaceError::Timeout) => {
                        warn!("timed out acquiring frame after reconfigure; skipping");
                        Ok(None)
                    }
                    Err(err) => Err(RenderError::Surface(err)),
                }
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("timed out acquiring frame; skipping");
                Ok(None)
            }
            Err(err) => Err(RenderError::Surface(err)),
        }
    }
}

impl GpuBackend for WgpuBackend {
    type Factory = WgpuProgramFactory;

    fn program_factory(&self) -> Self::Factory {
        WgpuProgramFactory::new(self.context.device.clone())
    }

    fn create_fullscreen_primitive(&mut self) -> Result<(), RenderError> {
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fullscreen quad"),
                contents: bytemuck::cast_slice(&FULLSCREEN_QUAD),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.quad = Some(buffer);
        Ok(())
    }

    fn bind_programs(
        &mut self,
        vertex: &wgpu::ShaderModule,
        pixel: &wgpu::ShaderModule,
    ) -> Result<(), RenderError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = link_programs(
            device,
            &self.layouts,
            self.context.surface_format,
            vertex,
            pixel,
        );
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Backend(anyhow::anyhow!(
                "vertex and pixel programs failed to link: {err}"
            )));
        }
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<bool, RenderError> {
        if self.pipeline.is_none() || self.quad.is_none() {
            return Err(RenderError::Backend(anyhow::anyhow!(
                "draw issued without a linked pipeline"
            )));
        }
        let Some(frame) = self.acquire_frame()? else {
            return Ok(false);
        };
        let (Some(pipeline), Some(quad)) = (self.pipeline.as_ref(), self.quad.as_ref()) else {
            return Ok(false);
        };

        let size = self.context.size;
        let params = EffectParams::new(size.width, size.height, uniforms);
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("shutdown effect encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shutdown effect pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_vertex_buffer(0, quad.slice(..));
            render_pass.draw(0..FULLSCREEN_QUAD.len() as u32, 0..1);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.frame = Some(frame);
        Ok(true)
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(PhysicalSize::new(width, height));
    }
}
