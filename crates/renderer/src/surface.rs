use tracing::{debug, warn};

use crate::shaders::{ProgramFactory, ShaderTable};
use crate::types::ShaderStage;

/// Failures raised while drawing or binding.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{stage} shader slot {index} was never loaded")]
    SlotNotLoaded { stage: ShaderStage, index: usize },
    #[error("no {0} shader is active; shaders must finish loading before the first draw")]
    NoActiveShader(ShaderStage),
    #[error("presentation surface failed")]
    Surface(#[from] wgpu::SurfaceError),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Per-frame values handed to the pixel program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Seconds since the first frame.
    pub time: f32,
    pub progress: f32,
    pub brightness: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            time: 0.0,
            progress: 0.0,
            brightness: 1.0,
        }
    }
}

pub type ProgramOf<B> = <<B as GpuBackend>::Factory as ProgramFactory>::Program;

/// GPU device collaborator behind [`RenderSurface`].
pub trait GpuBackend {
    type Factory: ProgramFactory + Clone;

    /// Handle used by the shader loader; it may be moved to worker threads.
    fn program_factory(&self) -> Self::Factory;

    fn create_fullscreen_primitive(&mut self) -> Result<(), RenderError>;

    /// Makes the pair current for subsequent draws.
    fn bind_programs(
        &mut self,
        vertex: &ProgramOf<Self>,
        pixel: &ProgramOf<Self>,
    ) -> Result<(), RenderError>;

    /// Records one frame. Returns `false` when no frame could be acquired and
    /// nothing was recorded, in which case the caller must not present.
    fn draw(&mut self, uniforms: &FrameUniforms) -> Result<bool, RenderError>;

    fn present(&mut self) -> Result<(), RenderError>;

    fn resize(&mut self, width: u32, height: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Presented,
    /// Nothing was issued: either no fullscreen primitive exists yet or the
    /// backend had no frame to draw into.
    Skipped,
}

/// Owns the presentation backend, the loaded programs, and the active binding.
pub struct RenderSurface<B: GpuBackend> {
    backend: B,
    table: Option<ShaderTable<ProgramOf<B>>>,
    active_vertex: Option<usize>,
    active_pixel: Option<usize>,
    has_primitive: bool,
    warned_missing_primitive: bool,
    uniforms: FrameUniforms,
    presented: u64,
}

impl<B: GpuBackend> RenderSurface<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            table: None,
            active_vertex: None,
            active_pixel: None,
            has_primitive: false,
            warned_missing_primitive: false,
            uniforms: FrameUniforms::default(),
            presented: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn program_factory(&self) -> B::Factory {
        self.backend.program_factory()
    }

    /// Creates the screen-covering rectangle; later calls are no-ops.
    pub fn create_fullscreen_primitive(&mut self) -> Result<(), RenderError> {
        if self.has_primitive {
            return Ok(());
        }
        self.backend.create_fullscreen_primitive()?;
        self.has_primitive = true;
        debug!("fullscreen primitive created");
        Ok(())
    }

    /// Takes ownership of a completed batch. Any previous binding is cleared.
    pub fn install(&mut self, table: ShaderTable<ProgramOf<B>>) {
        debug!(
            vertex = table.count(ShaderStage::Vertex),
            pixel = table.count(ShaderStage::Pixel),
            "shader table installed"
        );
        self.table = Some(table);
        self.active_vertex = None;
        self.active_pixel = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// Makes a loaded slot current. Binding happens once both stages are set.
    pub fn set_active(&mut self, stage: ShaderStage, index: usize) -> Result<(), RenderError> {
        let loaded = self
            .table
            .as_ref()
            .is_some_and(|table| table.get(stage, index).is_some());
        if !loaded {
            return Err(RenderError::SlotNotLoaded { stage, index });
        }
        match stage {
            ShaderStage::Vertex => self.active_vertex = Some(index),
            ShaderStage::Pixel => self.active_pixel = Some(index),
        }
        self.bind_if_complete()
    }

    fn bind_if_complete(&mut self) -> Result<(), RenderError> {
        let (Some(table), Some(vertex), Some(pixel)) =
            (self.table.as_ref(), self.active_vertex, self.active_pixel)
        else {
            return Ok(());
        };
        let (Some(vertex_program), Some(pixel_program)) = (
            table.get(ShaderStage::Vertex, vertex),
            table.get(ShaderStage::Pixel, pixel),
        ) else {
            return Ok(());
        };
        self.backend.bind_programs(vertex_program, pixel_program)?;
        debug!(vertex, pixel, "shader programs bound");
        Ok(())
    }

    pub fn set_uniforms(&mut self, uniforms: FrameUniforms) {
        self.uniforms = uniforms;
    }

    /// Draws the fullscreen rectangle with the active programs and presents it.
    ///
    /// Without a primitive nothing is drawn. Drawing before both stages are
    /// active is a caller bug and reported as [`RenderError::NoActiveShader`].
    pub fn draw(&mut self) -> Result<DrawOutcome, RenderError> {
        if !self.has_primitive {
            if !self.warned_missing_primitive {
                warn!("draw requested before the fullscreen primitive exists; skipping");
                self.warned_missing_primitive = true;
            }
            return Ok(DrawOutcome::Skipped);
        }
        if self.active_vertex.is_none() {
            return Err(RenderError::NoActiveShader(ShaderStage::Vertex));
        }
        if self.active_pixel.is_none() {
            return Err(RenderError::NoActiveShader(ShaderStage::Pixel));
        }
        if !self.backend.draw(&self.uniforms)? {
            return Ok(DrawOutcome::Skipped);
        }
        self.backend.present()?;
        self.presented += 1;
        Ok(DrawOutcome::Presented)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }
}
