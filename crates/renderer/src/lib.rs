//! Renderer crate for OLEDSaver.
//!
//! Draws a single fullscreen rectangle whose pixel program animates a CRT
//! style "power off" of the display, then throttles itself while the screen is
//! dark. The pieces fit together like this:
//!
//! ```text
//!   SaverConfig ──▶ run() ──▶ window (winit) ──▶ EventPump ───────┐
//!                     │                                            ▼
//!                     └─▶ shaders::load_batch ──▶ ShaderTable ──▶ FrameScheduler
//!                                                                  │  │
//!                                     ShutdownEffect::update ◀─────┘  └─▶ RenderSurface ──▶ gpu (wgpu)
//! ```
//!
//! Everything above the `gpu` and `window` modules is platform independent and
//! is exercised in tests through in-memory fakes.

pub mod clock;
pub mod effect;
mod gpu;
pub mod scheduler;
pub mod shaders;
pub mod surface;
mod types;
mod window;

use std::time::Instant;

use tracing::{debug, info};

pub use clock::{Clock, FrameClock, FrameTick, SystemClock};
pub use effect::{Easing, EffectSequence, Phase, ShutdownEffect};
pub use gpu::{WgpuBackend, WgpuProgramFactory};
pub use scheduler::{ActiveSlots, ClosedFlag, EventPump, FrameScheduler, HostEvent, LoopError, LoopExit};
pub use shaders::{LoadError, LoadRequest, ProgramError, ProgramFactory, ShaderTable, SlotAddress};
pub use surface::{FrameUniforms, GpuBackend, RenderError, RenderSurface};
pub use types::{
    EffectConfig, GpuPowerPreference, LoadMode, SaverConfig, ShaderStage, ThreadingMode,
    WindowStyle, BUILTIN_PIXEL_SHADER, BUILTIN_VERTEX_SHADER,
};

/// Everything that can end the saver with a failure.
#[derive(Debug, thiserror::Error)]
pub enum SaverError {
    /// Window, device, or thread could not be created.
    #[error("startup failed: {0:#}")]
    Startup(anyhow::Error),
    /// The startup shader batch failed.
    #[error("shader loading failed")]
    Load(#[from] LoadError),
    /// The render loop hit a fatal error.
    #[error("rendering failed")]
    Runtime(#[source] LoopError),
}

impl From<LoopError> for SaverError {
    fn from(err: LoopError) -> Self {
        match err {
            LoopError::Load(err) => SaverError::Load(err),
            other => SaverError::Runtime(other),
        }
    }
}

/// Opens the saver window and runs until it is closed.
pub fn run(config: SaverConfig) -> Result<(), SaverError> {
    info!(
        threading = ?config.threading,
        load = ?config.load_mode,
        shaders = config.shaders.len(),
        rate = config.effect.rate,
        "starting OLEDSaver"
    );
    match config.threading {
        ThreadingMode::Cooperative => window::run_cooperative(config),
        ThreadingMode::Dedicated => window::run_dedicated(config),
    }
}

/// Loads the startup batch and assembles the render loop around `backend`.
pub(crate) fn start_scheduler<B: GpuBackend, C: Clock>(
    backend: B,
    config: &SaverConfig,
    clock: C,
) -> Result<FrameScheduler<B, C>, SaverError> {
    let surface = RenderSurface::new(backend);
    let slots = ActiveSlots {
        vertex: config.vertex_slot,
        pixel: config.pixel_slot,
    };
    let effect = ShutdownEffect::new(
        config.effect.rate,
        config.effect.sequence,
        config.effect.easing,
    );

    let scheduler = match config.load_mode {
        LoadMode::Parallel => {
            let started = Instant::now();
            let table = shaders::load_batch(&surface.program_factory(), &config.shaders)?;
            debug!(
                programs = table.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "shader batch loaded"
            );
            FrameScheduler::with_table(surface, table, slots, effect, clock, config.idle_interval)
        }
        LoadMode::Background => {
            let pending =
                shaders::load_batch_background(surface.program_factory(), config.shaders.clone());
            debug!(programs = pending.slots().len(), "shader batch loading in background");
            FrameScheduler::with_pending(surface, pending, slots, effect, clock, config.idle_interval)
        }
    };
    scheduler.map_err(|err| match err {
        LoopError::Load(err) => SaverError::Load(err),
        LoopError::Render(err) => SaverError::Startup(
            anyhow::Error::new(err).context("failed to prepare the first frame"),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::Step;
    use crate::surface::tests::FakeBackend;
    use std::borrow::Cow;

    struct ClosingPump;

    impl EventPump for ClosingPump {
        fn drain(&mut self, events: &mut Vec<HostEvent>) {
            events.push(HostEvent::CloseRequested);
        }

        fn idle_wait(&mut self, _limit: std::time::Duration) {}
    }

    fn config(load_mode: LoadMode) -> SaverConfig {
        SaverConfig {
            load_mode,
            shaders: vec![
                LoadRequest::new(ShaderStage::Vertex, Cow::Borrowed(b"vs".as_slice())),
                LoadRequest::new(ShaderStage::Pixel, Cow::Borrowed(b"ps".as_slice())),
            ],
            ..SaverConfig::default()
        }
    }

    #[test]
    fn parallel_start_binds_before_the_first_frame() {
        let scheduler =
            start_scheduler(FakeBackend::default(), &config(LoadMode::Parallel), ManualClock::new())
                .unwrap();
        assert!(scheduler.surface().is_loaded());
        assert_eq!(
            scheduler.surface().backend().bound,
            Some((b"vs".to_vec(), b"ps".to_vec()))
        );
        assert_eq!(scheduler.surface().backend().primitives, 1);
    }

    #[test]
    fn background_start_defers_binding() {
        let mut scheduler = start_scheduler(
            FakeBackend::default(),
            &config(LoadMode::Background),
            ManualClock::new(),
        )
        .unwrap();
        assert!(scheduler.surface().backend().bound.is_none());
        assert_eq!(scheduler.step(&mut ClosingPump).unwrap(), Step::Exit(LoopExit::Closed));
    }

    #[test]
    fn failed_batch_is_a_load_error() {
        let mut config = config(LoadMode::Parallel);
        config
            .shaders
            .push(LoadRequest::new(ShaderStage::Pixel, Cow::Owned(Vec::new())));
        let result = start_scheduler(FakeBackend::default(), &config, ManualClock::new());
        assert!(matches!(
            result,
            Err(SaverError::Load(LoadError::Program {
                stage: ShaderStage::Pixel,
                index: 1,
                ..
            }))
        ));
    }

    #[test]
    fn missing_slot_is_a_startup_error() {
        let config = SaverConfig {
            pixel_slot: 4,
            ..config(LoadMode::Parallel)
        };
        let result = start_scheduler(FakeBackend::default(), &config, ManualClock::new());
        let Err(SaverError::Startup(err)) = result else {
            panic!("expected a startup error");
        };
        assert!(format!("{err:#}").contains("pixel shader slot 4"));
    }

    #[test]
    fn default_config_uses_builtin_programs() {
        let config = SaverConfig::default();
        assert_eq!(config.shaders.len(), 2);
        assert_eq!(config.shaders[0].stage, ShaderStage::Vertex);
        assert_eq!(config.shaders[1].stage, ShaderStage::Pixel);
        assert!(std::str::from_utf8(BUILTIN_PIXEL_SHADER)
            .unwrap()
            .contains("fs_main"));
    }
}
