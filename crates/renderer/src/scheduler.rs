//! Frame scheduler: the render loop shared by both threading modes.
//!
//! Each iteration drains host events without blocking, samples a
//! [`FrameTick`], and (once the shader batch is available) advances the
//! shutdown effect and draws. When the effect settles into a resting phase the
//! loop stops spinning and waits for at most the idle interval per iteration;
//! the time spent waiting is excluded from the next tick. While a background
//! shader batch is still compiling the loop polls it every few milliseconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::clock::{Clock, FrameClock};
use crate::effect::ShutdownEffect;
use crate::shaders::{LoadError, PendingLoad, ShaderTable};
use crate::surface::{DrawOutcome, FrameUniforms, GpuBackend, ProgramOf, RenderError, RenderSurface};
use crate::types::ShaderStage;

/// How long to wait on the host between polls of a background shader batch.
pub const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Events the windowing collaborator forwards to the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    CloseRequested,
    Resized { width: u32, height: u32 },
    PowerOn,
    PowerOff,
}

/// Source of host events for the render loop.
pub trait EventPump {
    /// Appends every currently queued event without blocking.
    fn drain(&mut self, events: &mut Vec<HostEvent>);

    /// Waits until host input arrives or `limit` elapses, whichever is first.
    fn idle_wait(&mut self, limit: Duration);
}

/// One-way latch set by the event thread when the window closes.
///
/// Clones share the latch. There is no way to reset it.
#[derive(Debug, Clone, Default)]
pub struct ClosedFlag(Arc<AtomicBool>);

impl ClosedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Which loaded slots to make current once shaders are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveSlots {
    pub vertex: usize,
    pub pixel: usize,
}

/// Why the render loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Closed,
}

/// Fatal failures of the render loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

enum ShaderGate<P> {
    Pending(PendingLoad<P>),
    Ready,
}

/// Outcome of a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(LoopExit),
}

/// Drives the saver: drains host events, advances the [`ShutdownEffect`]
/// by measured frame time, draws through the [`RenderSurface`] and throttles
/// itself once the effect comes to rest.
///
/// Built either around a loaded [`ShaderTable`] or a [`PendingLoad`]; in the
/// latter case nothing is drawn until the batch completes.
pub struct FrameScheduler<B: GpuBackend, C: Clock> {
    surface: RenderSurface<B>,
    effect: ShutdownEffect,
    frames: FrameClock<C>,
    gate: ShaderGate<ProgramOf<B>>,
    slots: ActiveSlots,
    idle_interval: Duration,
    idle: bool,
    events: Vec<HostEvent>,
    stats: FrameStats,
}

impl<B: GpuBackend, C: Clock> FrameScheduler<B, C> {
    /// Builds a scheduler around a batch that has already finished loading.
    pub fn with_table(
        mut surface: RenderSurface<B>,
        table: ShaderTable<ProgramOf<B>>,
        slots: ActiveSlots,
        effect: ShutdownEffect,
        clock: C,
        idle_interval: Duration,
    ) -> Result<Self, LoopError> {
        surface.create_fullscreen_primitive()?;
        activate(&mut surface, table, slots)?;
        Ok(Self::assemble(surface, ShaderGate::Ready, slots, effect, clock, idle_interval))
    }

    /// Builds a scheduler that skips drawing until `pending` completes.
    pub fn with_pending(
        mut surface: RenderSurface<B>,
        pending: PendingLoad<ProgramOf<B>>,
        slots: ActiveSlots,
        effect: ShutdownEffect,
        clock: C,
        idle_interval: Duration,
    ) -> Result<Self, LoopError> {
        surface.create_fullscreen_primitive()?;
        Ok(Self::assemble(
            surface,
            ShaderGate::Pending(pending),
            slots,
            effect,
            clock,
            idle_interval,
        ))
    }

    fn assemble(
        surface: RenderSurface<B>,
        gate: ShaderGate<ProgramOf<B>>,
        slots: ActiveSlots,
        effect: ShutdownEffect,
        clock: C,
        idle_interval: Duration,
    ) -> Self {
        Self {
            surface,
            effect,
            frames: FrameClock::new(clock),
            gate,
            slots,
            idle_interval,
            idle: false,
            events: Vec::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn surface(&self) -> &RenderSurface<B> {
        &self.surface
    }

    pub fn effect(&self) -> &ShutdownEffect {
        &self.effect
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Runs iterations until the host asks to close or a fatal error occurs.
    pub fn run<P: EventPump>(&mut self, pump: &mut P) -> Result<LoopExit, LoopError> {
        info!(idle_ms = self.idle_interval.as_millis() as u64, "render loop started");
        loop {
            if let Step::Exit(exit) = self.step(pump)? {
                info!(frames = self.surface.presented_frames(), "render loop finished");
                return Ok(exit);
            }
        }
    }

    /// Runs one loop iteration.
    pub fn step<P: EventPump>(&mut self, pump: &mut P) -> Result<Step, LoopError> {
        let mut events = std::mem::take(&mut self.events);
        pump.drain(&mut events);
        let mut exit = None;
        for event in events.drain(..) {
            if self.handle_event(event) {
                exit = Some(LoopExit::Closed);
            }
        }
        self.events = events;
        if let Some(exit) = exit {
            return Ok(Step::Exit(exit));
        }

        let tick = self.frames.tick();

        if !self.shaders_ready()? {
            self.wait(pump, LOAD_POLL_INTERVAL);
            return Ok(Step::Continue);
        }

        let settled = self.effect.update(&tick);
        self.surface.set_uniforms(FrameUniforms {
            time: self.frames.elapsed_seconds(),
            progress: self.effect.progress(),
            brightness: self.effect.brightness(),
        });
        if self.surface.draw()? == DrawOutcome::Presented {
            self.stats.record(tick.start);
        }

        if settled && self.effect.is_resting() {
            debug!(phase = ?self.effect.phase(), "effect at rest; throttling render loop");
            self.idle = true;
        }

        if self.idle {
            let slept = self.wait(pump, self.idle_interval);
            debug!(slept_ms = slept.as_millis() as u64, "idle wait finished");
        }

        Ok(Step::Continue)
    }

    /// Waits on the pump for at most `limit`, keeping the wait out of the
    /// next frame delta.
    fn wait<P: EventPump>(&mut self, pump: &mut P, limit: Duration) -> Duration {
        let before = self.frames.clock().now();
        pump.idle_wait(limit);
        let slept = self.frames.clock().now().saturating_duration_since(before);
        self.frames.discount(slept);
        slept
    }

    /// Applies one host event; returns true when the loop should exit.
    fn handle_event(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::CloseRequested => return true,
            HostEvent::Resized { width, height } => self.surface.resize(width, height),
            HostEvent::PowerOn => {
                if self.effect.power_on() {
                    self.idle = false;
                }
            }
            HostEvent::PowerOff => {
                if self.effect.power_off() {
                    self.idle = false;
                }
            }
        }
        false
    }

    fn shaders_ready(&mut self) -> Result<bool, LoopError> {
        let ShaderGate::Pending(pending) = &self.gate else {
            return Ok(true);
        };
        let Some(table) = pending.try_complete()? else {
            return Ok(false);
        };
        activate(&mut self.surface, table, self.slots)?;
        self.gate = ShaderGate::Ready;
        info!("background shader load finished; drawing enabled");
        Ok(true)
    }
}

fn activate<B: GpuBackend>(
    surface: &mut RenderSurface<B>,
    table: ShaderTable<ProgramOf<B>>,
    slots: ActiveSlots,
) -> Result<(), RenderError> {
    surface.install(table);
    surface.set_active(ShaderStage::Vertex, slots.vertex)?;
    surface.set_active(ShaderStage::Pixel, slots.pixel)?;
    Ok(())
}

/// Logs presented frames per second once a second.
#[derive(Default)]
struct FrameStats {
    window_start: Option<Instant>,
    frames: u32,
}

impl FrameStats {
    fn record(&mut self, now: Instant) {
        self.frames += 1;
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f32 / elapsed.as_secs_f32();
            debug!(fps = fps.round(), "render stats");
            self.frames = 0;
            self.window_start = Some(now);
        }
    }
}
