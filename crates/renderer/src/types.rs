use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use crate::effect::{Easing, EffectSequence};
use crate::shaders::LoadRequest;

/// Programmable pipeline stages a shader blob can target.
///
/// The set is closed: the saver only ever draws one fullscreen rectangle with
/// a vertex and a pixel program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Pixel => f.write_str("pixel"),
        }
    }
}

/// How the host window is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStyle {
    /// Borderless fullscreen on the current monitor.
    Fullscreen,
    /// Decorated window, mostly useful while tweaking shaders.
    Windowed { width: u32, height: u32 },
}

/// Which threads pump host events and drive the GPU.
///
/// * `Cooperative` alternates between draining window events and drawing on
///   one thread.
/// * `Dedicated` keeps the event loop on the calling thread and moves the
///   frame scheduler (and every GPU call) to a render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingMode {
    #[default]
    Cooperative,
    Dedicated,
}

/// How the startup shader batch is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Block until every program in the batch is created and bound.
    #[default]
    Parallel,
    /// Load on a worker while the rest of startup continues; frames are not
    /// drawn until the batch completes.
    Background,
}

/// Adapter power preference forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Tuning for the shutdown animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectConfig {
    /// Progress units per second; `1.0` runs a full transition in one second.
    pub rate: f32,
    pub sequence: EffectSequence,
    pub easing: Easing,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            sequence: EffectSequence::PowerOff,
            easing: Easing::Linear,
        }
    }
}

/// Built-in fullscreen rectangle vertex program (WGSL).
pub const BUILTIN_VERTEX_SHADER: &[u8] = include_bytes!("../shaders/fullscreen.vert.wgsl");
/// Built-in shutdown pixel program (WGSL).
pub const BUILTIN_PIXEL_SHADER: &[u8] = include_bytes!("../shaders/shutdown.frag.wgsl");

/// Immutable configuration passed to [`crate::run`] at start-up.
#[derive(Debug, Clone)]
pub struct SaverConfig {
    pub title: String,
    pub style: WindowStyle,
    pub threading: ThreadingMode,
    pub load_mode: LoadMode,
    /// Shader batch, in submission order.
    pub shaders: Vec<LoadRequest>,
    /// Loaded vertex slot to activate before the first frame.
    pub vertex_slot: usize,
    /// Loaded pixel slot to activate before the first frame.
    pub pixel_slot: usize,
    pub effect: EffectConfig,
    /// Upper bound of a single voluntary sleep while the effect rests.
    pub idle_interval: Duration,
    pub gpu_power: GpuPowerPreference,
    pub vsync: bool,
}

impl SaverConfig {
    /// The default batch: one built-in vertex program and one built-in pixel program.
    pub fn builtin_shaders() -> Vec<LoadRequest> {
        vec![
            LoadRequest::new(ShaderStage::Vertex, Cow::Borrowed(BUILTIN_VERTEX_SHADER)),
            LoadRequest::new(ShaderStage::Pixel, Cow::Borrowed(BUILTIN_PIXEL_SHADER)),
        ]
    }
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            title: "OLEDSaver".to_string(),
            style: WindowStyle::Fullscreen,
            threading: ThreadingMode::default(),
            load_mode: LoadMode::default(),
            shaders: Self::builtin_shaders(),
            vertex_slot: 0,
            pixel_slot: 0,
            effect: EffectConfig::default(),
            idle_interval: Duration::from_secs(1),
            gpu_power: GpuPowerPreference::default(),
            vsync: true,
        }
    }
}
