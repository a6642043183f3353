use bytemuck::{Pod, Zeroable};

use crate::surface::FrameUniforms;

/// GPU mirror of the `EffectParams` block in `shutdown.frag.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct EffectParams {
    pub resolution: [f32; 2],
    pub time: f32,
    pub progress: f32,
    pub brightness: f32,
    pub _pad: [f32; 3],
}

impl EffectParams {
    pub fn new(width: u32, height: u32, frame: &FrameUniforms) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            time: frame.time,
            progress: frame.progress.clamp(0.0, 1.0),
            brightness: frame.brightness.clamp(0.0, 1.0),
            _pad: [0.0; 3],
        }
    }
}

/// Corner of the fullscreen rectangle in clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub position: [f32; 2],
}

/// Triangle-strip order: bottom-left, bottom-right, top-left, top-right.
pub(crate) const FULLSCREEN_QUAD: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [1.0, -1.0] },
    QuadVertex { position: [-1.0, 1.0] },
    QuadVertex { position: [1.0, 1.0] },
];
