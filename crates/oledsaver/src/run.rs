use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use renderer::shaders::ShaderFormat;
use renderer::{
    EffectConfig, EffectSequence, LoadRequest, SaverConfig, ShaderStage, WindowStyle,
    BUILTIN_PIXEL_SHADER, BUILTIN_VERTEX_SHADER,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, SequenceKind};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    renderer::run(config)?;
    info!("saver closed");
    Ok(())
}

/// Turns parsed arguments into the renderer configuration, reading shader
/// files up front so bad paths fail before any window appears.
pub fn build_config(cli: &Cli) -> Result<SaverConfig> {
    let vertex = stage_requests(ShaderStage::Vertex, &cli.vertex_shaders, BUILTIN_VERTEX_SHADER)?;
    let pixel = stage_requests(ShaderStage::Pixel, &cli.pixel_shaders, BUILTIN_PIXEL_SHADER)?;
    check_slot(ShaderStage::Vertex, cli.vertex_slot, vertex.len())?;
    check_slot(ShaderStage::Pixel, cli.pixel_slot, pixel.len())?;

    let sequence = match cli.sequence {
        SequenceKind::PowerOff => EffectSequence::PowerOff,
        SequenceKind::PowerOn => EffectSequence::PowerOn,
        SequenceKind::Cycle => EffectSequence::Cycle { hold: cli.hold },
    };
    let style = if cli.windowed {
        WindowStyle::Windowed {
            width: cli.size.0,
            height: cli.size.1,
        }
    } else {
        WindowStyle::Fullscreen
    };

    let mut shaders = vertex;
    shaders.extend(pixel);

    Ok(SaverConfig {
        title: cli.title.clone(),
        style,
        threading: cli.threading,
        load_mode: cli.load_mode,
        shaders,
        vertex_slot: cli.vertex_slot,
        pixel_slot: cli.pixel_slot,
        effect: EffectConfig {
            rate: cli.rate,
            sequence,
            easing: cli.easing,
        },
        idle_interval: cli.idle_ms,
        gpu_power: cli.gpu_power,
        vsync: !cli.no_vsync,
    })
}

fn stage_requests(
    stage: ShaderStage,
    paths: &[PathBuf],
    builtin: &'static [u8],
) -> Result<Vec<LoadRequest>> {
    if paths.is_empty() {
        return Ok(vec![LoadRequest::new(stage, Cow::Borrowed(builtin))]);
    }
    paths
        .iter()
        .map(|path| read_shader(stage, path))
        .collect()
}

fn read_shader(stage: ShaderStage, path: &Path) -> Result<LoadRequest> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read {stage} shader {}", path.display()))?;
    ShaderFormat::detect(&bytes)
        .with_context(|| format!("{stage} shader {} is not usable", path.display()))?;
    tracing::debug!(%stage, path = %path.display(), bytes = bytes.len(), "read shader file");
    Ok(LoadRequest::new(stage, bytes))
}

fn check_slot(stage: ShaderStage, slot: usize, loaded: usize) -> Result<()> {
    if slot >= loaded {
        bail!("{stage} slot {slot} requested but only {loaded} {stage} shader(s) are loaded");
    }
    Ok(())
}
