use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use renderer::{Easing, GpuPowerPreference, LoadMode, ThreadingMode};

#[derive(Parser, Debug)]
#[command(
    name = "oledsaver",
    author,
    version,
    about = "Full-screen OLED saver with a CRT-style shutdown effect"
)]
pub struct Cli {
    /// Effect speed in progress units per second (1.0 = one second per transition).
    #[arg(long, value_name = "PROGRESS/SEC", value_parser = parse_rate, default_value = "1.0")]
    pub rate: f32,

    /// Which transitions to run: `power-off`, `power-on`, or `cycle`.
    #[arg(long, value_name = "SEQUENCE", value_parser = parse_sequence, default_value = "power-off")]
    pub sequence: SequenceKind,

    /// Seconds to stay fully on before powering off again in `cycle` mode.
    #[arg(long, value_name = "SECONDS", value_parser = parse_hold, default_value = "5")]
    pub hold: Duration,

    /// Brightness curve: `linear`, `smoothstep`, or `ease-in-out`.
    #[arg(long, value_name = "CURVE", value_parser = parse_easing, default_value = "linear")]
    pub easing: Easing,

    /// Upper bound (ms) of one sleep while the screen is dark.
    #[arg(long, value_name = "MILLISECONDS", value_parser = parse_idle_ms, default_value = "1000")]
    pub idle_ms: Duration,

    /// `cooperative` pumps events and renders on one thread; `dedicated` renders on its own thread.
    #[arg(long, value_name = "MODE", value_parser = parse_threading, default_value = "cooperative")]
    pub threading: ThreadingMode,

    /// `parallel` loads shaders before the first frame; `background` loads them while starting up.
    #[arg(long = "load", value_name = "MODE", value_parser = parse_load_mode, default_value = "parallel")]
    pub load_mode: LoadMode,

    /// Open a decorated window instead of covering the screen.
    #[arg(long)]
    pub windowed: bool,

    /// Window size for `--windowed` (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1280x720")]
    pub size: (u32, u32),

    /// Window title.
    #[arg(long, default_value = "OLEDSaver")]
    pub title: String,

    /// Vertex program file (SPIR-V or WGSL); repeat to load several. Replaces the built-in.
    #[arg(long = "vertex-shader", value_name = "PATH")]
    pub vertex_shaders: Vec<PathBuf>,

    /// Pixel program file (SPIR-V or WGSL); repeat to load several. Replaces the built-in.
    #[arg(long = "pixel-shader", value_name = "PATH")]
    pub pixel_shaders: Vec<PathBuf>,

    /// Loaded vertex slot to draw with.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub vertex_slot: usize,

    /// Loaded pixel slot to draw with.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub pixel_slot: usize,

    /// Adapter power preference: `low` or `high`.
    #[arg(long, value_name = "PREFERENCE", value_parser = parse_gpu_power, default_value = "low")]
    pub gpu_power: GpuPowerPreference,

    /// Present without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,
}

/// Sequence selector; `cycle` picks up its hold time from `--hold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    PowerOff,
    PowerOn,
    Cycle,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_rate(value: &str) -> Result<f32, String> {
    let rate: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid rate '{}'; expected a number", value.trim()))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("rate must be a positive number, got {rate}"));
    }
    Ok(rate)
}

pub fn parse_sequence(value: &str) -> Result<SequenceKind, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "power-off" | "off" | "shutdown" => Ok(SequenceKind::PowerOff),
        "power-on" | "on" | "startup" => Ok(SequenceKind::PowerOn),
        "cycle" | "loop" => Ok(SequenceKind::Cycle),
        other => Err(format!(
            "unknown sequence '{other}'; expected power-off, power-on, or cycle"
        )),
    }
}

pub fn parse_hold(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid hold time '{}'; expected seconds", value.trim()))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err("hold time must be zero or more seconds".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| "hold time is too large".to_string())
}

pub fn parse_easing(value: &str) -> Result<Easing, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "linear" => Ok(Easing::Linear),
        "smoothstep" | "smooth" => Ok(Easing::Smoothstep),
        "ease-in-out" | "easeinout" | "ease" => Ok(Easing::EaseInOut),
        other => Err(format!(
            "unknown easing '{other}'; expected linear, smoothstep, or ease-in-out"
        )),
    }
}

pub fn parse_idle_ms(value: &str) -> Result<Duration, String> {
    let millis: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid idle interval '{}'; expected milliseconds", value.trim()))?;
    if millis == 0 {
        return Err("idle interval must be at least 1 ms".to_string());
    }
    Ok(Duration::from_millis(millis))
}

pub fn parse_threading(value: &str) -> Result<ThreadingMode, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "cooperative" | "single" => Ok(ThreadingMode::Cooperative),
        "dedicated" | "threaded" => Ok(ThreadingMode::Dedicated),
        other => Err(format!(
            "unknown threading mode '{other}'; expected cooperative or dedicated"
        )),
    }
}

pub fn parse_load_mode(value: &str) -> Result<LoadMode, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "parallel" | "blocking" => Ok(LoadMode::Parallel),
        "background" | "async" => Ok(LoadMode::Background),
        other => Err(format!(
            "unknown load mode '{other}'; expected parallel or background"
        )),
    }
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown GPU power preference '{other}'; expected low or high")),
    }
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid window width".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid window height".to_string())?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_must_be_positive_and_finite() {
        assert_eq!(parse_rate("1.0").unwrap(), 1.0);
        assert_eq!(parse_rate(" 2.5 ").unwrap(), 2.5);
        assert!(parse_rate("0").is_err());
        assert!(parse_rate("-1").is_err());
        assert!(parse_rate("inf").is_err());
        assert!(parse_rate("fast").is_err());
    }

    #[test]
    fn parses_sequence_aliases() {
        assert_eq!(parse_sequence("power-off").unwrap(), SequenceKind::PowerOff);
        assert_eq!(parse_sequence("ON").unwrap(), SequenceKind::PowerOn);
        assert_eq!(parse_sequence("cycle").unwrap(), SequenceKind::Cycle);
        assert!(parse_sequence("sideways")
            .unwrap_err()
            .contains("expected power-off"));
    }

    #[test]
    fn parses_hold_seconds() {
        assert_eq!(parse_hold("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_hold("0.25").unwrap(), Duration::from_millis(250));
        assert!(parse_hold("-1").is_err());
        assert!(parse_hold("forever").is_err());
        assert!(parse_hold("1e20").is_err());
    }

    #[test]
    fn parses_easing_curves() {
        assert_eq!(parse_easing("linear").unwrap(), Easing::Linear);
        assert_eq!(parse_easing("Smoothstep").unwrap(), Easing::Smoothstep);
        assert_eq!(parse_easing("ease-in-out").unwrap(), Easing::EaseInOut);
        assert!(parse_easing("bounce").is_err());
    }

    #[test]
    fn idle_interval_rejects_zero() {
        assert_eq!(parse_idle_ms("1000").unwrap(), Duration::from_secs(1));
        assert!(parse_idle_ms("0").is_err());
        assert!(parse_idle_ms("1s").is_err());
    }

    #[test]
    fn parses_modes() {
        assert_eq!(parse_threading("dedicated").unwrap(), ThreadingMode::Dedicated);
        assert_eq!(
            parse_threading("cooperative").unwrap(),
            ThreadingMode::Cooperative
        );
        assert!(parse_threading("both").is_err());
        assert_eq!(parse_load_mode("background").unwrap(), LoadMode::Background);
        assert_eq!(parse_load_mode("parallel").unwrap(), LoadMode::Parallel);
        assert!(parse_load_mode("lazy").is_err());
        assert_eq!(parse_gpu_power("high").unwrap(), GpuPowerPreference::High);
        assert!(parse_gpu_power("medium").is_err());
    }

    #[test]
    fn parses_window_size() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size("800X600").unwrap(), (800, 600));
        assert!(parse_size("0x600").is_err());
        assert!(parse_size("wide").is_err());
    }

    #[test]
    fn defaults_match_the_builtin_saver() {
        let cli = Cli::try_parse_from(["oledsaver"]).unwrap();
        assert_eq!(cli.rate, 1.0);
        assert_eq!(cli.sequence, SequenceKind::PowerOff);
        assert_eq!(cli.idle_ms, Duration::from_secs(1));
        assert_eq!(cli.threading, ThreadingMode::Cooperative);
        assert_eq!(cli.load_mode, LoadMode::Parallel);
        assert!(!cli.windowed);
        assert!(cli.vertex_shaders.is_empty());
        assert!(cli.pixel_shaders.is_empty());
    }

    #[test]
    fn shader_flags_repeat_in_order() {
        let cli = Cli::try_parse_from([
            "oledsaver",
            "--pixel-shader",
            "a.spv",
            "--pixel-shader",
            "b.spv",
            "--vertex-shader",
            "v.wgsl",
        ])
        .unwrap();
        assert_eq!(
            cli.pixel_shaders,
            vec![PathBuf::from("a.spv"), PathBuf::from("b.spv")]
        );
        assert_eq!(cli.vertex_shaders, vec![PathBuf::from("v.wgsl")]);
    }
}
