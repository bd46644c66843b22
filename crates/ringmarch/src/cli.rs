use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "ringmarch",
    author,
    version,
    about = "Raymarched torus rendered through a GLSL program harness"
)]
pub struct Cli {
    /// Initial window size in physical pixels (e.g. `1280x720`).
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        default_value = "1280x720",
        env = "RINGMARCH_SIZE",
        value_parser = parse_size
    )]
    pub size: (u32, u32),

    /// Replace the bundled scene with a `mainImage` payload read from a file.
    #[arg(long, value_name = "PATH", env = "RINGMARCH_FRAGMENT")]
    pub fragment: Option<PathBuf>,

    /// Compile and link the shader program without opening a window, then exit.
    #[arg(long)]
    pub check: bool,

    /// Adapter power preference.
    #[arg(
        long,
        value_enum,
        value_name = "low|high",
        default_value_t = GpuPower::High,
        env = "RINGMARCH_GPU_POWER"
    )]
    pub gpu_power: GpuPower,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuPower {
    Low,
    High,
}

impl From<GpuPower> for GpuPowerPreference {
    fn from(value: GpuPower) -> Self {
        match value {
            GpuPower::Low => GpuPowerPreference::Low,
            GpuPower::High => GpuPowerPreference::High,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("size '{trimmed}' must be non-zero in both dimensions"));
    }
    Ok((width, height))
}
