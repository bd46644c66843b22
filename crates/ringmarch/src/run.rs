use std::borrow::Cow;
use std::fs;

use anyhow::{Context, Result};
use renderer::{check_program, Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    if cli.check {
        check_program(&config.fragment_payload).context("shader program check failed")?;
        println!("shader program compiled and linked");
        return Ok(());
    }

    let mut renderer = Renderer::new(config);
    renderer.run()
}

fn build_config(cli: &Cli) -> Result<RendererConfig> {
    let mut config = RendererConfig {
        surface_size: cli.size,
        gpu_power: cli.gpu_power.into(),
        ..RendererConfig::default()
    };

    if let Some(path) = &cli.fragment {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read fragment payload at {}", path.display()))?;
        tracing::info!(path = %path.display(), "using fragment payload from file");
        config.fragment_payload = Cow::Owned(payload);
    }

    Ok(config)
}

/// Installs the fmt subscriber; `RINGMARCH_LOG` wins over `RUST_LOG`.
pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_env("RINGMARCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
