//! Ricochet demo
//!
//! Hold the left mouse button over the scene to emit particles; they fall,
//! bounce off whatever the camera sees and expire.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ricochet_core::ParticleConfig;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use winit::event_loop::{ControlFlow, EventLoop};

mod app;
mod scene;
mod scene_pass;

use app::{AppOptions, RicochetApp};

#[derive(Parser)]
#[command(name = "ricochet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GPU particles bouncing off the rendered scene", long_about = None)]
struct Cli {
    /// Particle config file (TOML)
    #[arg(short, long, default_value = "config/ricochet.toml")]
    config: PathBuf,

    /// Override the pool capacity (rounded up to whole work-groups)
    #[arg(long)]
    capacity: Option<u32>,

    /// Draw a ground-mirrored view of the particles in an inset
    #[arg(short, long)]
    mirror: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = load_config(&cli.config);
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity.next_multiple_of(config.group_size.max(1));
        if config.capacity != capacity {
            info!("capacity rounded up to {}", config.capacity);
        }
    }
    config.validate().context("invalid particle config")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = RicochetApp::new(AppOptions {
        config,
        mirror: cli.mirror,
    });
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Load the session config, falling back to defaults
fn load_config(path: &Path) -> ParticleConfig {
    match ParticleConfig::load(path) {
        Ok(config) => {
            info!("loaded particle config from {}", path.display());
            config
        }
        Err(e) => {
            error!(
                "could not load {} ({}), using default particle config",
                path.display(),
                e
            );
            ParticleConfig::default()
        }
    }
}
