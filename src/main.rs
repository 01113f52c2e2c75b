mod wgpu_window;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tumble_simulator::{SimulationConfig, SimulationEngine, SimulationSnapshot};
use wgpu_window::{run_wgpu_window, WindowOptions};

#[derive(Parser, Debug)]
#[command(name = "tumble", version, about = "Torque-free tumbling of a rigid box")]
struct Opts {
    /// TOML file with simulation parameters (defaults for anything missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without a window and log the state once per second
    #[arg(long)]
    headless: bool,

    /// How long a headless run lasts, in seconds
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Distance from the camera to the centre of the box
    #[arg(long, default_value_t = 15.0)]
    camera_distance: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    info!("starting with {config:?}");

    let engine = Arc::new(SimulationEngine::new(config).context("invalid configuration")?);
    engine.start()?;

    let outcome = if opts.headless {
        run_headless(&engine, opts.seconds)
    } else {
        run_wgpu_window(
            Arc::clone(&engine),
            WindowOptions {
                width: opts.width,
                height: opts.height,
                camera_distance: opts.camera_distance,
            },
        )
    };

    engine.stop();
    report(&engine.snapshot());
    outcome
}

fn run_headless(engine: &SimulationEngine, seconds: f64) -> Result<()> {
    let duration = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("invalid duration: {seconds} s"))?;
    let started = Instant::now();
    while started.elapsed() < duration {
        thread::sleep(Duration::from_secs(1).min(duration.saturating_sub(started.elapsed())));
        report(&engine.snapshot());
    }
    Ok(())
}

fn report(snapshot: &SimulationSnapshot) {
    let w = snapshot.angular_velocity;
    let l = snapshot.world_angular_momentum;
    info!(
        "step {} t = {:.3} s  E = {:.6}  ω = ({:.3}, {:.3}, {:.3})  L_world = ({:.3}, {:.3}, {:.3}){}",
        snapshot.step,
        snapshot.time,
        snapshot.kinetic_energy,
        w.x,
        w.y,
        w.z,
        l.x,
        l.y,
        l.z,
        if snapshot.is_faulted() { "  [unstable]" } else { "" },
    );
}
