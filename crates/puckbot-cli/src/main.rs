//! `puckbot-cli` – PuckBot Command Line Interface
//!
//! Runs the control core against a simulated rig.  It:
//!
//! 1. Initialises tracing (see [`puckbot_runtime::telemetry`]).
//! 2. Loads `~/.puckbot/config.toml`, writing the defaults on first run.
//! 3. Wires a [`Supervisor`] and a usage recorder to an in-process arena and
//!    feeds it synthetic perception frames at the control rate.
//! 4. Intercepts **Ctrl-C** to stop every machine with zero output and exit.

mod config;
mod world;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use puckbot_hal::SimRig;
use puckbot_memory::UsageLog;
use puckbot_perception::SensorHub;
use puckbot_runtime::{RobotConfig, Supervisor, Wiring};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::world::SimWorld;

fn main() {
    let _telemetry = puckbot_runtime::init_tracing("puckbot");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping all machines …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the rig can only be stopped by killing the process");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let path = config::config_path();
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => first_run(&path),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = RobotConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start the async runtime".red(), e);
            return;
        }
    };
    runtime.block_on(run(cfg, &path, shutdown));
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulation loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: RobotConfig, config_file: &Path, shutdown: Arc<AtomicBool>) {
    let handle = tokio::runtime::Handle::current();
    let hub = Arc::new(SensorHub::with_alphas(
        cfg.perception.signal_alpha,
        cfg.perception.trend_alpha,
    ));
    let rig = SimRig::new();
    let wiring = Wiring::new(
        handle.clone(),
        Arc::clone(&hub),
        rig.actuator(),
        rig.indicator(),
        rig.transponder(),
    );

    let mut supervisor = match Supervisor::new(&cfg, wiring) {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Invalid configuration".red(), e);
            return;
        }
    };

    let recorder = if cfg.usage.enabled {
        let path = config::usage_log_path(&cfg, config_file);
        match UsageLog::create(&path) {
            Ok(log) => {
                println!("  Usage log at {}", path.display().to_string().bold());
                Some(supervisor.usage_recorder().spawn(log, &handle))
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "usage logging disabled");
                None
            }
        }
    } else {
        None
    };

    let world_seed = cfg.control.seed.map_or_else(rand::random, |s| s.wrapping_add(100));
    let mut world = SimWorld::new(cfg.stall_model(), StdRng::seed_from_u64(world_seed));

    println!("  Simulated rig running.  Press {} to stop.\n", "Ctrl-C".bold().cyan());

    let timestep = cfg.timestep();
    let mut frames = tokio::time::interval(timestep);
    frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_mode = supervisor.mode();
    while !shutdown.load(Ordering::SeqCst) {
        frames.tick().await;
        world.step(timestep, supervisor.last_output(), supervisor.state_code(), &hub);
        let detections = world.frame(&hub);
        // A switch may wait on a machine that is mid-sequence.
        tokio::task::block_in_place(|| supervisor.on_frame(&detections));

        if supervisor.mode() != last_mode {
            last_mode = supervisor.mode();
            println!(
                "  {} mode {:?} (battery {:.2} V)",
                "→".cyan(),
                last_mode,
                world.battery()
            );
        }
        if supervisor.is_shut_down() {
            println!("{}", "  ✗ Chronic stall – all machines stopped.".red().bold());
            break;
        }
    }

    tokio::task::block_in_place(|| supervisor.stop_all());
    println!("{}", "  ✓ Output zeroed.".green());

    if let Some(recorder) = recorder
        && let Some(log) = recorder.shutdown().await
    {
        info!(rows = log.rows(), "usage log closed");
    }
    println!("{}", "  ✓ Exiting PuckBot.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run(path: &Path) -> RobotConfig {
    println!();
    println!("  No configuration found.  Writing defaults.");
    let cfg = RobotConfig::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}\n",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    let mut cfg = cfg;
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ___           __   ___       __ "#.bold().cyan());
    println!("{}", r#"   / _ \__ ______/ /__/ _ )___  / /_"#.bold().cyan());
    println!("{}", r#"  / ___/ // / __/  '_/ _  / _ \/ __/"#.bold().cyan());
    println!("{}", r#" /_/   \_,_/\__/_/\_\/____/\___/\__/ "#.bold().cyan());
    println!();
    println!("  {} {}", "PuckBot".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Charge, meet, repeat");
    println!();
}
