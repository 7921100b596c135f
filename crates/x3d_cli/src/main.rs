//! x3dnav
//!
//! Drive the X3D input runtime from the command line: run a scripted
//! navigation session, inspect configuration and list navigation modes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use x3d_input::NavigationMode;

mod config;
mod demo;

use config::NavConfig;

#[derive(Parser)]
#[command(name = "x3dnav")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "X3D picking and navigation runtime", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./x3dnav.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted sensor and navigation session
    Demo {
        /// Frames spent walking
        #[arg(short, long)]
        frames: Option<usize>,

        /// Navigation mode to start in
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// List navigation modes
    Modes,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Validate a configuration file
    Check {
        /// File to check
        #[arg(default_value = config::CONFIG_FILE)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match cli.command {
        Commands::Demo { frames, mode } => cmd_demo(cli.config.as_deref(), frames, mode),
        Commands::Config { command } => match command {
            ConfigCommands::Show => cmd_config_show(cli.config.as_deref()),
            ConfigCommands::Check { path } => cmd_config_check(&path),
        },
        Commands::Modes => cmd_modes(),
    }
}

fn cmd_demo(config: Option<&Path>, frames: Option<usize>, mode: Option<String>) -> Result<()> {
    let mut config = NavConfig::load_or_default(config)?;
    if let Some(frames) = frames {
        config.demo.frames = frames;
    }
    if let Some(mode) = mode {
        config.demo.mode = mode.to_uppercase();
    }
    config.validate()?;

    let summary = demo::run(&config)?;
    println!("frames:      {}", summary.frames);
    println!("events:      {}", summary.handled_events);
    println!("mode:        {}", summary.mode);
    println!(
        "position:    ({:.3}, {:.3}, {:.3})",
        summary.position.x, summary.position.y, summary.position.z
    );
    println!(
        "slider:      ({:.3}, {:.3}, {:.3})",
        summary.slider.x, summary.slider.y, summary.slider.z
    );
    match summary.touch_time {
        Some(time) => println!("touch time:  {time:.3}"),
        None => warn!("touch sensor never fired"),
    }
    println!("links:       {}", summary.links);
    if let Some((near, far)) = summary.clip {
        println!("clip planes: {near:.3} .. {far:.1}");
    }
    Ok(())
}

fn cmd_config_show(config: Option<&Path>) -> Result<()> {
    let config = NavConfig::load_or_default(config)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_config_check(path: &Path) -> Result<()> {
    let config = NavConfig::load(path)?;
    info!("{} is valid", path.display());
    let modes = &config.navigation.modes;
    if !modes.iter().any(|m| m == "ANY") && modes.iter().all(|m| NavigationMode::from_name(m).is_none()) {
        warn!("navigation.modes allows no navigation");
    }
    Ok(())
}

fn cmd_modes() -> Result<()> {
    for mode in NavigationMode::ALL {
        let kind = if mode.orbits() { "orbit" } else { "free" };
        println!("{:<14} {}", mode.name(), kind);
    }
    println!("{:<14} any mode may be selected", "ANY");
    Ok(())
}
