//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `radio`: playing a directory or a single file
//! - `info`: track listing, output devices and config

mod info;
mod radio;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::error::{Error, Result};

pub use info::{cmd_config, cmd_devices, cmd_list};
pub use radio::{cmd_play, cmd_radio};

/// chip-radio CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "CHIP_RADIO_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Play every track in a directory, one after the other
    Radio {
        /// Directory to play (default: library.music_dir from the config)
        dir: Option<PathBuf>,
        /// Seconds to play each track
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Volume (0.0-1.0)
        #[arg(short, long)]
        volume: Option<f32>,
    },
    /// Play a single file
    Play {
        /// Path to the audio file
        file: PathBuf,
        /// Seconds to play
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Start position in milliseconds
        #[arg(long, default_value = "0")]
        seek: i64,
        /// Volume (0.0-1.0)
        #[arg(short, long)]
        volume: Option<f32>,
    },
    /// List the tracks of a directory in play order
    List {
        /// Directory to list (default: library.music_dir from the config)
        dir: Option<PathBuf>,
    },
    /// List audio output devices
    Devices,
    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

/// Run the specified CLI command.
///
/// Without a subcommand this plays the configured music directory.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref());

    match &cli.command {
        Some(Commands::Radio {
            dir,
            seconds,
            volume,
        }) => {
            let dir = music_dir(dir.as_deref(), &config)?;
            let seconds = seconds.unwrap_or(config.library.play_seconds);
            cmd_radio(&config, &dir, seconds, checked_volume(*volume)?)
        }
        Some(Commands::Play {
            file,
            seconds,
            seek,
            volume,
        }) => {
            let seconds = seconds.unwrap_or(config.library.play_seconds);
            cmd_play(&config, file, seconds, *seek, checked_volume(*volume)?)
        }
        Some(Commands::List { dir }) => {
            let dir = music_dir(dir.as_deref(), &config)?;
            cmd_list(&dir)
        }
        Some(Commands::Devices) => cmd_devices(&config),
        Some(Commands::Config { init }) => cmd_config(&config, cli.config.as_deref(), *init),
        None => {
            let dir = music_dir(None, &config)?;
            cmd_radio(&config, &dir, config.library.play_seconds, None)
        }
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

/// Directory from the command line, else the configured one.
pub(crate) fn music_dir(arg: Option<&Path>, config: &Config) -> Result<PathBuf> {
    let dir = arg
        .map(Path::to_path_buf)
        .or_else(|| config.library.music_dir.clone())
        .ok_or_else(|| {
            Error::invalid_value("no music directory given and library.music_dir is not set")
        })?;

    if !dir.is_dir() {
        return Err(Error::not_found(dir));
    }
    Ok(dir)
}

/// Volumes outside [0, 1] are a typo on the command line, not a request to clamp.
pub(crate) fn checked_volume(volume: Option<f32>) -> Result<Option<f32>> {
    match volume {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(Error::invalid_value(format!(
            "volume {v} is outside 0.0-1.0"
        ))),
        other => Ok(other),
    }
}
