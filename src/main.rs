//! chip-radio - a small chiptune-style music player.
//!
//! Decodes tracks with symphonia, streams 16-bit PCM to a cpal output and
//! exposes transport control (play, pause, stop, seek, volume). The CLI
//! plays a directory as a radio or a single file.

pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod player;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chip_radio=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
