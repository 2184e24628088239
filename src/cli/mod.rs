//! Command-line interface for chip-radio.
//!
//! Drives a [`PlaybackController`](crate::player::PlaybackController) from
//! the terminal: play a directory as a radio, play one file, or inspect the
//! track list, devices and config.

mod commands;

pub use commands::{Cli, Commands, run_command};
