//! Listing and inspection commands.

use std::path::Path;

use crate::config::{self, Config};
use crate::error::ResultExt;
use crate::library::Library;
use crate::player::{current_audio_device, list_audio_devices};

/// Print the tracks of `dir` in play order.
pub fn cmd_list(dir: &Path) -> anyhow::Result<()> {
    let library = Library::load_directory(dir)?;
    if library.is_empty() {
        println!("No tracks in {}", dir.display());
        return Ok(());
    }

    for (index, track) in library.tracks().iter().enumerate() {
        println!("{:>4}  {}", index, track.name);
    }
    println!("{} tracks.", library.len());
    Ok(())
}

/// Print the output devices, marking the default and the configured one.
pub fn cmd_devices(config: &Config) -> anyhow::Result<()> {
    let default = current_audio_device();
    let configured = config.playback.output_device();

    let devices = list_audio_devices();
    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }

    for name in devices {
        let mut marks = Vec::new();
        if name == default {
            marks.push("default");
        }
        if configured.as_deref() == Some(name.as_str()) {
            marks.push("configured");
        }
        if marks.is_empty() {
            println!("  {}", name);
        } else {
            println!("  {} ({})", name, marks.join(", "));
        }
    }
    Ok(())
}

/// Print the effective config; with `init`, write it out first.
pub fn cmd_config(config: &Config, path: Option<&Path>, init: bool) -> anyhow::Result<()> {
    if init {
        let defaults = Config::default();
        let written = match path {
            Some(path) => {
                config::save_to(&defaults, path)
                    .with_context(format!("writing {}", path.display()))?;
                path.to_path_buf()
            }
            None => config::save(&defaults).with_context("writing default config")?,
        };
        println!("Wrote default config to {}", written.display());
        print!("{}", toml::to_string_pretty(&defaults)?);
        return Ok(());
    }

    let path = path.map(Path::to_path_buf).or_else(config::config_path);
    match path.as_deref() {
        Some(path) if path.exists() => println!("# {}", path.display()),
        Some(path) => println!("# {} (not found, using defaults)", path.display()),
        None => println!("# no config directory, using defaults"),
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
