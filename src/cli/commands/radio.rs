//! Playback commands.

use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::Config;
use crate::error::ResultExt;
use crate::library::TrackEntry;
use crate::player::{self, ControllerStatus, PlaybackController};

/// How often the status line is redrawn.
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Play every track in `dir` for `seconds` each, in name order.
///
/// A track that fails to load is logged and skipped.
pub fn cmd_radio(
    config: &Config,
    dir: &Path,
    seconds: u64,
    volume: Option<f32>,
) -> anyhow::Result<()> {
    let controller = open_controller(config, volume)?;
    let count = controller
        .load_directory(dir)
        .with_context(format!("loading {}", dir.display()))?;
    if count == 0 {
        anyhow::bail!("No tracks in {}", dir.display());
    }

    println!("Playing {} tracks from {}", count, dir.display());
    let mut played = 0;
    for index in 0..count {
        if let Err(e) = controller.play_index(index as isize) {
            error!("Track {} failed: {}", index + 1, e);
            continue;
        }
        played += 1;
        watch(&controller, Duration::from_secs(seconds));
    }

    controller.close();
    println!("Played {} of {} tracks.", played, count);
    Ok(())
}

/// Play one file for `seconds`, starting at `seek_ms`.
pub fn cmd_play(
    config: &Config,
    file: &Path,
    seconds: u64,
    seek_ms: i64,
    volume: Option<f32>,
) -> anyhow::Result<()> {
    let entry = TrackEntry::from_path(file.to_path_buf());
    let bytes = entry
        .read()
        .with_context(format!("reading {}", file.display()))?;

    let controller = open_controller(config, volume)?;
    controller
        .play(&entry.name, bytes)
        .with_context(format!("playing {}", entry.name))?;
    if seek_ms > 0 {
        controller.seek(seek_ms)?;
    }

    watch(&controller, Duration::from_secs(seconds));
    controller.close();
    Ok(())
}

fn open_controller(config: &Config, volume: Option<f32>) -> anyhow::Result<PlaybackController> {
    let controller = player::default_controller(
        config.playback.output_device(),
        config.playback.settings(),
    );
    if let Some(volume) = volume {
        controller.set_volume(volume)?;
    }
    Ok(controller)
}

/// Redraw a status line until `limit` passes or the track ends.
fn watch(controller: &PlaybackController, limit: Duration) {
    let started = Instant::now();
    loop {
        let status = controller.status();
        print!("\r{}", status_line(&status));
        let _ = std::io::stdout().flush();

        if !status.is_playing() {
            break;
        }
        let elapsed = started.elapsed();
        if elapsed >= limit {
            break;
        }
        thread::sleep(STATUS_INTERVAL.min(limit - elapsed));
    }
    println!();

    if let Some(name) = controller.status().now_playing {
        info!("Done with {}", name);
    }
}

fn status_line(status: &ControllerStatus) -> String {
    let name = status.now_playing.as_deref().unwrap_or("-");
    let progress = status
        .progress()
        .map(|p| format!(" ({:>3.0}%)", p * 100.0))
        .unwrap_or_default();
    format!(
        "{:?} {} [{} / {}]{} vol {:.0}%",
        status.state,
        name,
        status.position_str(),
        status.duration_str(),
        progress,
        status.volume * 100.0
    )
}
