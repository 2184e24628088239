//! Controller state and playback settings types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::decoder::{PlaySpan, SongMeta};

/// Transport state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Nothing playing; a loaded track (if any) sits at position 0
    #[default]
    Idle,
    Playing,
    Paused,
    /// Terminal, after `close`
    Closed,
}

impl TransportState {
    pub fn is_playing(self) -> bool {
        self == TransportState::Playing
    }
}

/// How the worker paces itself between buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// Sleep a fixed tick
    #[default]
    Fixed,
    /// Sleep for the latency the sink reports, never less than the tick
    DeviceLatency,
}

/// How a loaded song repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopMode {
    /// Always loop, whatever the song says
    #[default]
    Forever,
    /// Follow the song's own loop flag and duration
    Song,
}

impl LoopMode {
    /// Resolve the span a song should be played for.
    pub fn span_for(self, song: Option<&SongMeta>) -> PlaySpan {
        match (self, song) {
            (LoopMode::Forever, _) => PlaySpan::Forever,
            (LoopMode::Song, Some(meta)) if meta.looping => PlaySpan::Forever,
            (LoopMode::Song, Some(SongMeta { duration: Some(d), .. })) => PlaySpan::For(*d),
            (LoopMode::Song, _) => PlaySpan::Once,
        }
    }
}

/// Snapshot of the controller for display.
#[derive(Debug, Clone, Default)]
pub struct ControllerStatus {
    pub state: TransportState,
    /// Display name of the loaded track
    pub now_playing: Option<String>,
    /// Size of the loaded track's payload
    pub track_bytes: usize,
    /// Channel count of the open stream
    pub channels: u16,
    /// Last normalized volume (0.0 - 1.0)
    pub volume: f32,
    /// Decoder cursor
    pub position: Duration,
    /// Length of the current song, when the decoder knows it
    pub duration: Option<Duration>,
}

impl ControllerStatus {
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Position as a fraction of the song (0.0 - 1.0), if the length is known.
    pub fn progress(&self) -> Option<f32> {
        let duration = self.duration.filter(|d| !d.is_zero())?;
        Some((self.position.as_secs_f32() / duration.as_secs_f32()).min(1.0))
    }

    /// Format position as MM:SS.
    pub fn position_str(&self) -> String {
        format_duration(self.position)
    }

    /// Format duration as MM:SS, or `--:--` when unknown.
    pub fn duration_str(&self) -> String {
        self.duration
            .map(format_duration)
            .unwrap_or_else(|| "--:--".to_string())
    }
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
