//! Decode-and-stream playback with transport control.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               PlaybackController (caller threads)               │
//! │   play / pause / start / stop / seek / set_volume / close      │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ one Mutex<Session>
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    radio-worker (10ms tick)                     │
//! │     decoder.generate(8 KiB)  →  sink.write (blocking)           │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ bounded channel of i16 chunks
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      cpal output callback                       │
//! │                  44.1kHz S16 to hardware                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod controller;
mod decoder;
mod output;
mod resampler;
mod sink;
mod state;
mod volume;

pub use controller::{PlaybackController, PlaybackSettings};
pub use decoder::{PlaySpan, SongDecoder, SongInfo, SongMeta, SymphoniaDecoder, validate_payload};
pub use output::{CpalOutput, CpalSink, current_audio_device, list_audio_devices};
pub use resampler::Resampler;
pub use sink::{
    AbortHandle, AbortSignal, AudioSink, BITS_PER_SAMPLE, OutputDevice, SAMPLE_RATE, StreamFormat,
    pcm16_samples,
};
pub use state::{ControllerStatus, LoopMode, Pacing, TransportState, format_duration};
pub use volume::{GainRange, clamp_percent, db_to_amplitude};

use std::io;
use std::path::PathBuf;

/// Build a controller on the default stack: symphonia decoding, cpal output.
pub fn default_controller(
    device_name: Option<String>,
    settings: PlaybackSettings,
) -> PlaybackController {
    PlaybackController::new(
        Box::new(SymphoniaDecoder::new()),
        Box::new(CpalOutput::new(device_name)),
        settings,
    )
}

/// Player errors.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// Track list or track file could not be read
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Payload could not be parsed or played
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// Output line could not be opened or driven
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Player is closed")]
    Closed,
}

impl PlayerError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }

    /// Nothing to play at `path`.
    pub fn no_tracks(path: impl Into<PathBuf>, reason: &str) -> Self {
        Self::io(path, io::Error::new(io::ErrorKind::NotFound, reason.to_string()))
    }
}
