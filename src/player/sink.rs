//! Output sink contract.
//!
//! A sink is one open playback channel with a fixed PCM format. The
//! controller opens a new one per track through an [`OutputDevice`] and
//! writes raw S16LE bytes into it.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

use super::PlayerError;
use super::volume::GainRange;

/// Output sample rate, fixed for every stream.
pub const SAMPLE_RATE: u32 = 44_100;

/// Output bit depth, fixed for every stream.
pub const BITS_PER_SAMPLE: u16 = 16;

/// PCM format descriptor handed to the device when a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub signed: bool,
    pub big_endian: bool,
}

impl StreamFormat {
    /// Signed 16-bit little-endian at 44.1kHz.
    pub fn pcm16(channels: u16) -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            channels,
            signed: true,
            big_endian: false,
        }
    }

    /// Bytes per interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Playback time represented by `bytes` of PCM in this format.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frame_bytes = self.frame_bytes();
        if frame_bytes == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (bytes / frame_bytes) as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz / {}ch / {}bit {}{}",
            self.sample_rate,
            self.channels,
            self.bits_per_sample,
            if self.signed { "signed" } else { "unsigned" },
            if self.big_endian { " BE" } else { " LE" }
        )
    }
}

/// An open playback channel.
pub trait AudioSink: Send {
    /// The format this sink was opened with.
    fn format(&self) -> &StreamFormat;

    /// Begin rendering written data.
    fn start(&mut self) -> Result<(), PlayerError>;

    /// Write PCM bytes, blocking while the sink's internal buffer is full.
    ///
    /// Returns the number of bytes accepted. Trailing bytes that do not make
    /// up a whole frame are not written.
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Native gain range of this sink.
    fn gain_range(&self) -> GainRange;

    /// Set the gain, in the units of [`AudioSink::gain_range`].
    fn set_gain(&mut self, gain: f32);

    /// Current gain.
    fn gain(&self) -> f32;

    /// Approximate time until data written now is heard.
    fn latency(&self) -> Duration;

    /// Handle that unblocks [`AudioSink::write`] from another thread.
    fn abort_handle(&self) -> AbortHandle;

    /// Release the channel. Further writes are dropped.
    fn close(&mut self);
}

/// Aborts a sink's writes, including one currently blocked.
///
/// Aborting is sticky: every later write returns 0 at once.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

/// Sink side of an [`AbortHandle`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: Receiver<()>,
}

impl AbortHandle {
    pub fn new() -> (AbortHandle, AbortSignal) {
        // Nothing is ever sent; dropping the sender is the signal
        let (tx, rx) = bounded(0);
        (
            AbortHandle {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            AbortSignal { rx },
        )
    }

    pub fn abort(&self) {
        self.tx.lock().take();
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Becomes ready (with an error) once aborted; for use in `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Block until aborted.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }
}

/// Something that can open sinks, usually a sound card.
pub trait OutputDevice: Send + Sync {
    fn open(&self, format: StreamFormat) -> Result<Box<dyn AudioSink>, PlayerError>;
}

/// Convert a little-endian S16 byte buffer into samples. A trailing odd byte is ignored.
pub fn pcm16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
