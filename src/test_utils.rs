//! Test utilities and fakes for chip-radio tests.
//!
//! [`FakeDecoder`] and [`FakeOutput`] stand in for symphonia and the sound
//! card. Both are cheap handles over shared state: keep a clone, hand the
//! other to the controller, then inspect what happened.
//!
//! # Example
//!
//! ```ignore
//! let decoder = FakeDecoder::new();
//! let output = FakeOutput::new();
//! let controller = PlaybackController::new(
//!     Box::new(decoder.clone()),
//!     Box::new(output.clone()),
//!     PlaybackSettings::default(),
//! );
//! controller.play("intro.sap", vec![1; 64])?;
//! assert_eq!(output.opened(), 1);
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::player::{
    AbortHandle, AbortSignal, AudioSink, GainRange, OutputDevice, PlaySpan, PlayerError,
    SAMPLE_RATE, SongDecoder, SongInfo, SongMeta, StreamFormat, validate_payload,
};

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    check()
}

/// A 16-bit PCM WAV file holding a 440Hz tone.
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
    let block_align = channels as u32 * 2;
    let data_len = frames * block_align;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    out.extend_from_slice(&(block_align as u16).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
        for _ in 0..channels {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

#[derive(Debug, Default)]
struct DecoderLog {
    channels: u16,
    song: Option<SongMeta>,
    loads: usize,
    last_song: Option<(usize, PlaySpan)>,
    frames: u64,
    /// Bytes left before the song ends (`None` = endless)
    remaining: Option<usize>,
    limit: Option<usize>,
    fail_seeks: bool,
}

/// Scripted decoder. Accepts any payload except names ending in `.bad`.
#[derive(Debug, Clone)]
pub struct FakeDecoder {
    log: Arc<Mutex<DecoderLog>>,
    /// Per-instance, so the controller's copy can lend it out
    info: Option<SongInfo>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        let log = DecoderLog {
            channels: 2,
            ..Default::default()
        };
        Self {
            log: Arc::new(Mutex::new(log)),
            info: None,
        }
    }

    /// Channel count reported for the next load.
    pub fn set_channels(&self, channels: u16) {
        self.log.lock().channels = channels;
    }

    /// Metadata reported for the next load (default: loops, 2 minutes).
    pub fn set_song(&self, song: SongMeta) {
        self.log.lock().song = Some(song);
    }

    /// Songs end after this many bytes.
    pub fn limit_output(&self, bytes: usize) {
        self.log.lock().limit = Some(bytes);
    }

    pub fn fail_seeks(&self, fail: bool) {
        self.log.lock().fail_seeks = fail;
    }

    pub fn loads(&self) -> usize {
        self.log.lock().loads
    }

    pub fn last_song(&self) -> Option<(usize, PlaySpan)> {
        self.log.lock().last_song
    }

    /// Cursor as the decoder sees it.
    pub fn cursor_ms(&self) -> u64 {
        self.log.lock().frames * 1000 / SAMPLE_RATE as u64
    }
}

impl SongDecoder for FakeDecoder {
    fn load(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), PlayerError> {
        validate_payload(name, &bytes)?;
        if Path::new(name).extension().is_some_and(|e| e == "bad") {
            return Err(PlayerError::decode(format!("{name}: malformed header")));
        }

        let mut log = self.log.lock();
        log.loads += 1;
        log.last_song = None;
        log.frames = 0;
        let song = log.song.clone().unwrap_or(SongMeta {
            duration: Some(Duration::from_secs(120)),
            looping: true,
        });
        self.info = Some(SongInfo {
            channels: log.channels,
            songs: vec![song],
        });
        Ok(())
    }

    fn info(&self) -> Option<&SongInfo> {
        self.info.as_ref()
    }

    fn play_song(&mut self, song: usize, span: PlaySpan) -> Result<(), PlayerError> {
        if self.info.is_none() {
            return Err(PlayerError::decode("no payload loaded"));
        }
        let mut log = self.log.lock();
        log.last_song = Some((song, span));
        log.frames = 0;
        log.remaining = log.limit;
        Ok(())
    }

    fn generate(&mut self, buffer: &mut [u8]) -> usize {
        let mut log = self.log.lock();
        if log.last_song.is_none() {
            return 0;
        }
        let frame_bytes = log.channels.max(1) as usize * 2;
        let mut n = buffer.len() - buffer.len() % frame_bytes;
        if let Some(remaining) = log.remaining {
            n = n.min(remaining);
            log.remaining = Some(remaining - n);
        }
        for (i, byte) in buffer[..n].iter_mut().enumerate() {
            *byte = i as u8;
        }
        log.frames += (n / frame_bytes) as u64;
        n
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError> {
        let mut log = self.log.lock();
        if log.fail_seeks {
            return Err(PlayerError::decode("seek not supported"));
        }
        log.frames = position_ms * SAMPLE_RATE as u64 / 1000;
        log.remaining = log.limit;
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.cursor_ms()
    }
}

#[derive(Debug, Default)]
struct OutputLog {
    opened: usize,
    closed: usize,
    started: bool,
    formats: Vec<StreamFormat>,
    gains: Vec<f32>,
    write_sizes: Vec<usize>,
    fail_next_open: bool,
    latency: Duration,
    stall: bool,
    stalled_writes: usize,
    write_cap: Option<usize>,
}

/// Recording output device. Its sinks take a dB gain range of `[-80, 6]`.
#[derive(Debug, Clone, Default)]
pub struct FakeOutput {
    log: Arc<Mutex<OutputLog>>,
}

impl FakeOutput {
    pub const GAIN_RANGE: GainRange = GainRange {
        min: -80.0,
        max: 6.0,
    };

    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail with a device error.
    pub fn fail_next_open(&self) {
        self.log.lock().fail_next_open = true;
    }

    /// Latency reported by sinks.
    pub fn set_latency(&self, latency: Duration) {
        self.log.lock().latency = latency;
    }

    /// Writes block until the sink is aborted, like a device that stopped draining.
    pub fn stall_writes(&self) {
        self.log.lock().stall = true;
    }

    /// Sinks accept at most `bytes` per write.
    pub fn cap_writes(&self, bytes: usize) {
        self.log.lock().write_cap = Some(bytes);
    }

    /// Writes that blocked on a stalled sink.
    pub fn stalled_writes(&self) -> usize {
        self.log.lock().stalled_writes
    }

    pub fn opened(&self) -> usize {
        self.log.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.log.lock().closed
    }

    /// Sinks currently open.
    pub fn open_now(&self) -> usize {
        let log = self.log.lock();
        log.opened - log.closed
    }

    pub fn started(&self) -> bool {
        self.log.lock().started
    }

    pub fn last_format(&self) -> Option<StreamFormat> {
        self.log.lock().formats.last().copied()
    }

    pub fn last_gain(&self) -> Option<f32> {
        self.log.lock().gains.last().copied()
    }

    pub fn writes(&self) -> usize {
        self.log.lock().write_sizes.len()
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.log.lock().write_sizes.clone()
    }

    pub fn bytes_written(&self) -> usize {
        self.log.lock().write_sizes.iter().sum()
    }
}

impl OutputDevice for FakeOutput {
    fn open(&self, format: StreamFormat) -> Result<Box<dyn AudioSink>, PlayerError> {
        let mut log = self.log.lock();
        if std::mem::take(&mut log.fail_next_open) {
            return Err(PlayerError::device("line unavailable"));
        }
        log.opened += 1;
        log.formats.push(format);
        let (abort, aborted) = AbortHandle::new();
        Ok(Box::new(FakeSink {
            format,
            gain: 0.0,
            open: true,
            abort,
            aborted,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSink {
    format: StreamFormat,
    gain: f32,
    open: bool,
    abort: AbortHandle,
    aborted: AbortSignal,
    log: Arc<Mutex<OutputLog>>,
}

impl AudioSink for FakeSink {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn start(&mut self) -> Result<(), PlayerError> {
        self.log.lock().started = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        if !self.open || self.aborted.is_aborted() {
            return 0;
        }
        let mut log = self.log.lock();
        if log.stall {
            log.stalled_writes += 1;
            drop(log);
            self.aborted.wait();
            return 0;
        }
        let len = log.write_cap.map_or(bytes.len(), |cap| cap.min(bytes.len()));
        let n = len - len % self.format.frame_bytes();
        log.write_sizes.push(n);
        n
    }

    fn gain_range(&self) -> GainRange {
        FakeOutput::GAIN_RANGE
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        self.log.lock().gains.push(gain);
    }

    fn gain(&self) -> f32 {
        self.gain
    }

    fn latency(&self) -> Duration {
        self.log.lock().latency
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn close(&mut self) {
        self.abort.abort();
        if std::mem::replace(&mut self.open, false) {
            self.log.lock().closed += 1;
        }
    }
}
