//! Audio output using cpal.
//!
//! Each [`CpalSink`] owns a dedicated thread that builds the cpal stream and
//! keeps it alive until the sink is closed; cpal streams are not `Send` on
//! every platform, so the stream itself never leaves that thread. Written
//! PCM reaches the device callback through a bounded channel, which is what
//! makes [`AudioSink::write`] block when the device falls behind.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use parking_lot::RwLock;

use super::PlayerError;
use super::sink::{
    AbortHandle, AbortSignal, AudioSink, OutputDevice, StreamFormat, pcm16_samples,
};
use super::volume::{GainRange, db_to_amplitude};

/// Chunks that may wait for the device before `write` blocks.
const QUEUED_CHUNKS: usize = 4;

/// Shortest time a write waits for the device before giving up.
const MIN_WRITE_WAIT: Duration = Duration::from_millis(100);

/// Gain range exposed by cpal sinks, in dB.
const GAIN_RANGE: GainRange = GainRange::MASTER_DB;

/// Opens sinks on a cpal output device.
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    /// Device to use (`None` = system default)
    device_name: Option<String>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputDevice for CpalOutput {
    fn open(&self, format: StreamFormat) -> Result<Box<dyn AudioSink>, PlayerError> {
        let sink = CpalSink::open(self.device_name.clone(), format)?;
        Ok(Box::new(sink))
    }
}

/// Messages to the thread that owns the cpal stream.
enum StreamControl {
    Start(Sender<Result<(), PlayerError>>),
    Close,
}

/// One open cpal output stream.
pub struct CpalSink {
    format: StreamFormat,
    chunk_tx: Option<Sender<Vec<i16>>>,
    control_tx: Sender<StreamControl>,
    thread: Option<JoinHandle<()>>,
    /// Current gain in dB, read by the device callback
    gain: Arc<RwLock<f32>>,
    /// Frames in the most recent write, for latency estimates
    last_chunk_frames: usize,
    abort: AbortHandle,
    aborted: AbortSignal,
}

impl CpalSink {
    /// Open a stream in `format` on the named (or default) device.
    pub fn open(device_name: Option<String>, format: StreamFormat) -> Result<Self, PlayerError> {
        if format.bits_per_sample != 16 || !format.signed || format.big_endian {
            return Err(PlayerError::device(format!("Unsupported PCM layout: {format}")));
        }

        let (chunk_tx, chunk_rx) = bounded::<Vec<i16>>(QUEUED_CHUNKS);
        let (control_tx, control_rx) = unbounded::<StreamControl>();
        let (ready_tx, ready_rx) = bounded::<Result<(), PlayerError>>(1);

        let gain = Arc::new(RwLock::new(0.0f32));
        let callback_gain = Arc::clone(&gain);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match build_for(device_name.as_deref(), format, chunk_rx, callback_gain) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for control in control_rx {
                    match control {
                        StreamControl::Start(reply) => {
                            let result = stream
                                .play()
                                .map_err(|e| PlayerError::device(e.to_string()));
                            let _ = reply.send(result);
                        }
                        StreamControl::Close => break,
                    }
                }
                drop(stream);
                tracing::debug!("Audio output stream closed");
            })
            .map_err(|e| PlayerError::device(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| PlayerError::device("audio output thread exited"))??;

        let (abort, aborted) = AbortHandle::new();
        Ok(Self {
            format,
            chunk_tx: Some(chunk_tx),
            control_tx,
            thread: Some(thread),
            gain,
            last_chunk_frames: 0,
            abort,
            aborted,
        })
    }
}

impl AudioSink for CpalSink {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn start(&mut self) -> Result<(), PlayerError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.control_tx
            .send(StreamControl::Start(reply_tx))
            .map_err(|_| PlayerError::device("audio output closed"))?;
        reply_rx
            .recv()
            .map_err(|_| PlayerError::device("audio output closed"))?
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let Some(tx) = self.chunk_tx.as_ref() else {
            return 0;
        };
        let frame_bytes = self.format.frame_bytes();
        let usable = bytes.len() - bytes.len() % frame_bytes;
        if usable == 0 {
            return 0;
        }

        self.last_chunk_frames = usable / frame_bytes;
        // A stalled device must not hold the writer forever
        let wait = (self.format.duration_of(usable) * (QUEUED_CHUNKS as u32 + 1))
            .max(MIN_WRITE_WAIT);
        let samples = pcm16_samples(&bytes[..usable]);

        select! {
            send(tx, samples) -> sent => match sent {
                Ok(()) => usable,
                // Callback side is gone: the stream was torn down
                Err(_) => 0,
            },
            recv(self.aborted.receiver()) -> _ => 0,
            default(wait) => {
                tracing::warn!("Audio device stopped draining, dropped {} bytes", usable);
                0
            }
        }
    }

    fn gain_range(&self) -> GainRange {
        GAIN_RANGE
    }

    fn set_gain(&mut self, gain: f32) {
        *self.gain.write() = gain.max(GAIN_RANGE.min).min(GAIN_RANGE.max);
    }

    fn gain(&self) -> f32 {
        *self.gain.read()
    }

    fn latency(&self) -> Duration {
        let queued = self.chunk_tx.as_ref().map(|tx| tx.len()).unwrap_or(0);
        let frames = (queued * self.last_chunk_frames) as f64;
        Duration::from_secs_f64(frames / self.format.sample_rate as f64)
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn close(&mut self) {
        self.abort.abort();
        self.chunk_tx = None;
        let _ = self.control_tx.send(StreamControl::Close);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("Audio output thread panicked");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pick a device, negotiate a config for `format` and build the stream.
fn build_for(
    device_name: Option<&str>,
    format: StreamFormat,
    chunk_rx: Receiver<Vec<i16>>,
    gain: Arc<RwLock<f32>>,
) -> Result<Stream, PlayerError> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    tracing::info!("Using audio device: {}", name);

    let sample_format = negotiate(&device, &format)?;
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    tracing::info!("Audio format: {} ({:?} on device)", format, sample_format);

    match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, chunk_rx, gain),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, chunk_rx, gain),
        other => Err(PlayerError::device(format!(
            "Unsupported sample format: {other:?}"
        ))),
    }
}

/// Find the requested device, falling back to the system default.
fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device, PlayerError> {
    if let Some(wanted) = device_name {
        let devices = host
            .output_devices()
            .map_err(|e| PlayerError::device(e.to_string()))?;
        for device in devices {
            if device.name().map(|n| n == wanted).unwrap_or(false) {
                return Ok(device);
            }
        }
        tracing::warn!("Audio device {:?} not found, using default", wanted);
    }

    host.default_output_device()
        .ok_or_else(|| PlayerError::device("No output device found"))
}

/// Check the device can take `format`, preferring native i16 over f32.
fn negotiate(device: &Device, format: &StreamFormat) -> Result<SampleFormat, PlayerError> {
    let rate = format.sample_rate;
    let matching: Vec<SampleFormat> = device
        .supported_output_configs()
        .map_err(|e| PlayerError::device(e.to_string()))?
        .filter(|c| c.channels() == format.channels)
        .filter(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0)
        .map(|c| c.sample_format())
        .collect();

    [SampleFormat::I16, SampleFormat::F32]
        .into_iter()
        .find(|f| matching.contains(f))
        .ok_or_else(|| PlayerError::device(format!("Line unavailable for {format}")))
}

/// Build an output stream pulling i16 chunks and applying the gain.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    chunk_rx: Receiver<Vec<i16>>,
    gain: Arc<RwLock<f32>>,
) -> Result<Stream, PlayerError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut current: Option<(Vec<i16>, usize)> = None;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let db = *gain.read();
                let amplitude = if db <= GAIN_RANGE.min {
                    0.0
                } else {
                    db_to_amplitude(db)
                };

                let mut out = 0;
                while out < data.len() {
                    if current.is_none() {
                        match chunk_rx.try_recv() {
                            Ok(chunk) => current = Some((chunk, 0)),
                            Err(_) => {
                                // Underrun (or paused): silence
                                for sample in &mut data[out..] {
                                    *sample = T::from_sample(0.0f32);
                                }
                                return;
                            }
                        }
                    }

                    let mut finished = false;
                    if let Some((chunk, pos)) = current.as_mut() {
                        let n = (chunk.len() - *pos).min(data.len() - out);
                        for (dst, &src) in data[out..out + n].iter_mut().zip(&chunk[*pos..*pos + n]) {
                            let value = (src as f32 / 32768.0 * amplitude).clamp(-1.0, 1.0);
                            *dst = T::from_sample(value);
                        }
                        *pos += n;
                        out += n;
                        finished = *pos >= chunk.len();
                    }
                    if finished {
                        current = None;
                    }
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| PlayerError::device(e.to_string()))
}

/// List available audio output devices.
pub fn list_audio_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Get the current/default audio device name.
pub fn current_audio_device() -> String {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}
