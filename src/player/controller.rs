//! The playback controller.
//!
//! One [`Session`] (decoder, open sink, transport state) sits behind a single
//! lock. Control calls and the background worker both go through that lock,
//! so the worker never sees a half-loaded track.
//!
//! The worker is started by the first `play` and lives until `close`. Each
//! iteration it pulls one buffer of PCM from the decoder, writes it to the
//! sink (blocking), then waits for the tick or a wake-up, whichever comes
//! first.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::PlayerError;
use super::decoder::SongDecoder;
use super::sink::{AbortHandle, AudioSink, OutputDevice, StreamFormat};
use super::state::{ControllerStatus, LoopMode, Pacing, TransportState};
use super::volume::clamp_percent;
use crate::library::Library;

/// Smallest buffer the worker will pull; keeps a few frames per iteration.
const MIN_BUFFER_BYTES: usize = 1024;

/// Tunables for a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    /// Bytes of PCM pulled per worker iteration
    pub buffer_bytes: usize,
    /// Wait between iterations
    pub tick: Duration,
    pub pacing: Pacing,
    pub loop_mode: LoopMode,
    /// Initial normalized volume
    pub volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            buffer_bytes: 8192,
            tick: Duration::from_millis(10),
            pacing: Pacing::Fixed,
            loop_mode: LoopMode::Forever,
            volume: 0.9,
        }
    }
}

/// Everything the worker and the control calls share.
struct Session {
    decoder: Box<dyn SongDecoder>,
    sink: Option<Box<dyn AudioSink>>,
    state: TransportState,
    volume: f32,
    now_playing: Option<String>,
    track_bytes: usize,
    channels: u16,
    duration: Option<Duration>,
}

impl Session {
    fn ensure_open(&self) -> Result<(), PlayerError> {
        if self.state == TransportState::Closed {
            Err(PlayerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Close the current stream (if any) and open a fresh one.
    fn open_stream(&mut self, output: &dyn OutputDevice, channels: u16) -> Result<(), PlayerError> {
        self.close_stream();

        let mut sink = output.open(StreamFormat::pcm16(channels))?;
        apply_volume(sink.as_mut(), self.volume);
        if let Err(e) = sink.start() {
            sink.close();
            return Err(e);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn close_stream(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }

    /// Forget the current track after a failed load.
    fn unload(&mut self) {
        self.close_stream();
        self.state = TransportState::Idle;
        self.now_playing = None;
        self.track_bytes = 0;
        self.channels = 0;
        self.duration = None;
    }

    fn seek(&mut self, position_ms: u64) {
        if let Err(e) = self.decoder.seek(position_ms) {
            warn!("Seek to {}ms failed: {}", position_ms, e);
        }
    }

    /// One worker iteration. Returns the sink latency when something was written.
    fn pump(&mut self, buffer: &mut [u8]) -> Option<Duration> {
        if !self.state.is_playing() {
            return None;
        }
        let sink = self.sink.as_mut()?;

        let n = self.decoder.generate(buffer);
        if n == 0 {
            info!(
                "Playback finished: {}",
                self.now_playing.as_deref().unwrap_or("?")
            );
            self.state = TransportState::Idle;
            self.seek(0);
            return None;
        }

        let written = sink.write(&buffer[..n]);
        if written < n {
            debug!("Sink accepted {} of {} bytes", written, n);
        }
        Some(sink.latency())
    }
}

fn apply_volume(sink: &mut dyn AudioSink, percent: f32) {
    let gain = sink.gain_range().gain_for(percent);
    sink.set_gain(gain);
    debug!("Volume {:.2} -> gain {:.2}", percent, sink.gain());
}

struct Shared {
    session: Mutex<Session>,
    running: AtomicBool,
    /// Abort handle of the open sink, reachable without the session lock
    abort: Mutex<Option<AbortHandle>>,
}

/// Handle on the background worker thread.
struct Worker {
    wake_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(shared: Arc<Shared>, settings: &PlaybackSettings) -> Result<Self, PlayerError> {
        let (wake_tx, wake_rx) = bounded(1);
        let buffer = vec![0u8; settings.buffer_bytes.max(MIN_BUFFER_BYTES)];
        let tick = settings.tick;
        let pacing = settings.pacing;

        let handle = thread::Builder::new()
            .name("radio-worker".to_string())
            .spawn(move || run_worker(shared, wake_rx, buffer, tick, pacing))
            .map_err(|e| PlayerError::device(format!("Cannot start playback worker: {e}")))?;

        Ok(Self { wake_tx, handle })
    }

    fn wake(&self) {
        // A wake-up already pending is as good as a new one
        let _ = self.wake_tx.try_send(());
    }
}

/// Main loop of the worker thread.
fn run_worker(
    shared: Arc<Shared>,
    wake_rx: Receiver<()>,
    mut buffer: Vec<u8>,
    tick: Duration,
    pacing: Pacing,
) {
    debug!("Playback worker started");

    while shared.running.load(Ordering::Acquire) {
        let latency = shared.session.lock().pump(&mut buffer);

        let wait = match (pacing, latency) {
            (Pacing::DeviceLatency, Some(latency)) => latency.max(tick),
            _ => tick,
        };

        match wake_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Playback worker stopped");
}

/// Transport control over one decoder and one output device.
///
/// All methods take `&self`; share the controller behind an `Arc` to drive
/// it from several threads.
pub struct PlaybackController {
    shared: Arc<Shared>,
    output: Box<dyn OutputDevice>,
    settings: PlaybackSettings,
    library: Mutex<Option<Library>>,
    worker: Mutex<Option<Worker>>,
}

impl PlaybackController {
    pub fn new(
        decoder: Box<dyn SongDecoder>,
        output: Box<dyn OutputDevice>,
        settings: PlaybackSettings,
    ) -> Self {
        let session = Session {
            decoder,
            sink: None,
            state: TransportState::Idle,
            volume: clamp_percent(settings.volume),
            now_playing: None,
            track_bytes: 0,
            channels: 0,
            duration: None,
        };

        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                running: AtomicBool::new(true),
                abort: Mutex::new(None),
            }),
            output,
            settings,
            library: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// List `dir` as the track list used by [`play_index`](Self::play_index).
    ///
    /// Returns the number of tracks found.
    pub fn load_directory(&self, dir: &Path) -> Result<usize, PlayerError> {
        let library = Library::load_directory(dir)?;
        let count = library.len();
        *self.library.lock() = Some(library);
        Ok(count)
    }

    /// Use an already built track list.
    pub fn set_library(&self, library: Library) {
        *self.library.lock() = Some(library);
    }

    /// Number of tracks in the loaded list.
    pub fn track_count(&self) -> usize {
        self.library.lock().as_ref().map(Library::len).unwrap_or(0)
    }

    /// Load a track and start playing it from the top.
    ///
    /// The name's extension tells the decoder what format to expect.
    pub fn play(&self, name: &str, bytes: Vec<u8>) -> Result<(), PlayerError> {
        let mut session = self.shared.session.lock();
        session.ensure_open()?;

        let track_bytes = bytes.len();
        session.decoder.load(name, bytes)?;

        if let Err(e) = self.start_loaded(&mut session, name, track_bytes) {
            session.unload();
            return Err(e);
        }

        info!("Playing song: {}", name);
        Ok(())
    }

    /// Second half of `play`, once the decoder has accepted the payload.
    fn start_loaded(
        &self,
        session: &mut Session,
        name: &str,
        track_bytes: usize,
    ) -> Result<(), PlayerError> {
        let info = session
            .decoder
            .info()
            .cloned()
            .ok_or_else(|| PlayerError::decode(format!("{name}: decoder reported no songs")))?;

        let song = info.song(0);
        let span = self.settings.loop_mode.span_for(song);
        session.decoder.play_song(0, span)?;

        session.open_stream(self.output.as_ref(), info.channels)?;
        *self.shared.abort.lock() = session.sink.as_ref().map(|s| s.abort_handle());
        self.ensure_worker()?;

        session.state = TransportState::Playing;
        session.now_playing = Some(name.to_string());
        session.track_bytes = track_bytes;
        session.channels = info.channels;
        session.duration = song.and_then(|s| s.duration);
        Ok(())
    }

    /// Start the worker on first use, otherwise nudge it.
    fn ensure_worker(&self) -> Result<(), PlayerError> {
        let mut worker = self.worker.lock();
        match worker.as_ref() {
            Some(w) => w.wake(),
            None => *worker = Some(Worker::spawn(Arc::clone(&self.shared), &self.settings)?),
        }
        Ok(())
    }

    /// Read entry `index` of the track list and play it.
    ///
    /// The index is clamped into the list, so `-1` plays the first track and
    /// anything past the end plays the last one.
    pub fn play_index(&self, index: isize) -> Result<(), PlayerError> {
        let track = {
            let library = self.library.lock();
            let library = library
                .as_ref()
                .ok_or_else(|| PlayerError::no_tracks("", "no directory loaded"))?;
            library
                .get_clamped(index)
                .cloned()
                .ok_or_else(|| PlayerError::no_tracks(library.root(), "directory has no tracks"))?
        };

        let bytes = track.read()?;
        self.play(&track.name, bytes)
    }

    /// Stop writing to the device, keeping the position.
    pub fn pause(&self) -> Result<(), PlayerError> {
        let mut session = self.shared.session.lock();
        session.ensure_open()?;
        if session.state == TransportState::Playing {
            session.state = TransportState::Paused;
            debug!("Paused");
        }
        Ok(())
    }

    /// Resume from the current position. Does not reload the track.
    pub fn start(&self) -> Result<(), PlayerError> {
        let mut session = self.shared.session.lock();
        session.ensure_open()?;
        if session.sink.is_none() {
            debug!("Start ignored, nothing loaded");
            return Ok(());
        }
        session.state = TransportState::Playing;
        debug!("Started");
        Ok(())
    }

    /// Stop playback and rewind to the beginning.
    pub fn stop(&self) -> Result<(), PlayerError> {
        let mut session = self.shared.session.lock();
        session.ensure_open()?;
        session.state = TransportState::Idle;
        if session.sink.is_some() {
            session.seek(0);
        }
        debug!("Stopped");
        Ok(())
    }

    /// Move the cursor. Negative positions clamp to 0.
    ///
    /// A decoder that fails to seek is logged and left where it was; this
    /// only errors when the controller is closed.
    pub fn seek(&self, position_ms: i64) -> Result<(), PlayerError> {
        let mut session = self.shared.session.lock();
        session.ensure_open()?;
        session.seek(position_ms.max(0) as u64);
        Ok(())
    }

    /// Set the normalized volume, clamped to `[0, 1]`.
    ///
    /// Applied to the open stream now and to every stream opened later.
    pub fn set_volume(&self, percent: f32) -> Result<(), PlayerError> {
        let mut session = self.shared.session.lock();
        session.ensure_open()?;
        let percent = clamp_percent(percent);
        session.volume = percent;
        if let Some(sink) = session.sink.as_mut() {
            apply_volume(sink.as_mut(), percent);
        }
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.shared.session.lock().volume
    }

    /// Decoder cursor in milliseconds.
    pub fn position_ms(&self) -> u64 {
        self.shared.session.lock().decoder.position_ms()
    }

    pub fn state(&self) -> TransportState {
        self.shared.session.lock().state
    }

    /// Current status snapshot.
    pub fn status(&self) -> ControllerStatus {
        let session = self.shared.session.lock();
        ControllerStatus {
            state: session.state,
            now_playing: session.now_playing.clone(),
            track_bytes: session.track_bytes,
            channels: session.channels,
            volume: session.volume,
            position: Duration::from_millis(session.decoder.position_ms()),
            duration: session.duration,
        }
    }

    /// Shut down: close the stream and stop the worker.
    ///
    /// Once this returns no more PCM reaches the device. Calling it again is
    /// a no-op; every other call returns [`PlayerError::Closed`] afterwards.
    pub fn close(&self) {
        self.shared.running.store(false, Ordering::Release);
        // The worker may be blocked in a write while holding the session lock
        if let Some(abort) = self.shared.abort.lock().take() {
            abort.abort();
        }

        {
            let mut session = self.shared.session.lock();
            if session.state == TransportState::Closed {
                return;
            }
            session.state = TransportState::Closed;
            session.close_stream();
        }

        // Dropping the sender disconnects the wake channel and ends the wait
        if let Some(Worker { wake_tx, handle }) = self.worker.lock().take() {
            drop(wake_tx);
            if handle.join().is_err() {
                warn!("Playback worker panicked");
            }
        }
        info!("Player closed");
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.close();
    }
}
