//! Decoder adapter: turns a named byte payload into a stream of S16LE frames.
//!
//! [`SongDecoder`] is the seam the controller talks to. [`SymphoniaDecoder`]
//! is the stock implementation; it probes the payload using the name's
//! extension as a hint, treats every audio track in the container as a song,
//! and converts the output to 44.1kHz through [`Resampler`].

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::PlayerError;
use super::resampler::Resampler;
use super::sink::SAMPLE_RATE;

/// How long a selected song plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaySpan {
    /// Loop until told otherwise
    Forever,
    /// Play through once and end
    Once,
    /// Play for a fixed time and end
    For(Duration),
}

/// Per-song metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SongMeta {
    /// Length of one pass, if known
    pub duration: Option<Duration>,
    /// Whether the song is meant to repeat
    pub looping: bool,
}

/// Metadata of a loaded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SongInfo {
    /// Output channel count
    pub channels: u16,
    pub songs: Vec<SongMeta>,
}

impl SongInfo {
    pub fn song(&self, index: usize) -> Option<&SongMeta> {
        self.songs.get(index)
    }
}

/// A stateful decoder session.
pub trait SongDecoder: Send {
    /// Parse `bytes`, using the extension of `name` as the format hint.
    ///
    /// On failure the previously loaded payload (if any) is kept.
    fn load(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), PlayerError>;

    /// Metadata of the loaded payload.
    fn info(&self) -> Option<&SongInfo>;

    /// Select a song and rewind to its start.
    fn play_song(&mut self, song: usize, span: PlaySpan) -> Result<(), PlayerError>;

    /// Fill `buffer` with interleaved S16LE frames.
    ///
    /// Returns the number of bytes written, always a whole number of frames.
    /// Zero means the song has ended (or nothing is selected).
    fn generate(&mut self, buffer: &mut [u8]) -> usize;

    /// Move the cursor of the selected song.
    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError>;

    /// Cursor of the selected song in milliseconds.
    fn position_ms(&self) -> u64;
}

/// Reject payloads that cannot possibly be decoded.
pub fn validate_payload(name: &str, bytes: &[u8]) -> Result<(), PlayerError> {
    if bytes.is_empty() {
        return Err(PlayerError::decode(format!("{name}: empty payload")));
    }
    if Path::new(name).extension().is_none() {
        return Err(PlayerError::decode(format!(
            "{name}: no extension to identify the format"
        )));
    }
    Ok(())
}

/// Symphonia-backed decoder.
#[derive(Default)]
pub struct SymphoniaDecoder {
    loaded: Option<Loaded>,
}

/// A probed container.
struct Loaded {
    reader: Box<dyn FormatReader>,
    info: SongInfo,
    /// Symphonia track id per song
    track_ids: Vec<u32>,
    active: Option<ActiveSong>,
}

/// Decode state of the selected song.
struct ActiveSong {
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    channels: u16,
    resampler: Resampler,
    span: PlaySpan,
    /// Converted S16LE bytes not yet handed out
    pending: VecDeque<u8>,
    /// Output frames handed out since the start of the current pass
    frames_out: u64,
    /// Frames still queued in `pending` before each loop restart, oldest first
    wraps: VecDeque<u64>,
    /// Packets decoded since the last rewind
    packets: usize,
    /// No more data will come for this span
    drained: bool,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SongDecoder for SymphoniaDecoder {
    fn load(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), PlayerError> {
        validate_payload(name, &bytes)?;

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(name).extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| PlayerError::decode(format!("{name}: {e}")))?;

        let reader = probed.format;

        let mut songs = Vec::new();
        let mut track_ids = Vec::new();
        let mut channels = None;
        for track in reader
            .tracks()
            .iter()
            .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        {
            let params = &track.codec_params;
            let duration = match (params.n_frames, params.time_base, params.sample_rate) {
                (Some(n), Some(tb), _) => Some(time_to_duration(tb.calc_time(n))),
                (Some(n), None, Some(rate)) if rate > 0 => {
                    Some(Duration::from_secs_f64(n as f64 / rate as f64))
                }
                _ => None,
            };
            channels.get_or_insert(params.channels.map(|c| c.count() as u16).unwrap_or(2));
            songs.push(SongMeta {
                duration,
                looping: false,
            });
            track_ids.push(track.id);
        }

        let Some(channels) = channels else {
            return Err(PlayerError::decode(format!("{name}: no audio track found")));
        };

        tracing::debug!("Loaded {}: {} song(s), {} channel(s)", name, songs.len(), channels);

        self.loaded = Some(Loaded {
            reader,
            info: SongInfo {
                channels,
                songs,
            },
            track_ids,
            active: None,
        });
        Ok(())
    }

    fn info(&self) -> Option<&SongInfo> {
        self.loaded.as_ref().map(|l| &l.info)
    }

    fn play_song(&mut self, song: usize, span: PlaySpan) -> Result<(), PlayerError> {
        let loaded = self
            .loaded
            .as_mut()
            .ok_or_else(|| PlayerError::decode("no payload loaded"))?;

        let track_id = *loaded
            .track_ids
            .get(song)
            .ok_or_else(|| PlayerError::decode(format!("song {song} out of range")))?;

        let track = loaded
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == track_id)
            .ok_or_else(|| PlayerError::decode(format!("track {track_id} vanished")))?;
        let params = track.codec_params.clone();

        let source_rate = params
            .sample_rate
            .ok_or_else(|| PlayerError::decode("Unknown sample rate"))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(loaded.info.channels);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| PlayerError::decode(e.to_string()))?;

        let needs_rewind = loaded.active.is_some();
        loaded.active = Some(ActiveSong {
            decoder,
            track_id,
            time_base: params.time_base,
            channels,
            resampler: Resampler::new(source_rate, SAMPLE_RATE, channels)?,
            span,
            pending: VecDeque::new(),
            frames_out: 0,
            wraps: VecDeque::new(),
            packets: 0,
            drained: false,
        });

        if needs_rewind && let Some(active) = loaded.active.as_mut() {
            active.rewind(&mut *loaded.reader)?;
        }
        Ok(())
    }

    fn generate(&mut self, buffer: &mut [u8]) -> usize {
        let Some(Loaded {
            reader,
            active: Some(song),
            ..
        }) = self.loaded.as_mut()
        else {
            return 0;
        };

        let frame_bytes = song.frame_bytes();
        let mut wanted = buffer.len() - buffer.len() % frame_bytes;
        if let PlaySpan::For(limit) = song.span {
            let limit_frames = (limit.as_secs_f64() * SAMPLE_RATE as f64) as u64;
            let left = limit_frames.saturating_sub(song.frames_out) as usize;
            wanted = wanted.min(left.saturating_mul(frame_bytes));
        }

        while song.pending.len() < wanted && !song.drained {
            if let Err(e) = song.refill(&mut **reader) {
                tracing::warn!("Decoding stopped: {}", e);
                song.drained = true;
            }
        }

        let n = wanted.min(song.pending.len());
        for (dst, src) in buffer[..n].iter_mut().zip(song.pending.drain(..n)) {
            *dst = src;
        }
        song.advance((n / frame_bytes) as u64);
        n
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError> {
        let Some(Loaded {
            reader,
            active: Some(song),
            ..
        }) = self.loaded.as_mut()
        else {
            return Err(PlayerError::decode("no song selected"));
        };

        let seeked = reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(position_ms as f64 / 1000.0),
                    track_id: Some(song.track_id),
                },
            )
            .map_err(|e| PlayerError::decode(format!("Seek failed: {e}")))?;

        let landed = match song.time_base {
            Some(tb) => time_to_duration(tb.calc_time(seeked.actual_ts)),
            None => Duration::from_millis(position_ms),
        };
        song.reset_to(landed);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.loaded
            .as_ref()
            .and_then(|l| l.active.as_ref())
            .map(|s| s.frames_out * 1000 / SAMPLE_RATE as u64)
            .unwrap_or(0)
    }
}

impl ActiveSong {
    fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }

    /// Decode one packet into `pending`, handling end of stream per span.
    fn refill(&mut self, reader: &mut dyn FormatReader) -> Result<(), PlayerError> {
        loop {
            let packet = match reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return self.end_of_stream(reader);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(PlayerError::decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("Skipping bad frame: {}", e);
                    continue;
                }
                Err(e) => return Err(PlayerError::decode(e.to_string())),
            };
            self.packets += 1;

            let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            samples.copy_interleaved_ref(decoded);
            let converted = self.resampler.process(samples.samples());
            self.push_pcm(&converted);
            return Ok(());
        }
    }

    fn end_of_stream(&mut self, reader: &mut dyn FormatReader) -> Result<(), PlayerError> {
        match self.span {
            PlaySpan::Forever if self.packets > 0 => {
                self.rewind(reader)?;
                // The tail of this pass is still queued; restart the count once it is out
                let queued = (self.pending.len() / self.frame_bytes()) as u64;
                let earlier: u64 = self.wraps.iter().sum();
                self.wraps.push_back(queued - earlier);
            }
            _ => {
                let tail = self.resampler.flush();
                self.push_pcm(&tail);
                self.drained = true;
            }
        }
        Ok(())
    }

    /// Seek the container back to the start of this song.
    fn rewind(&mut self, reader: &mut dyn FormatReader) -> Result<(), PlayerError> {
        reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| PlayerError::decode(format!("Rewind failed: {e}")))?;
        self.decoder.reset();
        self.packets = 0;
        Ok(())
    }

    /// Count `frames` as handed out, restarting at each queued loop point.
    fn advance(&mut self, mut frames: u64) {
        while let Some(&left) = self.wraps.front() {
            if frames < left {
                self.wraps[0] = left - frames;
                break;
            }
            frames -= left;
            self.wraps.pop_front();
            self.frames_out = 0;
        }
        self.frames_out += frames;
    }

    fn reset_to(&mut self, position: Duration) {
        self.decoder.reset();
        self.resampler.reset();
        self.pending.clear();
        self.wraps.clear();
        self.packets = 0;
        self.drained = false;
        self.frames_out = (position.as_secs_f64() * SAMPLE_RATE as f64) as u64;
    }

    fn push_pcm(&mut self, samples: &[f32]) {
        let whole = samples.len() - samples.len() % self.channels.max(1) as usize;
        for &s in &samples[..whole] {
            let value = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            self.pending.extend(value.to_le_bytes());
        }
    }
}

fn time_to_duration(time: Time) -> Duration {
    Duration::from_secs_f64(time.seconds as f64 + time.frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wav_bytes;

    #[test]
    fn test_empty_payload_is_decode_error() {
        let mut decoder = SymphoniaDecoder::new();
        let err = decoder.load("song.wav", Vec::new()).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn test_missing_extension_is_decode_error() {
        let mut decoder = SymphoniaDecoder::new();
        let err = decoder.load("song", wav_bytes(44_100, 1, 100)).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let mut decoder = SymphoniaDecoder::new();
        let result = decoder.load("noise.wav", vec![0x42; 512]);
        assert!(matches!(result, Err(PlayerError::Decode(_))));
        assert!(decoder.info().is_none());
    }

    #[test]
    fn test_wav_info() {
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("tone.wav", wav_bytes(44_100, 2, 44_100)).unwrap();

        let info = decoder.info().unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.songs.len(), 1);
        let duration = info.songs[0].duration.unwrap();
        assert!((duration.as_secs_f64() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_generate_whole_frames() {
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("tone.wav", wav_bytes(44_100, 2, 44_100)).unwrap();
        decoder.play_song(0, PlaySpan::Forever).unwrap();

        let mut buffer = vec![0u8; 8190];
        let n = decoder.generate(&mut buffer);
        assert_eq!(n, 8188);
        assert_eq!(n % 4, 0);
        assert!(decoder.position_ms() > 0);
    }

    #[test]
    fn test_generate_without_song_is_empty() {
        let mut decoder = SymphoniaDecoder::new();
        let mut buffer = vec![0u8; 1024];
        assert_eq!(decoder.generate(&mut buffer), 0);
    }

    #[test]
    fn test_once_ends_and_forever_loops() {
        // 0.1s of mono audio is 8820 bytes of output
        let bytes = wav_bytes(44_100, 1, 4_410);
        let mut buffer = vec![0u8; 4096];

        let mut once = SymphoniaDecoder::new();
        once.load("short.wav", bytes.clone()).unwrap();
        once.play_song(0, PlaySpan::Once).unwrap();
        let mut total = 0;
        loop {
            let n = once.generate(&mut buffer);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 8_820);

        let mut forever = SymphoniaDecoder::new();
        forever.load("short.wav", bytes).unwrap();
        forever.play_song(0, PlaySpan::Forever).unwrap();
        for _ in 0..10 {
            assert_eq!(forever.generate(&mut buffer), 4096);
        }
    }

    #[test]
    fn test_position_runs_through_pass_before_wrapping() {
        // 0.1s of mono audio, 4410 frames per pass, 2048 frames per read
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("short.wav", wav_bytes(44_100, 1, 4_410)).unwrap();
        decoder.play_song(0, PlaySpan::Forever).unwrap();

        let mut buffer = vec![0u8; 4096];
        for read in 1..=8u64 {
            assert_eq!(decoder.generate(&mut buffer), 4096);
            let expected = (read * 2048 % 4_410) * 1000 / 44_100;
            assert_eq!(decoder.position_ms(), expected, "after read {read}");
        }
    }

    #[test]
    fn test_span_limits_output() {
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("tone.wav", wav_bytes(44_100, 1, 44_100)).unwrap();
        decoder
            .play_song(0, PlaySpan::For(Duration::from_millis(500)))
            .unwrap();

        let mut buffer = vec![0u8; 16_384];
        let mut total = 0;
        loop {
            let n = decoder.generate(&mut buffer);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 22_050 * 2);
    }

    #[test]
    fn test_seek_moves_cursor() {
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("tone.wav", wav_bytes(44_100, 1, 44_100)).unwrap();
        decoder.play_song(0, PlaySpan::Forever).unwrap();

        decoder.seek(500).unwrap();
        let pos = decoder.position_ms();
        assert!((490..=510).contains(&pos), "landed at {pos}ms");

        decoder.seek(0).unwrap();
        assert_eq!(decoder.position_ms(), 0);
    }

    #[test]
    fn test_resampled_song_still_fills_buffers() {
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("low.wav", wav_bytes(22_050, 1, 22_050)).unwrap();
        decoder.play_song(0, PlaySpan::Forever).unwrap();

        let mut buffer = vec![0u8; 8192];
        assert_eq!(decoder.generate(&mut buffer), 8192);
    }

    #[test]
    fn test_bad_song_index() {
        let mut decoder = SymphoniaDecoder::new();
        decoder.load("tone.wav", wav_bytes(44_100, 1, 1_000)).unwrap();
        assert!(matches!(
            decoder.play_song(3, PlaySpan::Once),
            Err(PlayerError::Decode(_))
        ));
    }
}
