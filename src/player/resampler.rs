//! Sample rate conversion using rubato.
//!
//! Decoded songs come in at whatever rate the file was mastered at; the
//! output stream always runs at 44.1kHz, so everything else goes through here.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use super::PlayerError;

/// Input frames fed to rubato per call.
const CHUNK_FRAMES: usize = 1024;

/// Audio resampler wrapper.
pub struct Resampler {
    resampler: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Per-channel input waiting for a full chunk
    input_buffer: Vec<Vec<f32>>,
}

impl Resampler {
    /// Create a new resampler.
    ///
    /// If input and output rates match, samples pass straight through.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self, PlayerError> {
        let channels = channels.max(1) as usize;

        let resampler = if input_rate == output_rate {
            None
        } else {
            let inner = FftFixedIn::<f32>::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                2,
                channels,
            )
            .map_err(|e| PlayerError::decode(format!("Cannot resample {input_rate}Hz: {e}")))?;

            tracing::info!(
                "Resampler: {}Hz → {}Hz ({} channels)",
                input_rate,
                output_rate,
                channels
            );
            Some(inner)
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
        })
    }

    /// Process interleaved samples, returning resampled interleaved output.
    ///
    /// Output may be empty while a chunk is still being accumulated.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.input_buffer[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();

        while self.input_buffer[0].len() >= CHUNK_FRAMES {
            let chunks: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();

            match resampler.process(&chunks, None) {
                Ok(resampled) => interleave_into(&resampled, usize::MAX, &mut output),
                Err(e) => tracing::warn!("Resampling error: {}", e),
            }
        }

        output
    }

    /// Flush whatever is still buffered. Call at end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };

        let remaining = self.input_buffer[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        for ch in &mut self.input_buffer {
            ch.resize(CHUNK_FRAMES, 0.0);
        }
        let chunks = std::mem::replace(&mut self.input_buffer, vec![Vec::new(); self.channels]);

        let mut output = Vec::new();
        // Only keep the part that corresponds to real input, not the padding
        let expected_frames = (remaining as f64 * self.output_rate as f64
            / self.input_rate as f64)
            .ceil() as usize;
        match resampler.process(&chunks, None) {
            Ok(resampled) => interleave_into(&resampled, expected_frames, &mut output),
            Err(e) => tracing::warn!("Resampling flush error: {}", e),
        }

        output
    }

    /// Drop buffered input and filter state (call after seek).
    pub fn reset(&mut self) {
        for ch in &mut self.input_buffer {
            ch.clear();
        }
        if let Some(ref mut resampler) = self.resampler {
            resampler.reset();
        }
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            output.push(plane[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_when_no_resampling() {
        let mut resampler = Resampler::new(44100, 44100, 2).unwrap();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.process(&input), input);
        assert!(resampler.flush().is_empty());
    }

    #[test]
    fn test_upsampling_produces_more_frames() {
        let mut resampler = Resampler::new(22050, 44100, 1).unwrap();
        let input = vec![0.0f32; CHUNK_FRAMES * 4];
        let mut produced = resampler.process(&input).len();
        produced += resampler.flush().len();
        assert!(produced > input.len(), "only {} samples out", produced);
    }

    #[test]
    fn test_downsampling_produces_fewer_frames() {
        let mut resampler = Resampler::new(48_000, 44_100, 2).unwrap();
        let input = vec![0.0f32; CHUNK_FRAMES * 2 * 4];
        let mut produced = resampler.process(&input).len();
        produced += resampler.flush().len();
        assert!(produced < input.len(), "{} samples out", produced);
        assert_eq!(produced % 2, 0);
    }
}
