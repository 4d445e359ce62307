//! Audio data, device boundaries and the speech listener.

/// Voice-activity driven utterance capture
pub mod listener;

/// Microphone producer built on `cpal`
#[cfg(feature = "audio-io")]
pub mod capture;

/// Blocking speaker playback built on `cpal`
#[cfg(feature = "audio-io")]
pub mod playback;

pub use listener::SpeechListener;

use crate::{constants::PCM_FULL_SCALE, Error, Result};
use crossbeam_channel::Sender;
use std::time::Duration;

/// Mono 16-bit PCM with its sample rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    /// Samples in capture order
    pub samples: Vec<i16>,
    /// Samples per second
    pub sample_rate: u32,
}

impl PcmAudio {
    /// Wrap samples
    #[must_use]
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Playback length
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Decode little-endian 16-bit PCM bytes; a trailing odd byte is ignored
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self { samples, sample_rate }
    }

    /// Encode as a mono 16-bit WAV file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
            for &sample in &self.samples {
                writer.write_sample(sample).map_err(|e| Error::Audio(e.to_string()))?;
            }
            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Synthesized speech ready to play
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    /// Audio to play; empty when speech is only simulated
    pub pcm: PcmAudio,
    /// How long playback takes; drives the speech animation
    pub duration: Duration,
}

impl SpeechAudio {
    /// Speech backed by real samples
    #[must_use]
    pub fn from_pcm(pcm: PcmAudio) -> Self {
        let duration = pcm.duration();
        Self { pcm, duration }
    }

    /// Speech with a known length and no samples
    #[must_use]
    pub fn silent(duration: Duration, sample_rate: u32) -> Self {
        Self {
            pcm: PcmAudio::new(Vec::new(), sample_rate),
            duration,
        }
    }
}

/// Root-mean-square level of a chunk, full scale = 1.0
#[must_use]
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(f32::from(s) / PCM_FULL_SCALE);
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}

/// A running capture; dropping it stops the microphone
pub trait CaptureStream {}

/// Microphone that pushes fixed-size chunks into a channel
pub trait Microphone: Send + Sync {
    /// Start capturing `chunk_size`-sample chunks at `sample_rate` into `sink`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SensorUnavailable`] if the device cannot be opened
    fn start(&self, sample_rate: u32, chunk_size: usize, sink: Sender<Vec<i16>>) -> Result<Box<dyn CaptureStream>>;
}

/// Speaker output
pub trait AudioPlayer: Send + Sync {
    /// Play `audio`, blocking until it has finished
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the device fails
    fn play(&self, audio: &SpeechAudio) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_levels() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0; 64]), 0.0);
        let full = rms(&[i16::MAX; 16]);
        assert!((full - 1.0).abs() < 1e-6);
        let half = rms(&[16384, -16384, 16384, -16384]);
        assert!((half - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_pcm_duration_and_bytes() {
        let pcm = PcmAudio::from_le_bytes(&[0x01, 0x00, 0xff, 0xff, 0x7f], 2);
        assert_eq!(pcm.samples, vec![1, -1]);
        assert_eq!(pcm.duration(), Duration::from_secs(1));
        assert_eq!(PcmAudio::new(vec![0; 10], 0).duration(), Duration::ZERO);
    }

    #[test]
    fn test_wav_encoding() {
        let pcm = PcmAudio::new(vec![0, 1000, -1000, 0], 16_000);
        let wav = pcm.to_wav().unwrap();
        assert_eq!(&wav[..4], b"RIFF");

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, pcm.samples);
    }
}
