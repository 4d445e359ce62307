//! Blocking speaker playback with `cpal`

use super::{AudioPlayer, SpeechAudio};
use crate::{constants::PCM_FULL_SCALE, Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Plays speech on an output device
#[derive(Debug, Clone, Default)]
pub struct CpalPlayer {
    device_name: Option<String>,
}

impl CpalPlayer {
    /// Use the named output device, or the system default when `None`
    #[must_use]
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Audio("no output device available".to_string())),
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == *name))
                .ok_or_else(|| Error::Audio(format!("output device '{name}' not found"))),
        }
    }
}

impl AudioPlayer for CpalPlayer {
    fn play(&self, audio: &SpeechAudio) -> Result<()> {
        let pcm = &audio.pcm;
        if pcm.samples.is_empty() {
            return Ok(());
        }

        let device = self.device()?;
        let rate = SampleRate(pcm.sample_rate);
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .min_by_key(|c| c.channels())
            .ok_or_else(|| Error::Audio(format!("no f32 output config at {} Hz", pcm.sample_rate)))?;
        let config = supported.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let samples: Arc<Vec<f32>> = Arc::new(pcm.samples.iter().map(|&s| f32::from(s) / PCM_FULL_SCALE).collect());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| error!("Audio playback error: {err}"),
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Bounded wait: the expected length plus a margin
        let deadline = Instant::now() + pcm.duration() + Duration::from_secs(2);
        while !finished.load(Ordering::Relaxed) {
            if Instant::now() >= deadline {
                warn!("Playback did not finish in time, stopping");
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        debug!("Played {:.2}s of audio", pcm.duration().as_secs_f64());
        Ok(())
    }
}
