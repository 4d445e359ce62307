use super::{rms, Microphone, PcmAudio};
use crate::{config::ListenerConfig, Error, Result};
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records one utterance from the microphone.
///
/// The microphone produces chunks into a bounded channel and the listener is
/// the only consumer. Listening ends when the configured trailing silence
/// follows voice, when the microphone goes quiet after voice, or at the hard
/// timeout. Without any voice the result is `None`.
pub struct SpeechListener {
    microphone: Arc<dyn Microphone>,
    config: ListenerConfig,
}

impl SpeechListener {
    #[must_use]
    pub fn new(microphone: Arc<dyn Microphone>, config: ListenerConfig) -> Self {
        Self { microphone, config }
    }

    /// Capture sample rate
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Listen for one utterance
    ///
    /// # Errors
    ///
    /// Returns [`Error::SensorUnavailable`] if the microphone cannot be opened
    pub fn listen(&self) -> Result<Option<PcmAudio>> {
        let c = &self.config;
        let (sink, chunks) = crossbeam_channel::bounded(c.channel_capacity);
        let _stream = self
            .microphone
            .start(c.sample_rate, c.chunk_size, sink)
            .map_err(|e| match e {
                Error::SensorUnavailable(_) => e,
                other => Error::SensorUnavailable(other.to_string()),
            })?;

        let timeout = Duration::from_secs_f64(c.timeout_secs);
        let poll = Duration::from_secs_f64(c.poll_secs);
        let chunk_secs = c.chunk_size as f64 / f64::from(c.sample_rate);
        info!("Listening (timeout {:.0}s)", c.timeout_secs);

        let start = Instant::now();
        let mut samples = Vec::new();
        let mut has_voice = false;
        let mut silent_chunks = 0_usize;
        let mut max_level: f64 = 0.0;

        loop {
            if start.elapsed() >= timeout {
                warn!("Listening timed out (max level {max_level:.5})");
                break;
            }

            let chunk = match chunks.recv_timeout(poll) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) if has_voice => break,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Microphone stream ended");
                    break;
                }
            };

            let level = rms(&chunk);
            max_level = max_level.max(level);
            samples.extend_from_slice(&chunk);

            if level > c.voice_threshold {
                has_voice = true;
                silent_chunks = 0;
            } else if has_voice {
                silent_chunks += 1;
            }

            if has_voice && silent_chunks as f64 * chunk_secs > c.trailing_silence_secs {
                debug!("Trailing silence reached");
                break;
            }
        }

        if !has_voice {
            info!("No speech heard (max level {max_level:.5})");
            return Ok(None);
        }

        info!(
            "Captured {:.1}s of speech (max level {max_level:.5})",
            samples.len() as f64 / f64::from(c.sample_rate)
        );
        Ok(Some(PcmAudio::new(samples, c.sample_rate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CaptureStream;
    use crossbeam_channel::Sender;

    /// Sends the given chunks immediately, then keeps the channel open
    struct BurstMicrophone {
        chunks: Vec<Vec<i16>>,
        hold_open: bool,
    }

    struct Held(#[allow(dead_code)] Option<Sender<Vec<i16>>>);
    impl CaptureStream for Held {}

    impl Microphone for BurstMicrophone {
        fn start(&self, _rate: u32, _chunk: usize, sink: Sender<Vec<i16>>) -> Result<Box<dyn CaptureStream>> {
            for chunk in &self.chunks {
                let _ = sink.try_send(chunk.clone());
            }
            Ok(Box::new(Held(self.hold_open.then_some(sink))))
        }
    }

    struct BrokenMicrophone;
    impl Microphone for BrokenMicrophone {
        fn start(&self, _rate: u32, _chunk: usize, _sink: Sender<Vec<i16>>) -> Result<Box<dyn CaptureStream>> {
            Err(Error::Audio("no input device available".into()))
        }
    }

    fn config() -> ListenerConfig {
        ListenerConfig {
            chunk_size: 4,
            sample_rate: 16,
            trailing_silence_secs: 0.5,
            timeout_secs: 1.0,
            poll_secs: 0.05,
            ..ListenerConfig::default()
        }
    }

    #[test]
    fn test_trailing_silence_ends_utterance() {
        let voice = vec![8000_i16; 4];
        let quiet = vec![0_i16; 4];
        let mic = BurstMicrophone {
            chunks: vec![quiet.clone(), voice.clone(), voice, quiet.clone(), quiet.clone(), quiet.clone(), quiet],
            hold_open: true,
        };
        let listener = SpeechListener::new(Arc::new(mic), config());
        let audio = listener.listen().unwrap().unwrap();
        // Each quiet chunk is 0.25s: the third one after voice exceeds 0.5s
        assert_eq!(audio.samples.len(), 6 * 4);
        assert_eq!(audio.sample_rate, 16);
    }

    #[test]
    fn test_poll_timeout_after_voice_ends_utterance() {
        let mic = BurstMicrophone {
            chunks: vec![vec![8000_i16; 4]],
            hold_open: true,
        };
        let listener = SpeechListener::new(Arc::new(mic), config());
        let start = Instant::now();
        assert!(listener.listen().unwrap().is_some());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_no_voice_is_none_after_timeout() {
        let mic = BurstMicrophone {
            chunks: vec![vec![0_i16; 4]; 3],
            hold_open: true,
        };
        let listener = SpeechListener::new(Arc::new(mic), config());
        let start = Instant::now();
        assert!(listener.listen().unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_unavailable_microphone_is_reported() {
        let listener = SpeechListener::new(Arc::new(BrokenMicrophone), config());
        assert!(matches!(listener.listen(), Err(Error::SensorUnavailable(_))));
    }
}
