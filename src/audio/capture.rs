//! Microphone capture with `cpal`

use super::{CaptureStream, Microphone};
use crate::{constants::PCM_FULL_SCALE, Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, trace};

/// Splits callback buffers into fixed-size chunks for the listener
struct Chunker {
    chunk_size: usize,
    pending: Vec<i16>,
    sink: Sender<Vec<i16>>,
}

impl Chunker {
    fn push(&mut self, samples: impl Iterator<Item = i16>) {
        self.pending.extend(samples);
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<i16> = self.pending.drain(..self.chunk_size).collect();
            match self.sink.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("Audio channel full, dropping chunk"),
                Err(TrySendError::Disconnected(_)) => {
                    self.pending.clear();
                    return;
                }
            }
        }
    }
}

struct CpalCapture {
    _stream: Stream,
}

impl CaptureStream for CpalCapture {}

/// Captures mono audio from an input device
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// Use the named input device, or the system default when `None`
    #[must_use]
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| Error::SensorUnavailable("no input device available".to_string())),
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::SensorUnavailable(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == *name))
                .ok_or_else(|| Error::SensorUnavailable(format!("input device '{name}' not found"))),
        }
    }
}

impl Microphone for CpalMicrophone {
    fn start(&self, sample_rate: u32, chunk_size: usize, sink: Sender<Vec<i16>>) -> Result<Box<dyn CaptureStream>> {
        let device = self.device()?;
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::SensorUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::SensorUnavailable(format!("no mono {sample_rate} Hz input config")))?
            .with_sample_rate(SampleRate(sample_rate));

        let format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let mut chunker = Chunker {
            chunk_size,
            pending: Vec::with_capacity(chunk_size * 2),
            sink,
        };
        let on_error = |err: cpal::StreamError| error!("Audio capture error: {err}");

        let stream = match format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| chunker.push(data.iter().copied()),
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    #[allow(clippy::cast_possible_truncation)]
                    chunker.push(data.iter().map(|&s| (s * PCM_FULL_SCALE).clamp(-32768.0, 32767.0) as i16));
                },
                on_error,
                None,
            ),
            other => {
                return Err(Error::SensorUnavailable(format!("unsupported input sample format {other:?}")));
            }
        }
        .map_err(|e| Error::SensorUnavailable(e.to_string()))?;

        stream.play().map_err(|e| Error::SensorUnavailable(e.to_string()))?;
        info!(
            "Microphone '{}' capturing at {sample_rate} Hz",
            device.name().unwrap_or_default()
        );
        debug!("Chunk size {chunk_size} samples");
        Ok(Box::new(CpalCapture { _stream: stream }))
    }
}
