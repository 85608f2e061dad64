//! Audio output sinks.
//!
//! The session renders mono `f32` blocks; an [`AudioSink`] takes them from
//! there. With the `device` feature, [`open_device`] plays them on the
//! default output device through cpal and a lock-free ring buffer.

/// Destination for rendered mono blocks.
pub trait AudioSink: Send {
    fn write(&mut self, samples: &[f32]);
}

/// Collects everything in memory.
impl AudioSink for Vec<f32> {
    fn write(&mut self, samples: &[f32]) {
        self.extend_from_slice(samples);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _samples: &[f32]) {}
}

#[cfg(feature = "device")]
pub use device::{open_device, DeviceSink, DeviceStream};

#[cfg(feature = "device")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use ringbuf::{
        HeapRb,
        traits::{Consumer, Producer, Split},
    };
    use tracing::{debug, error, info};

    use super::AudioSink;
    use crate::error::AudioError;

    /// Ring buffer length as a fraction of a second (100 ms).
    const RING_BUFFER_DIVISOR: usize = 10;

    /// Keeps the cpal stream alive. Must stay on the thread that opened it.
    pub struct DeviceStream {
        _stream: cpal::Stream,
        sample_rate: u32,
        channels: u16,
    }

    impl DeviceStream {
        pub fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        pub fn channels(&self) -> u16 {
            self.channels
        }
    }

    /// Producer side of the ring buffer; safe to move to the render task.
    pub struct DeviceSink {
        producer: ringbuf::HeapProd<f32>,
    }

    impl AudioSink for DeviceSink {
        fn write(&mut self, samples: &[f32]) {
            let pushed = self.producer.push_slice(samples);
            if pushed < samples.len() {
                debug!("Audio buffer overflow: dropped {} samples", samples.len() - pushed);
            }
        }
    }

    /// Open the default output device. Mono input is copied to every channel.
    pub fn open_device() -> Result<(DeviceStream, DeviceSink), AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("No audio output device available".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Device(format!("Failed to get default output config: {e}")))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let ring = HeapRb::<f32>::new(sample_rate as usize / RING_BUFFER_DIVISOR);
        let (producer, mut consumer) = ring.split();
        let frame = channels.max(1) as usize;
        let mut mono: Vec<f32> = vec![0.0; 4096];

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fan_out(&mut consumer, &mut mono, data, frame, 0.0, |s| s);
                },
                |err| error!("Audio stream error: {err}"),
                None,
            ),
            cpal::SampleFormat::I16 => device.build_output_stream(
                &config.into(),
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    fan_out(&mut consumer, &mut mono, data, frame, 0, |s| {
                        (s * 32767.0).clamp(-32768.0, 32767.0) as i16
                    });
                },
                |err| error!("Audio stream error: {err}"),
                None,
            ),
            cpal::SampleFormat::U16 => device.build_output_stream(
                &config.into(),
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    fan_out(&mut consumer, &mut mono, data, frame, 32768, |s| {
                        (s * 32767.0 + 32768.0).clamp(0.0, 65535.0) as u16
                    });
                },
                |err| error!("Audio stream error: {err}"),
                None,
            ),
            other => {
                return Err(AudioError::Device(format!("Unsupported sample format: {other:?}")));
            }
        }
        .map_err(|e| AudioError::Device(format!("Failed to build audio stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AudioError::Device(format!("Failed to play audio stream: {e}")))?;
        info!(sample_rate, channels, "Audio device opened");

        Ok((
            DeviceStream {
                _stream: stream,
                sample_rate,
                channels,
            },
            DeviceSink { producer },
        ))
    }

    /// Pop one mono sample per output frame and copy it to every channel.
    /// Underruns are filled with `silence`.
    fn fan_out<T: Copy>(
        consumer: &mut ringbuf::HeapCons<f32>,
        mono: &mut Vec<f32>,
        data: &mut [T],
        channels: usize,
        silence: T,
        convert: impl Fn(f32) -> T,
    ) {
        let frames = data.len() / channels;
        if mono.len() < frames {
            mono.resize(frames, 0.0);
        }
        let popped = consumer.pop_slice(&mut mono[..frames]);
        for (i, out) in data.chunks_mut(channels).enumerate() {
            let value = if i < popped { convert(mono[i]) } else { silence };
            out.fill(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_blocks() {
        let mut sink: Vec<f32> = Vec::new();
        sink.write(&[0.1, 0.2]);
        sink.write(&[0.3]);
        assert_eq!(sink, vec![0.1, 0.2, 0.3]);
    }
}
