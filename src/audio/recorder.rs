//! Audio recorder using CPAL for capture
//!
//! The AudioRecorder captures audio from the default input device into an
//! in-memory chunk buffer. The cpal `Stream` is not `Send`, so each recording
//! runs on a dedicated audio thread that owns the stream; the returned
//! `RecordingHandle` talks to it through a stop flag and a shared buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};

/// How long the audio thread sleeps between stop-flag checks.
const STOP_POLL: Duration = Duration::from_millis(10);

/// How long to wait for the audio thread to report the stream is live.
const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur during audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    CaptureThreadFailed(String),
    WriteFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::CaptureThreadFailed(e) => write!(f, "Capture thread failed: {}", e),
            AudioError::WriteFailed(e) => write!(f, "Failed to encode audio data: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

/// Raw capture output: the drained chunk buffer plus the stream parameters
/// needed to encode it.
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Handle to an active recording.
/// The chunk buffer fills while the handle is alive; `stop()` halts the
/// stream and drains the buffer.
pub struct RecordingHandle {
    chunks: Arc<Mutex<Vec<i16>>>,
    stop_flag: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
    sample_rate: u32,
    channels: u16,
}

impl RecordingHandle {
    /// Stop recording and drain the captured chunks.
    ///
    /// Joining the audio thread tears the stream down first, so every
    /// pending chunk lands in the buffer before it is drained.
    pub fn stop(self) -> Result<CapturedAudio, AudioError> {
        self.stop_flag.store(true, Ordering::SeqCst);

        self.thread
            .join()
            .map_err(|_| AudioError::CaptureThreadFailed("audio thread panicked".to_string()))?;

        let samples = self
            .chunks
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        tracing::info!(samples = samples.len(), "capture stopped");

        Ok(CapturedAudio {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

/// Audio recorder that captures from the default input device.
pub struct AudioRecorder {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl AudioRecorder {
    /// Create a new AudioRecorder using the default input device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        tracing::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig)?;

        tracing::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    /// Start capturing into a fresh chunk buffer.
    /// Returns a handle that must be used to stop the recording.
    pub fn start(&self) -> Result<RecordingHandle, AudioError> {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let thread_chunks = chunks.clone();
        let thread_stop = stop_flag.clone();

        // The thread reports back once the stream is playing (or failed to
        // build), so start() fails fast instead of at stop time.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

        let thread = thread::Builder::new()
            .name("voicebooth-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(&device, &config, sample_format, thread_chunks) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                while !thread_stop.load(Ordering::SeqCst) {
                    thread::sleep(STOP_POLL);
                }

                drop(stream);
            })
            .map_err(|e| AudioError::CaptureThreadFailed(e.to_string()))?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::info!("capture started");
                Ok(RecordingHandle {
                    chunks,
                    stop_flag,
                    thread,
                    sample_rate: self.config.sample_rate.0,
                    channels: self.config.channels,
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                stop_flag.store(true, Ordering::SeqCst);
                Err(AudioError::CaptureThreadFailed(
                    "timed out waiting for the audio stream".to_string(),
                ))
            }
        }
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    chunks: Arc<Mutex<Vec<i16>>>,
) -> Result<cpal::Stream, AudioError> {
    let err_fn = |err| tracing::error!("Audio stream error: {}", err);

    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, chunks, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, chunks, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, chunks, err_fn),
        _ => Err(AudioError::NoSupportedConfig),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    chunks: Arc<Mutex<Vec<i16>>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = chunks.lock() {
                    buf.extend(data.iter().map(|&sample| sample_to_i16(sample)));
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Convert any sample type to i16 for the chunk buffer.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Clamping
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn audio_error_display_names_the_failure() {
        assert!(AudioError::NoInputDevice.to_string().contains("input device"));
        assert!(AudioError::StreamCreationFailed("busy".to_string())
            .to_string()
            .contains("busy"));
        assert!(AudioError::CaptureThreadFailed("panicked".to_string())
            .to_string()
            .contains("panicked"));
    }
}
