//! Audio capture implementation using a dedicated thread

use super::sources::SourceSelector;
use crate::adapter::{AdapterError, AudioBackend, Tap};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No output device found")]
    NoOutputDevice,

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Commands sent to the audio thread
enum AudioCommand {
    Stop,
}

/// Audio capture handle
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the
/// whole capture. This handle only holds the command channel, the thread
/// handle and the shared sample buffer.
pub struct AudioCaptureHandle {
    /// Command sender to control the audio thread
    command_tx: mpsc::Sender<AudioCommand>,

    /// Handle to the audio thread
    thread_handle: Option<JoinHandle<()>>,

    /// Mono samples written by the stream callback
    buffer: Arc<Mutex<AudioBuffer>>,

    /// Device sample rate, fixed for the lifetime of the stream
    sample_rate: u32,
}

impl AudioCaptureHandle {
    /// Open the source and start capturing.
    ///
    /// Blocks until the capture thread reports that the stream is playing or
    /// that it failed to open. `window_len` is the number of most recent
    /// samples callers will read per tick.
    pub fn start(source_id: &str, window_len: usize) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let buffer = Arc::new(Mutex::new(AudioBuffer::new(window_len * 2)));
        let buffer_clone = buffer.clone();
        let source_id = source_id.to_string();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_audio_thread(&source_id, command_rx, buffer_clone, ready_tx))
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(sample_rate)) => sample_rate,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(CaptureError::ThreadError(
                    "capture thread exited before the stream started".to_string(),
                ));
            }
        };

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
            buffer,
            sample_rate,
        })
    }

    /// Device sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Copy the most recent samples into `out`, oldest first
    pub fn copy_latest(&self, out: &mut [f32]) {
        self.buffer.lock().copy_latest(out);
    }

    /// Stop the audio capture
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Tap for AudioCaptureHandle {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_latest(&self, out: &mut [f32]) {
        self.copy_latest(out);
    }

    fn disconnect(&mut self) {
        self.stop();
    }
}

/// Backend that taps cpal devices
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn attach(&self, source_id: &str, window_len: usize) -> Result<Box<dyn Tap>, AdapterError> {
        let handle = AudioCaptureHandle::start(source_id, window_len)?;
        Ok(Box::new(handle))
    }
}

/// Circular audio buffer
pub(crate) struct AudioBuffer {
    samples: Vec<f32>,
    write_pos: usize,
    capacity: usize,
}

impl AudioBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
            capacity,
        }
    }

    pub(crate) fn push(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Fill `out` with the latest samples in time order. When `out` is longer
    /// than the buffer, the leading part is zero-filled.
    pub(crate) fn copy_latest(&self, out: &mut [f32]) {
        let count = out.len().min(self.capacity);
        let pad = out.len() - count;
        out[..pad].fill(0.0);

        let start = if self.write_pos >= count {
            self.write_pos - count
        } else {
            self.capacity - (count - self.write_pos)
        };

        for (i, slot) in out[pad..].iter_mut().enumerate() {
            *slot = self.samples[(start + i) % self.capacity];
        }
    }
}

/// Run the audio capture in a dedicated thread
fn run_audio_thread(
    source_id: &str,
    command_rx: mpsc::Receiver<AudioCommand>,
    buffer: Arc<Mutex<AudioBuffer>>,
    ready_tx: mpsc::Sender<Result<u32, CaptureError>>,
) {
    // The stream must stay alive on this thread until Stop arrives
    let _stream = match open_stream(source_id, buffer) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            log::error!("Audio capture failed to open {}: {}", source_id, e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    match command_rx.recv() {
        Ok(AudioCommand::Stop) => log::info!("Audio capture stopping: {}", source_id),
        Err(_) => log::info!("Audio capture channel disconnected: {}", source_id),
    }
}

/// Resolve the device for a source id and start a stream feeding `buffer`
fn open_stream(
    source_id: &str,
    buffer: Arc<Mutex<AudioBuffer>>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();

    let selector = SourceSelector::parse(source_id)
        .ok_or_else(|| CaptureError::SourceNotFound(source_id.to_string()))?;

    let device = match selector {
        SourceSelector::SystemAudio => {
            // WASAPI loopback: build an input stream on the default OUTPUT device
            log::info!("Using default output device for system audio loopback");
            host.default_output_device()
                .ok_or(CaptureError::NoOutputDevice)?
        }
        SourceSelector::Output(device_name) => {
            log::info!("Using output device for loopback: {}", device_name);
            host.output_devices()
                .map_err(|e| CaptureError::ConfigError(e.to_string()))?
                .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
                .ok_or_else(|| CaptureError::SourceNotFound(device_name.to_string()))?
        }
        SourceSelector::Input(device_name) => host
            .input_devices()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?
            .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
            .ok_or_else(|| CaptureError::SourceNotFound(device_name.to_string()))?,
    };

    // For loopback, query the output config (what the device is producing)
    let config = if selector.is_loopback() {
        device
            .default_output_config()
            .map_err(|e| CaptureError::ConfigError(format!("Loopback config: {}", e)))?
    } else {
        device
            .default_input_config()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    log::info!("Audio capture: {} Hz, {} channels", sample_rate, channels);

    let stream = match config.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), buffer, channels),
        SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), buffer, channels),
        SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), buffer, channels),
        other => {
            return Err(CaptureError::ConfigError(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayError(e.to_string()))?;

    log::info!("Audio capture started: {}", source_id);

    Ok((stream, sample_rate))
}

/// Build audio stream for given sample type
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<AudioBuffer>>,
    channels: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Downmix interleaved frames to mono while holding the lock once
            let mut buf = buffer.lock();
            for frame in data.chunks(channels) {
                let sum: f32 = frame
                    .iter()
                    .map(|s| <f32 as cpal::Sample>::from_sample(*s))
                    .sum();
                buf.push(sum / channels as f32);
            }
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )
}
