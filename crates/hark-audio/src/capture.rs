//! Microphone capture via cpal.
//!
//! Opens the configured input device and registers a real-time callback that
//! slices incoming PCM into fixed-size frames and hands them to the
//! `FrameQueue`. The callback does no recognition work and never blocks on
//! the consumer; everything downstream happens on the session loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use hark_core::error::HarkError;

use crate::queue::FrameQueue;
use crate::{AudioCaptureService, Sample};

/// Configuration for the cpal capture service.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Name or substring of the input device. "default" selects the system
    /// default input device.
    pub device_name: String,
    /// Sample rate in Hz requested from the device.
    pub sample_rate: u32,
    /// Samples per frame delivered to the queue.
    pub frame_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
            sample_rate: 16000,
            frame_samples: 512,
        }
    }
}

/// Accumulates callback buffers and emits exactly frame-sized chunks.
///
/// cpal delivers whatever buffer size the backend chooses; the decoder wants
/// a fixed frame length. Leftover samples stay pending until the next
/// callback fills the frame.
pub struct FrameChunker {
    queue: Arc<FrameQueue>,
    frame_samples: usize,
    pending: Vec<Sample>,
}

impl FrameChunker {
    pub fn new(queue: Arc<FrameQueue>, frame_samples: usize) -> Self {
        Self {
            queue,
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples.max(1) * 2),
        }
    }

    /// Feed native i16 samples.
    pub fn push_i16(&mut self, data: &[Sample]) {
        self.pending.extend_from_slice(data);
        self.emit_full_frames();
    }

    /// Feed f32 samples in [-1.0, 1.0], converting to i16.
    pub fn push_f32(&mut self, data: &[f32]) {
        self.pending.extend(
            data.iter()
                .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as Sample),
        );
        self.emit_full_frames();
    }

    /// Samples buffered but not yet emitted as a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn emit_full_frames(&mut self) {
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<Sample> = self.pending.drain(..self.frame_samples).collect();
            self.queue.push(frame);
        }
    }
}

/// Wrapper to make `cpal::Stream` usable inside `Mutex`.
///
/// `cpal::Stream` contains a raw-pointer marker that prevents auto
/// `Send`/`Sync`. The stream itself is safe to share via a `Mutex` because
/// we only ever drop it (to stop capture) or store it (to keep it alive).
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: SendStream wraps a cpal::Stream which manages its own audio thread.
// 1. The Stream handle is only used to start/stop capture, not to share data
// 2. Audio callbacks run on a separate OS thread managed by cpal
// 3. No mutable shared state between the Stream handle and callbacks
unsafe impl Send for SendStream {}
unsafe impl Sync for SendStream {}

/// Audio capture service backed by cpal.
///
/// Captures mono PCM from the configured device into the shared frame queue.
/// Dropping the held stream stops capture.
pub struct CpalCaptureService {
    config: CaptureConfig,
    queue: Arc<FrameQueue>,
    active: Arc<AtomicBool>,
    stream: Mutex<Option<SendStream>>,
}

impl CpalCaptureService {
    /// Create a new capture service feeding the given queue.
    pub fn new(config: CaptureConfig, queue: Arc<FrameQueue>) -> Self {
        Self {
            config,
            queue,
            active: Arc::new(AtomicBool::new(false)),
            stream: Mutex::new(None),
        }
    }

    /// Get a reference to the capture configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl AudioCaptureService for CpalCaptureService {
    async fn start(&self) -> Result<(), HarkError> {
        if self.active.load(Ordering::Relaxed) {
            return Err(HarkError::Audio("Audio capture already active".into()));
        }

        let host = cpal::default_host();

        // Find the requested device.
        let device = if self.config.device_name == "default" {
            host.default_input_device()
                .ok_or_else(|| HarkError::Audio("No default input device found".into()))?
        } else {
            let name_lower = self.config.device_name.to_lowercase();
            host.input_devices()
                .map_err(|e| HarkError::Audio(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&name_lower))
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    HarkError::Audio(format!(
                        "Audio device '{}' not found",
                        self.config.device_name
                    ))
                })?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        debug!(device = %device_name, "Selected audio device");

        // The decoder needs mono at the configured rate; request it directly.
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let sample_format = device
            .default_input_config()
            .map(|c| c.sample_format())
            .unwrap_or(cpal::SampleFormat::F32);

        let stream = match sample_format {
            cpal::SampleFormat::I16 => {
                let mut chunker =
                    FrameChunker::new(Arc::clone(&self.queue), self.config.frame_samples);
                let active_flag = Arc::clone(&self.active);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        chunker.push_i16(data);
                    },
                    move |err| {
                        error!("Audio stream error: {}", err);
                        active_flag.store(false, Ordering::Relaxed);
                    },
                    None,
                )
            }
            _ => {
                let mut chunker =
                    FrameChunker::new(Arc::clone(&self.queue), self.config.frame_samples);
                let active_flag = Arc::clone(&self.active);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        chunker.push_f32(data);
                    },
                    move |err| {
                        error!("Audio stream error: {}", err);
                        active_flag.store(false, Ordering::Relaxed);
                    },
                    None,
                )
            }
        }
        .map_err(|e| HarkError::Audio(format!("Failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| HarkError::Audio(format!("Failed to start audio stream: {}", e)))?;

        // Store the stream to keep it alive.
        if let Ok(mut guard) = self.stream.lock() {
            *guard = Some(SendStream(stream));
        }

        self.active.store(true, Ordering::Relaxed);
        info!(
            device = %device_name,
            sample_rate = self.config.sample_rate,
            frame_samples = self.config.frame_samples,
            "Audio capture started"
        );

        Ok(())
    }

    async fn stop(&self) -> Result<(), HarkError> {
        if !self.active.load(Ordering::Relaxed) {
            return Err(HarkError::Audio("Audio capture is not active".into()));
        }

        // Drop the stream to stop capture.
        if let Ok(mut guard) = self.stream.lock() {
            *guard = None;
        }

        self.active.store(false, Ordering::Relaxed);
        info!("Audio capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}
