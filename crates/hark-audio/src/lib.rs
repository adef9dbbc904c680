//! Hark Audio crate - frame queue and microphone capture.
//!
//! Provides the bounded frame queue that decouples the real-time capture
//! callback from recognition work, a trait-based abstraction for audio
//! capture, a cpal-backed capture service, and a mock implementation for
//! testing without real audio hardware.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hark_core::error::HarkError;

pub mod capture;
pub mod queue;

pub use capture::{CaptureConfig, CpalCaptureService, FrameChunker};
pub use queue::FrameQueue;

/// Audio sample format (16-bit mono PCM).
pub type Sample = i16;

/// One fixed-size block of samples, produced at a fixed cadence by the
/// capture callback. Ownership moves from the callback to the queue to the
/// session loop.
pub type Frame = Vec<Sample>;

// =============================================================================
// Traits
// =============================================================================

/// Service for managing audio capture from a device.
///
/// Implementations handle device initialization, starting/stopping
/// capture streams, and reporting capture state.
pub trait AudioCaptureService: Send + Sync {
    /// Start capturing audio from the configured device.
    fn start(&self) -> impl Future<Output = Result<(), HarkError>> + Send;

    /// Stop the current audio capture session.
    fn stop(&self) -> impl Future<Output = Result<(), HarkError>> + Send;

    /// Check whether audio capture is currently active.
    fn is_active(&self) -> bool;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock audio capture service for testing.
///
/// Simulates audio capture without requiring real hardware. Tracks
/// active state via an atomic boolean so it is fully thread-safe.
#[derive(Debug, Clone, Default)]
pub struct MockCaptureService {
    active: Arc<AtomicBool>,
}

impl MockCaptureService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioCaptureService for MockCaptureService {
    async fn start(&self) -> Result<(), HarkError> {
        if self.active.load(Ordering::Relaxed) {
            return Err(HarkError::Audio(
                "Audio capture is already active".to_string(),
            ));
        }
        self.active.store(true, Ordering::Relaxed);
        tracing::info!("Mock audio capture started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), HarkError> {
        if !self.active.load(Ordering::Relaxed) {
            return Err(HarkError::Audio("Audio capture is not active".to_string()));
        }
        self.active.store(false, Ordering::Relaxed);
        tracing::info!("Mock audio capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
