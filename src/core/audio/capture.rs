//! Audio capture pipeline.
//!
//! Bridges fixed-size microphone frames into `input_audio_buffer.append`
//! events. Frames arriving while recording is off or the channel is not open
//! are dropped, never queued.

use tracing::{debug, trace, warn};

use super::activity::is_active_with_threshold;
use super::pcm::encode_pcm16_into;
use crate::core::realtime::ClientEvent;
use crate::core::realtime::engine::ProtocolEngine;

/// Smallest frame size accepted by the platform audio subsystem.
pub const MIN_FRAME_SIZE: usize = 256;

/// Largest frame size accepted by the platform audio subsystem.
pub const MAX_FRAME_SIZE: usize = 16384;

/// Whether `frame_size` is usable for capture.
pub fn is_valid_frame_size(frame_size: usize) -> bool {
    frame_size.is_power_of_two() && (MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&frame_size)
}

/// Per-pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub active_frames: u64,
    pub commits_sent: u64,
    /// Frames rejected because their length differs from the frame size
    pub frames_malformed: u64,
}

/// Recording gate and frame encoder.
pub struct AudioCapture {
    frame_size: usize,
    threshold: f32,
    recording: bool,
    pcm_buf: Vec<u8>,
    stats: CaptureStats,
}

impl AudioCapture {
    pub fn new(frame_size: usize, threshold: f32) -> Self {
        Self {
            frame_size,
            threshold,
            recording: false,
            pcm_buf: Vec::with_capacity(frame_size * 2),
            stats: CaptureStats::default(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Process one microphone frame. Returns whether it was transmitted.
    ///
    /// Only frames of exactly `frame_size` samples are sent.
    pub fn process_frame(&mut self, samples: &[f32], engine: &mut ProtocolEngine) -> bool {
        if !self.recording || samples.is_empty() || !engine.is_open() {
            self.stats.frames_dropped += 1;
            return false;
        }
        if samples.len() != self.frame_size {
            warn!(
                "Dropping frame of {} samples, expected {}",
                samples.len(),
                self.frame_size
            );
            self.stats.frames_dropped += 1;
            self.stats.frames_malformed += 1;
            return false;
        }

        if is_active_with_threshold(samples, self.threshold) {
            self.stats.active_frames += 1;
            engine.indicator().pulse();
        }

        encode_pcm16_into(samples, &mut self.pcm_buf);
        let sent = engine.send(ClientEvent::audio_append(&self.pcm_buf));
        if sent {
            self.stats.frames_sent += 1;
            trace!("Sent audio frame of {} samples", samples.len());
        } else {
            self.stats.frames_dropped += 1;
        }
        sent
    }

    /// Flip the recording gate.
    ///
    /// Turning recording off commits the buffered audio exactly once. Setting
    /// the current value again does nothing.
    pub fn set_recording(&mut self, enabled: bool, engine: &mut ProtocolEngine) {
        if self.recording == enabled {
            return;
        }
        self.recording = enabled;
        debug!("Recording {}", if enabled { "started" } else { "stopped" });

        if !enabled && engine.send(ClientEvent::InputAudioBufferCommit) {
            self.stats.commits_sent += 1;
        }
    }

    /// Turn the gate off without committing.
    pub fn reset(&mut self) {
        self.recording = false;
        self.pcm_buf.clear();
    }
}
