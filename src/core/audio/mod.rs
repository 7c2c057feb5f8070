//! Microphone audio path: PCM16 codec, activity detection and the capture gate.

pub mod activity;
pub mod capture;
pub mod pcm;

pub use activity::{
    ActivityIndicator, DEFAULT_ACTIVITY_HOLD, DEFAULT_ACTIVITY_THRESHOLD, is_active,
    is_active_with_threshold, rms_energy,
};
pub use capture::{AudioCapture, CaptureStats, MAX_FRAME_SIZE, MIN_FRAME_SIZE, is_valid_frame_size};
pub use pcm::{
    PCM16_QUANTIZATION_STEP, encode_pcm16_into, float_to_pcm16, floats_to_pcm16, pcm16_to_float,
    pcm16_to_floats,
};
