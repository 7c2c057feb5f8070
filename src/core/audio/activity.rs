//! Energy-based audio activity detection and the debounced activity indicator.
//!
//! Detection is a pure RMS threshold over one frame. It only drives a UI
//! signal; whether audio is transmitted is decided by the capture gate.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::core::realtime::DisplaySink;

/// Default RMS threshold separating activity from silence.
pub const DEFAULT_ACTIVITY_THRESHOLD: f32 = 0.01;

/// Default time the indicator stays lit after the last activity pulse.
pub const DEFAULT_ACTIVITY_HOLD: Duration = Duration::from_millis(1000);

/// Root-mean-square energy of a frame. NaN samples count as silence.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| if s.is_nan() { 0.0 } else { (s as f64) * (s as f64) })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Whether a frame is active at the default threshold.
#[inline]
pub fn is_active(samples: &[f32]) -> bool {
    is_active_with_threshold(samples, DEFAULT_ACTIVITY_THRESHOLD)
}

/// Whether a frame's RMS energy exceeds `threshold`.
#[inline]
pub fn is_active_with_threshold(samples: &[f32], threshold: f32) -> bool {
    rms_energy(samples) > threshold
}

// =============================================================================
// Debounced indicator
// =============================================================================

#[derive(Default)]
struct IndicatorState {
    /// Indicator currently reported as active to the display
    shown: bool,
    /// Remote audio playback in progress
    playing: bool,
    /// When the indicator should clear if no further pulse arrives
    deadline: Option<Instant>,
    /// Pending auto-clear task
    timer: Option<JoinHandle<()>>,
}

/// Activity indicator shared by the capture pipeline and the protocol engine.
///
/// `pulse` lights the indicator and (re)arms an auto-clear deadline. The
/// indicator clears once the deadline passes, unless remote playback is in
/// progress. Playback state is tracked separately so that microphone activity
/// and remote audio cannot starve each other.
#[derive(Clone)]
pub struct ActivityIndicator {
    display: Arc<dyn DisplaySink>,
    state: Arc<Mutex<IndicatorState>>,
    hold: Duration,
}

impl ActivityIndicator {
    pub fn new(display: Arc<dyn DisplaySink>, hold: Duration) -> Self {
        Self {
            display,
            state: Arc::new(Mutex::new(IndicatorState::default())),
            hold,
        }
    }

    /// Whether the indicator is currently lit.
    pub fn is_shown(&self) -> bool {
        self.state.lock().shown
    }

    /// Whether remote playback is in progress.
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Signal activity and re-arm the auto-clear deadline.
    pub fn pulse(&self) {
        let notify = {
            let mut state = self.state.lock();
            let notify = !state.shown && !state.playing;
            if notify {
                state.shown = true;
            }
            state.deadline = Some(Instant::now() + self.hold);

            if state.timer.is_none() {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let display = self.display.clone();
                        let shared = self.state.clone();
                        state.timer = Some(handle.spawn(run_clear_timer(shared, display)));
                    }
                    Err(_) => trace!("No runtime available, activity indicator will not auto-clear"),
                }
            }
            notify
        };

        if notify {
            self.display.on_activity(true);
        }
    }

    /// Record remote playback starting or stopping.
    pub fn set_playing(&self, playing: bool) {
        let notify = {
            let mut state = self.state.lock();
            state.playing = playing;
            let changed = state.shown != playing;
            state.shown = playing;
            if !playing {
                state.deadline = None;
            }
            changed
        };

        if notify {
            self.display.on_activity(playing);
        }
    }

    /// Cancel any pending auto-clear and reset to idle without notifying.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        *state = IndicatorState::default();
    }
}

async fn run_clear_timer(state: Arc<Mutex<IndicatorState>>, display: Arc<dyn DisplaySink>) {
    loop {
        let pending = state.lock().deadline;
        let deadline = match pending {
            Some(deadline) => deadline,
            None => {
                state.lock().timer = None;
                return;
            }
        };

        tokio::time::sleep_until(deadline).await;

        let clear = {
            let mut guard = state.lock();
            match guard.deadline {
                // Re-armed by a later pulse
                Some(d) if d > Instant::now() => continue,
                _ => {
                    guard.deadline = None;
                    guard.timer = None;
                    let clear = guard.shown && !guard.playing;
                    if clear {
                        guard.shown = false;
                    }
                    clear
                }
            }
        };

        if clear {
            display.on_activity(false);
        }
        return;
    }
}
