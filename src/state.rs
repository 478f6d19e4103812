use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Run flags shared between the supervisor, the loops and the device-open callback.
///
/// Each flag has a single writer. Consumers only poll; nothing here wakes a
/// sleeping loop, so a cleared flag is observed at the reader's next tick.
#[derive(Debug, Default)]
pub struct SharedRunState {
    /// Written by the supervisor, read by the visualizer and readout loops.
    recording_active: AtomicBool,

    /// Written by the supervisor, read by the MIDI performance loop.
    midi_active: AtomicBool,

    /// Id of the open attempt still waiting for its callback, 0 when none.
    /// Armed by the supervisor, cleared by that attempt's callback only.
    device_open_pending: AtomicU64,

    last_open_attempt: AtomicU64,
}

impl SharedRunState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_recording(&self) -> bool {
        self.recording_active.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, active: bool) {
        self.recording_active.store(active, Ordering::Release);
    }

    pub fn is_midi_active(&self) -> bool {
        self.midi_active.load(Ordering::Acquire)
    }

    pub fn set_midi_active(&self, active: bool) {
        self.midi_active.store(active, Ordering::Release);
    }

    /// Marks a new open attempt as pending and returns its id.
    pub fn arm_device_open(&self) -> u64 {
        let attempt = self.last_open_attempt.fetch_add(1, Ordering::Relaxed) + 1;
        self.device_open_pending.store(attempt, Ordering::Release);
        attempt
    }

    /// Clears the pending flag if `attempt` is the one armed. A callback from an
    /// abandoned attempt gets `false` and leaves the current attempt untouched.
    pub fn complete_device_open(&self, attempt: u64) -> bool {
        self.device_open_pending
            .compare_exchange(attempt, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_device_open_pending(&self) -> bool {
        self.device_open_pending.load(Ordering::Acquire) != 0
    }

    pub fn is_open_attempt_pending(&self, attempt: u64) -> bool {
        self.device_open_pending.load(Ordering::Acquire) == attempt
    }
}

/// Latest pitch estimate published by the readout loop for the info label.
#[derive(Debug, Default)]
pub struct PitchReadout(AtomicU32);

impl PitchReadout {
    pub fn publish(&self, hz: f32) {
        self.0.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn hz(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_start_cleared() {
        let state = SharedRunState::new();
        assert!(!state.is_recording());
        assert!(!state.is_midi_active());
        assert!(!state.is_device_open_pending());
    }

    #[test]
    fn open_flag_clears_once() {
        let state = SharedRunState::new();
        let attempt = state.arm_device_open();
        assert!(state.is_device_open_pending());
        assert!(state.complete_device_open(attempt));
        assert!(!state.complete_device_open(attempt));
        assert!(!state.is_device_open_pending());
    }

    #[test]
    fn stale_callback_leaves_the_new_attempt_pending() {
        let state = SharedRunState::new();
        let abandoned = state.arm_device_open();
        let current = state.arm_device_open();
        assert_ne!(abandoned, current);

        assert!(!state.complete_device_open(abandoned));
        assert!(state.is_open_attempt_pending(current));
        assert!(state.complete_device_open(current));
        assert!(!state.is_device_open_pending());
    }

    #[test]
    fn readout_round_trips_through_bits() {
        let readout = PitchReadout::default();
        assert_eq!(readout.hz(), 0.0);
        readout.publish(440.5);
        assert_eq!(readout.hz(), 440.5);
    }
}
