use crate::dsp::DspOracle;
use crate::state::{PitchReadout, SharedRunState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// UI sampling loop: publishes the current pitch estimate for the info label
/// every `period` while recording is active.
pub fn run_readout(
    oracle: Arc<dyn DspOracle>,
    run_state: Arc<SharedRunState>,
    readout: Arc<PitchReadout>,
    period: Duration,
) {
    while run_state.is_recording() {
        let start = Instant::now();
        readout.publish(oracle.pull_pitch_sample().frequency_hz);
        let elapsed = start.elapsed();
        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }
    readout.publish(0.0);
    debug!("pitch readout stopped");
}
