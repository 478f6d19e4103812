use super::analysis::{Analyzer, PitchAnalysis};
use super::{DspOracle, PitchSample, ProcessingMode};
use crate::error::Result;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

/// Where an [`AnalysisOracle`] gets its audio from.
pub trait BlockSource: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self);

    /// Copies the most recent block into `out` and returns its generation.
    /// The generation changes whenever a new block is available.
    fn latest_block(&self, out: &mut Vec<f32>) -> u64;

    fn sample_rate(&self) -> f32;
}

struct OracleState {
    mode: ProcessingMode,
    analyzer: Analyzer,
    block: Vec<f32>,
    /// Generation of the block `pitch` was computed from.
    analyzed: Option<u64>,
    pitch: PitchAnalysis,
    pitch_time: Instant,
}

/// A [`DspOracle`] that analyzes blocks from a [`BlockSource`] on demand.
///
/// The pitch analysis is cached per block generation, so the MIDI loop can poll
/// far faster than new audio arrives without repeating the work.
pub struct AnalysisOracle<S> {
    source: S,
    state: Mutex<OracleState>,
}

impl<S: BlockSource> AnalysisOracle<S> {
    pub fn new(source: S, block_size: usize) -> Self {
        Self {
            source,
            state: Mutex::new(OracleState {
                mode: ProcessingMode::default(),
                analyzer: Analyzer::new(block_size),
                block: Vec::with_capacity(block_size),
                analyzed: None,
                pitch: PitchAnalysis::default(),
                pitch_time: Instant::now(),
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut OracleState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn refresh(&self, state: &mut OracleState) {
        let generation = self.source.latest_block(&mut state.block);
        if state.analyzed != Some(generation) {
            let sample_rate = self.source.sample_rate();
            state.pitch = state.analyzer.estimate_pitch(&state.block, sample_rate);
            state.pitch_time = Instant::now();
            state.analyzed = Some(generation);
        }
    }
}

impl<S: BlockSource> DspOracle for AnalysisOracle<S> {
    fn init(&self) -> Result<()> {
        self.source.start()?;
        self.with_state(|state| state.analyzed = None);
        info!("DSP oracle started");
        Ok(())
    }

    fn teardown(&self) {
        self.source.stop();
        self.with_state(|state| {
            state.pitch = PitchAnalysis::default();
            state.analyzed = None;
        });
        info!("DSP oracle torn down");
    }

    fn set_processing_mode(&self, mode: ProcessingMode) {
        debug!(?mode, "processing mode set");
        self.with_state(|state| state.mode = mode);
    }

    fn pull_feature_vector(&self, mode: ProcessingMode) -> Vec<f32> {
        self.with_state(|state| match mode {
            ProcessingMode::RawAudio => {
                self.source.latest_block(&mut state.block);
                state.block.clone()
            }
            ProcessingMode::MagnitudeSpectrum => {
                self.source.latest_block(&mut state.block);
                let OracleState { analyzer, block, .. } = state;
                analyzer.magnitude_spectrum(block)
            }
            ProcessingMode::AutoCorrelation => {
                self.source.latest_block(&mut state.block);
                let OracleState { analyzer, block, .. } = state;
                analyzer.autocorrelation(block)
            }
            ProcessingMode::PitchEstimate => {
                self.refresh(state);
                state.pitch.correlation.clone()
            }
        })
    }

    fn pull_pitch_sample(&self) -> PitchSample {
        self.with_state(|state| {
            if state.mode != ProcessingMode::PitchEstimate {
                return PitchSample::silent();
            }
            self.refresh(state);
            PitchSample {
                frequency_hz: state.pitch.frequency_hz,
                midi_pitch: state.pitch.midi_pitch,
                midi_note: state.pitch.midi_note,
                timestamp: state.pitch_time,
            }
        })
    }

    fn pull_midi_note(&self) -> i32 {
        self.pull_pitch_sample().midi_note
    }
}
