//! The DSP oracle: the signal source the visualizer and MIDI loops poll.
//!
//! Both loops treat the oracle as a synchronous, non-blocking service that can
//! be called at least 60 times a second from any thread.

pub mod analysis;
pub mod capture;
mod oracle;
pub mod synthetic;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

pub use oracle::{AnalysisOracle, BlockSource};

/// Which feature vector the oracle produces and which view the visualizer draws.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    RawAudio,
    MagnitudeSpectrum,
    AutoCorrelation,
    PitchEstimate,
}

impl ProcessingMode {
    pub const ALL: [ProcessingMode; 4] = [
        ProcessingMode::RawAudio,
        ProcessingMode::MagnitudeSpectrum,
        ProcessingMode::AutoCorrelation,
        ProcessingMode::PitchEstimate,
    ];

    /// Maps a selector position to a mode; unknown positions fall back to raw audio.
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessingMode::RawAudio => "Raw audio",
            ProcessingMode::MagnitudeSpectrum => "Magnitude spectrum",
            ProcessingMode::AutoCorrelation => "Autocorrelation",
            ProcessingMode::PitchEstimate => "Pitch estimate",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One timestamped pitch reading. `frequency_hz <= 0` means no pitch detected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    pub frequency_hz: f32,
    /// Frequency of the tuned note the estimate was snapped to.
    pub midi_pitch: f32,
    pub midi_note: i32,
    pub timestamp: Instant,
}

impl PitchSample {
    pub fn silent() -> Self {
        Self {
            frequency_hz: 0.0,
            midi_pitch: 0.0,
            midi_note: 0,
            timestamp: Instant::now(),
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Signal source polled by the visualizer, MIDI and readout loops.
pub trait DspOracle: Send + Sync {
    /// Acquires whatever the oracle needs to produce readings (e.g. an input stream).
    fn init(&self) -> Result<()>;

    /// Releases what `init` acquired. Readings afterwards are silent.
    fn teardown(&self);

    fn set_processing_mode(&self, mode: ProcessingMode);

    /// A fresh feature vector for `mode`; its length depends on the mode.
    fn pull_feature_vector(&self, mode: ProcessingMode) -> Vec<f32>;

    fn pull_pitch_sample(&self) -> PitchSample;

    fn pull_midi_note(&self) -> i32;
}
