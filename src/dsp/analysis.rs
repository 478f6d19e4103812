//! Block analysis behind the oracle: spectrum, autocorrelation and a pitch
//! estimate snapped to an equal-tempered tuning table.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Blocks quieter than this (in dB of summed energy) are treated as silence.
pub const ENERGY_THRESHOLD_DB: f32 = -15.0;
pub const MIN_PITCH_HZ: f32 = 80.0;
pub const MAX_PITCH_HZ: f32 = 1600.0;

/// Peaks at least this fraction of the strongest one are pitch candidates.
const KEY_MAXIMUM_RATIO: f32 = 0.8;

/// Scales a block so its loudest sample reaches this level before correlation.
const NORMALIZED_PEAK: f32 = 0.9;

const TUNING_BASE_HZ: f32 = 55.0;
const TUNING_LEN: i32 = 48;
/// MIDI note of the first table entry, one semitone above A1.
const TUNING_FIRST_NOTE: i32 = 34;

/// Snaps `hz` to the nearest table note. Returns the tuned frequency and its MIDI note.
pub fn quantize_to_tuning(hz: f32) -> Option<(f32, i32)> {
    if hz <= 0.0 {
        return None;
    }
    (1..=TUNING_LEN)
        .map(|k| (TUNING_BASE_HZ * 2f32.powf(k as f32 / 12.0), TUNING_FIRST_NOTE + k - 1))
        .min_by(|a, b| (a.0 - hz).abs().total_cmp(&(b.0 - hz).abs()))
}

/// Result of a pitch analysis on one block.
#[derive(Debug, Clone, Default)]
pub struct PitchAnalysis {
    pub frequency_hz: f32,
    pub midi_pitch: f32,
    pub midi_note: i32,
    /// Autocorrelation the estimate was read from; all zeros when gated as silence.
    pub correlation: Vec<f32>,
}

pub struct Analyzer {
    block_size: usize,
    forward: Arc<dyn Fft<f32>>,
    forward_padded: Arc<dyn Fft<f32>>,
    inverse_padded: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
}

impl Analyzer {
    pub fn new(block_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            block_size,
            forward: planner.plan_fft_forward(block_size),
            forward_padded: planner.plan_fft_forward(block_size * 2),
            inverse_padded: planner.plan_fft_inverse(block_size * 2),
            buffer: Vec::with_capacity(block_size * 2),
        }
    }

    /// One-sided magnitude spectrum, `block_size / 2` bins.
    pub fn magnitude_spectrum(&mut self, block: &[f32]) -> Vec<f32> {
        self.load(block, self.block_size, 1.0);
        self.forward.process(&mut self.buffer);
        self.buffer[..self.block_size / 2]
            .iter()
            .map(|c| c.norm())
            .collect()
    }

    /// Linear autocorrelation of the zero-padded block, `2 * block_size` lags.
    pub fn autocorrelation(&mut self, block: &[f32]) -> Vec<f32> {
        let peak = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let gain = if peak > 0.0 && peak < NORMALIZED_PEAK {
            NORMALIZED_PEAK / peak
        } else {
            1.0
        };
        let len = self.block_size * 2;
        self.load(block, len, gain);
        self.forward_padded.process(&mut self.buffer);
        for bin in self.buffer.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse_padded.process(&mut self.buffer);
        let scale = 1.0 / len as f32;
        self.buffer.iter().map(|c| c.re * scale).collect()
    }

    pub fn estimate_pitch(&mut self, block: &[f32], sample_rate: f32) -> PitchAnalysis {
        let energy: f32 = block.iter().map(|s| s * s).sum();
        let energy_db = 10.0 * energy.max(f32::MIN_POSITIVE).log10();
        if energy_db <= ENERGY_THRESHOLD_DB {
            return PitchAnalysis {
                correlation: vec![0.0; self.block_size * 2],
                ..PitchAnalysis::default()
            };
        }

        let correlation = self.autocorrelation(block);
        let estimate = pick_period(&correlation[..self.block_size])
            .map(|lag| sample_rate / lag)
            .filter(|hz| (MIN_PITCH_HZ..MAX_PITCH_HZ).contains(hz));

        match estimate.and_then(|hz| quantize_to_tuning(hz).map(|t| (hz, t))) {
            Some((hz, (tuned, note))) => PitchAnalysis {
                frequency_hz: hz,
                midi_pitch: tuned,
                midi_note: note,
                correlation,
            },
            None => PitchAnalysis {
                correlation,
                ..PitchAnalysis::default()
            },
        }
    }

    fn load(&mut self, block: &[f32], len: usize, gain: f32) {
        self.buffer.clear();
        self.buffer.extend(
            block
                .iter()
                .take(self.block_size)
                .map(|s| Complex::new(s * gain, 0.0)),
        );
        self.buffer.resize(len, Complex::new(0.0, 0.0));
    }
}

/// Picks the fundamental period (in fractional lags) from a biased autocorrelation.
fn pick_period(correlation: &[f32]) -> Option<f32> {
    let n = correlation.len();
    let energy = *correlation.first()?;
    if energy <= 0.0 || n < 4 {
        return None;
    }
    // Unbias so later lags are not penalized for overlapping less of the block.
    let nac: Vec<f32> = correlation
        .iter()
        .enumerate()
        .take(n / 2)
        .map(|(k, r)| r / energy * n as f32 / (n - k) as f32)
        .collect();

    let first_negative = nac.iter().position(|v| *v < 0.0)?;
    let peaks: Vec<usize> = (first_negative.max(1)..nac.len() - 1)
        .filter(|&k| nac[k] > 0.0 && nac[k] >= nac[k - 1] && nac[k] > nac[k + 1])
        .collect();
    let strongest = peaks.iter().map(|&k| nac[k]).fold(0.0f32, f32::max);
    let lag = *peaks
        .iter()
        .find(|&&k| nac[k] >= KEY_MAXIMUM_RATIO * strongest)?;

    // Parabolic interpolation around the chosen peak.
    let (a, b, c) = (nac[lag - 1], nac[lag], nac[lag + 1]);
    let denom = a - 2.0 * b + c;
    let offset = if denom.abs() > f32::EPSILON {
        0.5 * (a - c) / denom
    } else {
        0.0
    };
    Some(lag as f32 + offset)
}
