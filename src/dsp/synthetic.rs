use super::oracle::{AnalysisOracle, BlockSource};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const PIANO_NOTES: [f32; 52] = [
    27.5, 30.87, 32.7, 36.71, 41.2, 43.65, 49.0, 55.0, 61.74, 65.41, 73.42, 82.41, 87.31, 98.0,
    110.0, 123.47, 130.81, 146.83, 164.81, 174.61, 196.0, 220.0, 246.94, 261.63, 293.66, 329.63,
    349.23, 392.0, 440.0, 493.88, 523.25, 587.33, 659.25, 698.46, 784.0, 880.0, 987.77, 1046.5,
    1174.66, 1318.51, 1396.91, 1568.0, 1760.0, 1975.53, 2093.0, 2349.32, 2637.02, 2793.83, 3136.0,
    3520.0, 3951.07, 4186.01,
];

/// Fraction of segments that are left silent.
const REST_PROBABILITY: f64 = 0.25;

struct Segment {
    index: u64,
    frequency: Option<f32>,
}

/// A tone that hops to a random piano note every `segment` with occasional rests.
pub struct SyntheticSource {
    sample_rate: f32,
    block_size: usize,
    segment: Duration,
    amplitude: f32,
    origin: Mutex<Option<Instant>>,
    current: Mutex<(Segment, StdRng)>,
}

impl SyntheticSource {
    pub fn new(sample_rate: f32, block_size: usize, seed: u64) -> Self {
        Self {
            sample_rate,
            block_size,
            segment: Duration::from_millis(500),
            amplitude: 0.5,
            origin: Mutex::new(None),
            current: Mutex::new((
                Segment {
                    index: u64::MAX,
                    frequency: None,
                },
                StdRng::seed_from_u64(seed),
            )),
        }
    }

    fn random_piano_frequency(rng: &mut StdRng) -> Option<f32> {
        if rng.gen_bool(REST_PROBABILITY) {
            None
        } else {
            Some(PIANO_NOTES[rng.gen_range(0..PIANO_NOTES.len())])
        }
    }

    fn frequency_at(&self, segment_index: u64) -> Option<f32> {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let (segment, rng) = &mut *guard;
        if segment.index != segment_index {
            segment.index = segment_index;
            segment.frequency = Self::random_piano_frequency(rng);
            debug!(frequency = ?segment.frequency, "synthetic tone changed");
        }
        segment.frequency
    }

    /// Fills `out` with one block of the tone starting at absolute sample
    /// `first_sample`. The phase is reduced in f64 so long runs stay clean.
    fn fill_tone(&self, first_sample: u64, hz: f32, out: &mut Vec<f32>) {
        let cycles_per_sample = hz as f64 / self.sample_rate as f64;
        out.extend((0..self.block_size as u64).map(|n| {
            let phase = ((first_sample + n) as f64 * cycles_per_sample).fract();
            self.amplitude * (2.0 * PI * phase as f32).sin()
        }));
    }
}

impl BlockSource for SyntheticSource {
    fn start(&self) -> Result<()> {
        *self.origin.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        Ok(())
    }

    fn stop(&self) {
        *self.origin.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    fn latest_block(&self, out: &mut Vec<f32>) -> u64 {
        out.clear();
        let origin = *self.origin.lock().unwrap_or_else(|p| p.into_inner());
        let Some(origin) = origin else {
            out.resize(self.block_size, 0.0);
            return 0;
        };

        let elapsed = origin.elapsed().as_secs_f64();
        let block_secs = self.block_size as f64 / self.sample_rate as f64;
        let generation = (elapsed / block_secs) as u64 + 1;
        let segment_index = (elapsed / self.segment.as_secs_f64()) as u64;

        match self.frequency_at(segment_index) {
            Some(hz) => {
                let first_sample = (generation - 1) * self.block_size as u64;
                self.fill_tone(first_sample, hz, out);
            }
            None => out.resize(self.block_size, 0.0),
        }
        generation
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

pub type SyntheticOracle = AnalysisOracle<SyntheticSource>;

impl SyntheticOracle {
    pub fn synthetic(sample_rate: f32, block_size: usize, seed: u64) -> Self {
        AnalysisOracle::new(SyntheticSource::new(sample_rate, block_size, seed), block_size)
    }
}
