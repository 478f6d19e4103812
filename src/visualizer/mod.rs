//! The visualizer loop: pulls from the oracle at a fixed cadence, keeps the
//! pitch histories and publishes a rendered frame for the UI to paint.

pub mod render;

use crate::dsp::{DspOracle, ProcessingMode};
use crate::history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
use render::{DisplayList, FrameInput, PitchOverlay, Viewport};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Whether the running maximum may shrink again after a loud transient.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerPolicy {
    /// Non-decreasing for the whole run.
    #[default]
    Hold,
    /// Recomputed from each frame alone.
    PerFrame,
}

/// Running maximum magnitude used to scale a trace.
#[derive(Debug, Clone)]
pub struct Normalizer {
    policy: NormalizerPolicy,
    running: f32,
}

impl Normalizer {
    /// Lower bound on the scale so silent input never divides by zero.
    pub const FLOOR: f32 = 1e-6;

    pub fn new(policy: NormalizerPolicy) -> Self {
        Self {
            policy,
            running: 0.0,
        }
    }

    /// Folds in one frame and returns the scale to draw it with.
    pub fn observe(&mut self, values: &[f32]) -> f32 {
        let frame_max = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        self.running = match self.policy {
            NormalizerPolicy::Hold => self.running.max(frame_max),
            NormalizerPolicy::PerFrame => frame_max,
        };
        self.scale()
    }

    pub fn scale(&self) -> f32 {
        self.running.max(Self::FLOOR)
    }

    pub fn reset(&mut self) {
        self.running = 0.0;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisualizerConfig {
    pub frame_period: Duration,
    pub history_capacity: usize,
    pub normalizer: NormalizerPolicy,
    pub pitch_ceiling_hz: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            frame_period: Duration::from_millis(16),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            normalizer: NormalizerPolicy::Hold,
            pitch_ceiling_hz: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub frames_per_second: f32,
}

/// Hand-off between the visualizer thread and the UI thread.
#[derive(Debug, Default)]
pub struct DisplayState {
    viewport: Mutex<Option<Viewport>>,
    frame: Mutex<Arc<DisplayList>>,
    stats: Mutex<FrameStats>,
}

impl DisplayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_viewport(&self, width: f32, height: f32) {
        *self.viewport.lock().unwrap_or_else(|p| p.into_inner()) = Some(Viewport { width, height });
    }

    pub fn viewport(&self) -> Option<Viewport> {
        *self.viewport.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn publish(&self, frame: DisplayList) {
        *self.frame.lock().unwrap_or_else(|p| p.into_inner()) = Arc::new(frame);
    }

    pub fn latest(&self) -> Arc<DisplayList> {
        Arc::clone(&self.frame.lock().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn stats(&self) -> FrameStats {
        *self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_stats(&self, stats: FrameStats) {
        *self.stats.lock().unwrap_or_else(|p| p.into_inner()) = stats;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VisualizerReport {
    pub frames: u64,
}

struct PitchHistories {
    pitch: HistoryBuffer,
    midi_pitch: HistoryBuffer,
    notes: HistoryBuffer,
}

pub struct DspVisualizer {
    oracle: Arc<dyn DspOracle>,
    run_state: Arc<crate::state::SharedRunState>,
    display: Arc<DisplayState>,
    mode: ProcessingMode,
    config: VisualizerConfig,
    histories: PitchHistories,
    normalizers: [Normalizer; 4],
}

impl DspVisualizer {
    pub fn new(
        oracle: Arc<dyn DspOracle>,
        run_state: Arc<crate::state::SharedRunState>,
        display: Arc<DisplayState>,
        mode: ProcessingMode,
        config: VisualizerConfig,
    ) -> Self {
        let capacity = config.history_capacity;
        Self {
            oracle,
            run_state,
            display,
            mode,
            config,
            histories: PitchHistories {
                pitch: HistoryBuffer::new(capacity),
                midi_pitch: HistoryBuffer::new(capacity),
                notes: HistoryBuffer::new(capacity),
            },
            normalizers: std::array::from_fn(|_| Normalizer::new(config.normalizer)),
        }
    }

    pub fn pitch_history(&self) -> Vec<f32> {
        self.histories.pitch.snapshot()
    }

    /// Pulls one reading and renders it. `None` until the viewport size is known.
    pub fn tick(&mut self) -> Option<DisplayList> {
        let features = self.oracle.pull_feature_vector(self.mode);

        let reading = if self.mode == ProcessingMode::PitchEstimate {
            let sample = self.oracle.pull_pitch_sample();
            let note = self.oracle.pull_midi_note();
            self.histories.pitch.append(sample.frequency_hz);
            self.histories.midi_pitch.append(sample.midi_pitch);
            self.histories.notes.append(note as f32);
            Some((sample, note))
        } else {
            None
        };

        let visible = render::visible_range(self.mode, features.len());
        let scale = self.normalizers[self.mode as usize].observe(&features[visible]);

        let view = self.display.viewport()?;
        let input = FrameInput {
            features: &features,
            scale,
            pitch: reading.map(|(sample, midi_note)| PitchOverlay {
                sample,
                midi_note,
                pitch: &self.histories.pitch,
                midi_pitch: &self.histories.midi_pitch,
                notes: &self.histories.notes,
                ceiling_hz: self.config.pitch_ceiling_hz,
            }),
        };
        let mut frame = DisplayList::default();
        render::render(self.mode, view, &input, &mut frame);
        Some(frame)
    }

    /// Renders until `recording_active` clears, then tears the oracle down once.
    pub fn run(mut self) -> VisualizerReport {
        info!(mode = ?self.mode, "visualizer started");
        let mut frames = 0u64;
        while self.run_state.is_recording() {
            let start = Instant::now();
            if let Some(frame) = self.tick() {
                self.display.publish(frame);
                frames += 1;
            }

            let elapsed = start.elapsed();
            if elapsed < self.config.frame_period {
                thread::sleep(self.config.frame_period - elapsed);
            }

            let tick = start.elapsed().as_secs_f32();
            self.display.set_stats(FrameStats {
                frames,
                frames_per_second: if tick > 0.0 { 1.0 / tick } else { 0.0 },
            });
        }
        self.oracle.teardown();
        debug!(frames, "visualizer stopped");
        VisualizerReport { frames }
    }
}
