//! Per-mode drawing routines over an abstract [`RenderSurface`].
//!
//! Values map to a vertical offset proportional to `value / scale` and to a
//! horizontal offset proportional to `index * width / len`. Each routine clears
//! the background first, so an empty feature vector draws the background only.

use crate::dsp::{PitchSample, ProcessingMode};
use crate::history::HistoryBuffer;
use std::ops::Range;

/// Fraction of the spectrum shown; the rest is high-frequency detail.
const SPECTRUM_VIEW_DIVISOR: usize = 8;
/// DC and the lowest bin swamp the view.
const SPECTRUM_SKIP_BINS: usize = 2;
/// Share of the height kept free around the autocorrelation trace.
const AUTOCORR_MARGIN: f32 = 0.3;
const NOTE_MARK_SIZE: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Background,
    Green,
    Blue,
    White,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel size of the drawing area, known after the first layout pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

pub trait RenderSurface {
    fn fill_rect(&mut self, min: Point, max: Point, paint: Paint);
    fn line(&mut self, from: Point, to: Point, paint: Paint);
    fn text(&mut self, at: Point, text: &str, paint: Paint);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect { min: Point, max: Point, paint: Paint },
    Line { from: Point, to: Point, paint: Paint },
    Text { at: Point, text: String, paint: Paint },
}

/// A recorded frame, replayed by whatever actually owns the pixels.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    pub commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn lines(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
    }
}

impl RenderSurface for DisplayList {
    fn fill_rect(&mut self, min: Point, max: Point, paint: Paint) {
        self.commands.push(DrawCommand::FillRect { min, max, paint });
    }

    fn line(&mut self, from: Point, to: Point, paint: Paint) {
        self.commands.push(DrawCommand::Line { from, to, paint });
    }

    fn text(&mut self, at: Point, text: &str, paint: Paint) {
        self.commands.push(DrawCommand::Text {
            at,
            text: text.to_owned(),
            paint,
        });
    }
}

/// Histories and the latest reading drawn in pitch-estimate mode.
pub struct PitchOverlay<'a> {
    pub sample: PitchSample,
    pub midi_note: i32,
    pub pitch: &'a HistoryBuffer,
    pub midi_pitch: &'a HistoryBuffer,
    pub notes: &'a HistoryBuffer,
    /// Frequency drawn at the top of the history traces.
    pub ceiling_hz: f32,
}

pub struct FrameInput<'a> {
    pub features: &'a [f32],
    /// Magnitude drawn at full height; never zero.
    pub scale: f32,
    pub pitch: Option<PitchOverlay<'a>>,
}

/// Indices of the feature vector a mode draws, and therefore normalizes over.
pub fn visible_range(mode: ProcessingMode, len: usize) -> Range<usize> {
    match mode {
        ProcessingMode::RawAudio => 0..len,
        ProcessingMode::MagnitudeSpectrum => {
            let end = len / SPECTRUM_VIEW_DIVISOR;
            SPECTRUM_SKIP_BINS.min(end)..end
        }
        ProcessingMode::AutoCorrelation | ProcessingMode::PitchEstimate => 0..len / 2,
    }
}

pub fn render(
    mode: ProcessingMode,
    view: Viewport,
    input: &FrameInput<'_>,
    surface: &mut impl RenderSurface,
) {
    surface.fill_rect(
        Point::new(0.0, 0.0),
        Point::new(view.width, view.height),
        Paint::Background,
    );
    match mode {
        ProcessingMode::RawAudio => draw_raw_audio(view, input, surface),
        ProcessingMode::MagnitudeSpectrum => draw_magnitude_spectrum(view, input, surface),
        ProcessingMode::AutoCorrelation => draw_autocorrelation(view, input, surface),
        ProcessingMode::PitchEstimate => draw_pitch(view, input, surface),
    }
}

fn polyline(surface: &mut impl RenderSurface, points: impl Iterator<Item = Point>, paint: Paint) {
    let mut last: Option<Point> = None;
    for point in points {
        if let Some(from) = last {
            surface.line(from, point, paint);
        }
        last = Some(point);
    }
}

fn draw_raw_audio(view: Viewport, input: &FrameInput<'_>, surface: &mut impl RenderSurface) {
    let len = input.features.len();
    let stride = view.width / len.max(1) as f32;
    let half = view.height / 2.0;
    let points = input
        .features
        .iter()
        .enumerate()
        .map(|(i, v)| Point::new(stride * i as f32, half - (v / input.scale) * half));
    polyline(surface, points, Paint::Green);
}

fn draw_magnitude_spectrum(
    view: Viewport,
    input: &FrameInput<'_>,
    surface: &mut impl RenderSurface,
) {
    let range = visible_range(ProcessingMode::MagnitudeSpectrum, input.features.len());
    let stride = view.width / range.end.max(1) as f32;
    let points = range.map(|i| {
        let v = input.features[i];
        Point::new(stride * i as f32, view.height - (v / input.scale) * view.height)
    });
    polyline(surface, points, Paint::Green);
}

fn draw_autocorrelation(view: Viewport, input: &FrameInput<'_>, surface: &mut impl RenderSurface) {
    let range = visible_range(ProcessingMode::AutoCorrelation, input.features.len());
    let stride = view.width / range.end.max(1) as f32;
    let margin = view.height * AUTOCORR_MARGIN;
    let span = view.height - margin / 2.0;
    let points = range.map(|i| {
        let v = input.features[i];
        Point::new(
            stride * i as f32,
            view.height - ((v / input.scale) * span + margin / 2.0),
        )
    });
    polyline(surface, points, Paint::Green);
}

fn draw_pitch(view: Viewport, input: &FrameInput<'_>, surface: &mut impl RenderSurface) {
    let range = visible_range(ProcessingMode::PitchEstimate, input.features.len());
    let stride = view.width / range.end.max(1) as f32;
    let half = view.height / 2.0;
    let points = range.map(|i| {
        let v = input.features[i];
        Point::new(stride * i as f32, (v / input.scale) * half + half)
    });
    polyline(surface, points, Paint::Blue);

    let Some(overlay) = &input.pitch else {
        return;
    };

    surface.text(
        Point::new(view.width / 2.0, view.height / 8.0),
        &format!("{:.1} Hz", overlay.sample.frequency_hz),
        Paint::White,
    );
    surface.text(
        Point::new(view.width / 2.0, view.height / 4.0),
        &format!("{:.1} ({})", overlay.sample.midi_pitch, overlay.midi_note),
        Paint::White,
    );

    let ceiling = overlay.ceiling_hz.max(f32::EPSILON);
    let history_stride = view.width / overlay.pitch.capacity() as f32;
    let trace = |history: &HistoryBuffer| {
        history
            .iter()
            .enumerate()
            .map(move |(i, hz)| {
                Point::new(
                    history_stride * i as f32,
                    view.height - (hz / ceiling) * view.height,
                )
            })
            .collect::<Vec<_>>()
    };
    polyline(surface, trace(overlay.pitch).into_iter(), Paint::Green);
    polyline(surface, trace(overlay.midi_pitch).into_iter(), Paint::White);

    let note_stride = view.width / overlay.notes.capacity() as f32;
    for (i, note) in overlay.notes.iter().enumerate() {
        if note <= 0.0 {
            continue;
        }
        let x = note_stride * i as f32;
        let y = view.height - (note / 127.0) * view.height;
        surface.fill_rect(
            Point::new(x, y - NOTE_MARK_SIZE / 2.0),
            Point::new(x + NOTE_MARK_SIZE, y + NOTE_MARK_SIZE / 2.0),
            Paint::Blue,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: Viewport = Viewport {
        width: 400.0,
        height: 200.0,
    };

    fn frame(features: &[f32]) -> FrameInput<'_> {
        FrameInput {
            features,
            scale: 1.0,
            pitch: None,
        }
    }

    #[test]
    fn empty_features_draw_background_only() {
        for mode in ProcessingMode::ALL {
            let mut list = DisplayList::default();
            render(mode, VIEW, &frame(&[]), &mut list);
            assert_eq!(list.commands.len(), 1, "{mode:?}");
            assert!(matches!(
                list.commands[0],
                DrawCommand::FillRect {
                    paint: Paint::Background,
                    ..
                }
            ));
        }
    }

    #[test]
    fn raw_audio_draws_one_segment_per_sample_gap() {
        let mut list = DisplayList::default();
        render(ProcessingMode::RawAudio, VIEW, &frame(&[0.0, 1.0, -1.0, 0.5]), &mut list);
        let lines: Vec<_> = list.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            &DrawCommand::Line {
                from: Point::new(0.0, 100.0),
                to: Point::new(100.0, 0.0),
                paint: Paint::Green
            }
        );
    }

    #[test]
    fn spectrum_skips_low_bins_and_shows_an_eighth() {
        assert_eq!(visible_range(ProcessingMode::MagnitudeSpectrum, 512), 2..64);
        assert_eq!(visible_range(ProcessingMode::MagnitudeSpectrum, 8), 1..1);
        assert_eq!(visible_range(ProcessingMode::AutoCorrelation, 2048), 0..1024);
    }

    #[test]
    fn pitch_view_draws_text_and_histories() {
        let mut pitch = HistoryBuffer::new(4);
        let mut midi_pitch = HistoryBuffer::new(4);
        let mut notes = HistoryBuffer::new(4);
        for (hz, tuned, note) in [(220.0, 220.0, 57.0), (0.0, 0.0, 0.0), (441.0, 440.0, 69.0)] {
            pitch.append(hz);
            midi_pitch.append(tuned);
            notes.append(note);
        }
        let features = [0.5; 8];
        let input = FrameInput {
            features: &features,
            scale: 1.0,
            pitch: Some(PitchOverlay {
                sample: PitchSample {
                    frequency_hz: 441.0,
                    midi_pitch: 440.0,
                    midi_note: 69,
                    ..PitchSample::silent()
                },
                midi_note: 69,
                pitch: &pitch,
                midi_pitch: &midi_pitch,
                notes: &notes,
                ceiling_hz: 1500.0,
            }),
        };
        let mut list = DisplayList::default();
        render(ProcessingMode::PitchEstimate, VIEW, &input, &mut list);

        let texts: Vec<_> = list
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["441.0 Hz", "440.0 (69)"]);
        // 3 feature segments + 2 segments per 3-sample history trace.
        assert_eq!(list.lines().count(), 3 + 2 + 2);
        // Background plus one mark per non-zero note.
        let rects = list
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillRect { .. }))
            .count();
        assert_eq!(rects, 3);
    }
}
