//! Real-time pitch-to-MIDI performance engine.
//!
//! A [`supervisor::PerformanceSupervisor`] runs three polling loops over a shared
//! [`dsp::DspOracle`]: the visualizer, which keeps scrolling pitch histories and
//! renders one frame per tick; the pitch readout for the UI; and, in
//! pitch-estimate mode with an output device selected, the MIDI performance
//! loop that turns the pitch stream into note-on/note-off messages.

pub mod config;
pub mod dsp;
pub mod error;
pub mod history;
pub mod midi;
pub mod readout;
pub mod state;
pub mod supervisor;
pub mod ui;
pub mod visualizer;

pub use error::{Error, Result};
