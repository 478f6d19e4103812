pub mod message;
pub mod performance;
pub mod translator;
pub mod transport;

pub use message::MidiCommand;
pub use performance::{
    monotonic_ns, LoopPhase, MidiPerformanceLoop, MidiSelection, OpenFailure, PerformanceConfig,
    PerformanceReport, PhaseCell,
};
pub use translator::{NoteEventTranslator, NoteState};
pub use transport::{DeviceDescriptor, MidiTransport, MidirTransport, OnOpened};
