//! Starts and stops the visualizer, readout and MIDI performance loops together.

use crate::dsp::{DspOracle, ProcessingMode};
use crate::error::{Error, Result};
use crate::midi::{
    DeviceDescriptor, LoopPhase, MidiPerformanceLoop, MidiSelection, MidiTransport,
    PerformanceConfig, PerformanceReport, PhaseCell,
};
use crate::readout::run_readout;
use crate::state::{PitchReadout, SharedRunState};
use crate::visualizer::{DisplayState, DspVisualizer, VisualizerConfig, VisualizerReport};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub visualizer: VisualizerConfig,
    pub performance: PerformanceConfig,
    pub readout_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            visualizer: VisualizerConfig::default(),
            performance: PerformanceConfig::default(),
            readout_period: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub mode: ProcessingMode,
    /// MIDI output only runs in pitch-estimate mode.
    pub midi: Option<MidiSelection>,
}

/// Outcome of a stopped session.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub visualizer: Option<VisualizerReport>,
    pub midi: Option<PerformanceReport>,
}

struct MidiSession {
    handle: JoinHandle<PerformanceReport>,
    phase: Arc<PhaseCell>,
}

#[derive(Default)]
struct Session {
    visualizer: Option<JoinHandle<VisualizerReport>>,
    midi: Option<MidiSession>,
    readout: Option<JoinHandle<()>>,
}

pub struct PerformanceSupervisor<T: MidiTransport> {
    oracle: Arc<dyn DspOracle>,
    transport: Arc<T>,
    run_state: Arc<SharedRunState>,
    display: Arc<DisplayState>,
    readout: Arc<PitchReadout>,
    config: SupervisorConfig,
    session: Option<Session>,
}

impl<T: MidiTransport> PerformanceSupervisor<T> {
    pub fn new(oracle: Arc<dyn DspOracle>, transport: Arc<T>, config: SupervisorConfig) -> Self {
        Self {
            oracle,
            transport,
            run_state: SharedRunState::new(),
            display: DisplayState::new(),
            readout: Arc::new(PitchReadout::default()),
            config,
            session: None,
        }
    }

    pub fn run_state(&self) -> &Arc<SharedRunState> {
        &self.run_state
    }

    pub fn display(&self) -> &Arc<DisplayState> {
        &self.display
    }

    pub fn readout(&self) -> &Arc<PitchReadout> {
        &self.readout
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Phase of the MIDI loop of the current session, if one was started.
    pub fn midi_phase(&self) -> Option<LoopPhase> {
        self.session
            .as_ref()
            .and_then(|s| s.midi.as_ref())
            .map(|m| m.phase.get())
    }

    pub fn output_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.transport.enumerate_output_devices()
    }

    /// Starts a session. Fails without side effects if one is already running or
    /// the oracle cannot start (for example when recording permission is refused).
    pub fn start(&mut self, request: StartRequest) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.oracle.set_processing_mode(request.mode);
        self.oracle.init()?;
        self.run_state.set_recording(true);
        info!(mode = ?request.mode, midi = request.midi.is_some(), "starting performance");

        let mut session = Session::default();
        let visualizer = DspVisualizer::new(
            Arc::clone(&self.oracle),
            Arc::clone(&self.run_state),
            Arc::clone(&self.display),
            request.mode,
            self.config.visualizer,
        );
        match thread::Builder::new()
            .name("dsp-visualizer".into())
            .spawn(move || visualizer.run())
        {
            Ok(handle) => session.visualizer = Some(handle),
            Err(e) => {
                self.run_state.set_recording(false);
                self.oracle.teardown();
                return Err(e.into());
            }
        }

        match request.midi {
            Some(selection) if request.mode == ProcessingMode::PitchEstimate => {
                if let Err(e) = self.spawn_midi(&mut session, selection) {
                    self.shutdown(session);
                    return Err(e);
                }
            }
            Some(_) => info!("MIDI output only runs in pitch-estimate mode"),
            None => {}
        }

        let oracle = Arc::clone(&self.oracle);
        let run_state = Arc::clone(&self.run_state);
        let readout = Arc::clone(&self.readout);
        let period = self.config.readout_period;
        match thread::Builder::new()
            .name("pitch-readout".into())
            .spawn(move || run_readout(oracle, run_state, readout, period))
        {
            Ok(handle) => session.readout = Some(handle),
            Err(e) => {
                self.shutdown(session);
                return Err(e.into());
            }
        }

        self.session = Some(session);
        Ok(())
    }

    fn spawn_midi(&self, session: &mut Session, selection: MidiSelection) -> Result<()> {
        self.run_state.set_midi_active(true);
        let attempt = self.run_state.arm_device_open();
        let performance = MidiPerformanceLoop::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.oracle),
            Arc::clone(&self.run_state),
            selection,
            self.config.performance,
            attempt,
        );
        let phase = performance.phase();
        match thread::Builder::new()
            .name("midi-performance".into())
            .spawn(move || performance.run())
        {
            Ok(handle) => {
                session.midi = Some(MidiSession { handle, phase });
                Ok(())
            }
            Err(e) => {
                self.run_state.set_midi_active(false);
                self.run_state.complete_device_open(attempt);
                Err(e.into())
            }
        }
    }

    /// Stops the running session and waits for every loop thread to exit, so
    /// the MIDI port is closed before this returns.
    pub fn stop(&mut self) -> Option<SessionReport> {
        let session = self.session.take()?;
        Some(self.shutdown(session))
    }

    fn shutdown(&self, session: Session) -> SessionReport {
        let mut report = SessionReport::default();
        self.run_state.set_recording(false);

        if let Some(midi) = session.midi {
            self.run_state.set_midi_active(false);
            match midi.handle.join() {
                Ok(midi_report) => report.midi = Some(midi_report),
                Err(_) => error!("MIDI performance thread panicked"),
            }
        }
        if let Some(handle) = session.visualizer {
            match handle.join() {
                Ok(visualizer_report) => report.visualizer = Some(visualizer_report),
                Err(_) => error!("visualizer thread panicked"),
            }
        }
        if let Some(handle) = session.readout {
            if handle.join().is_err() {
                error!("readout thread panicked");
            }
        }

        info!("performance stopped");
        report
    }
}

impl<T: MidiTransport> Drop for PerformanceSupervisor<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
