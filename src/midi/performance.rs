//! The MIDI performance loop: device lifecycle plus the note-event stream.
//!
//! `Closed -> Opening -> WaitingOpen -> Running -> Draining -> Closed`. Every path
//! ends in `Closed` with the port flushed and closed if one was opened.

use super::message::MidiCommand;
use super::transport::{DeviceDescriptor, MidiTransport};
use super::translator::NoteEventTranslator;
use crate::dsp::DspOracle;
use crate::error::Error;
use crate::state::SharedRunState;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use thread_priority::ThreadPriority;
use tracing::{debug, error, info, trace, warn};

/// Output device, channel (0-15) and patch (0-127) chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiSelection {
    pub device: DeviceDescriptor,
    pub channel: u8,
    pub patch: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct PerformanceConfig {
    /// Sleep between Running iterations.
    pub throttle: Duration,
    /// Poll interval while waiting for the device-open callback.
    pub open_poll_interval: Duration,
    /// `None` waits for the device indefinitely.
    pub open_timeout: Option<Duration>,
    pub velocity: u8,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(1),
            open_poll_interval: Duration::from_millis(1),
            open_timeout: Some(Duration::from_secs(5)),
            velocity: super::message::DEFAULT_VELOCITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopPhase {
    Closed,
    Opening,
    WaitingOpen,
    Running,
    Draining,
}

/// Current phase of a performance loop, readable from other threads.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(LoopPhase::Closed as u8))
    }

    fn set(&self, phase: LoopPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    pub fn get(&self) -> LoopPhase {
        match self.0.load(Ordering::Acquire) {
            1 => LoopPhase::Opening,
            2 => LoopPhase::WaitingOpen,
            3 => LoopPhase::Running,
            4 => LoopPhase::Draining,
            _ => LoopPhase::Closed,
        }
    }
}

/// Why a loop ended without reaching Running.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    #[error("stopped before the device opened")]
    Cancelled,

    #[error("timed out after {0:?} waiting for the device to open")]
    TimedOut(Duration),

    #[error("device open failed")]
    DeviceFailed,

    #[error("port open failed: {0}")]
    PortFailed(String),
}

/// What happened during one run of the loop.
#[derive(Debug, Default, Clone)]
pub struct PerformanceReport {
    pub reached_running: bool,
    pub commands_sent: usize,
    pub send_failures: usize,
    pub open_failure: Option<OpenFailure>,
}

/// Nanoseconds on a monotonic clock shared by every loop in the process, so
/// send timestamps from different sessions are comparable.
pub fn monotonic_ns() -> u64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    ANCHOR.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

pub struct MidiPerformanceLoop<T: MidiTransport> {
    transport: Arc<T>,
    oracle: Arc<dyn DspOracle>,
    run_state: Arc<SharedRunState>,
    selection: MidiSelection,
    config: PerformanceConfig,
    /// Id returned by `SharedRunState::arm_device_open` for this loop's open.
    open_attempt: u64,
    phase: Arc<PhaseCell>,
}

impl<T: MidiTransport> MidiPerformanceLoop<T> {
    pub fn new(
        transport: Arc<T>,
        oracle: Arc<dyn DspOracle>,
        run_state: Arc<SharedRunState>,
        selection: MidiSelection,
        config: PerformanceConfig,
        open_attempt: u64,
    ) -> Self {
        Self {
            transport,
            oracle,
            run_state,
            selection,
            config,
            open_attempt,
            phase: Arc::new(PhaseCell::new()),
        }
    }

    pub fn phase(&self) -> Arc<PhaseCell> {
        Arc::clone(&self.phase)
    }

    /// Runs the whole lifecycle on the calling thread. Returns once Closed.
    ///
    /// The supervisor must have set `midi_active` and armed the open attempt
    /// passed to [`MidiPerformanceLoop::new`] before calling this.
    pub fn run(self) -> PerformanceReport {
        let mut report = PerformanceReport::default();
        let channel = self.selection.channel;

        self.phase.set(LoopPhase::Opening);
        info!(device = %self.selection.device, channel = channel + 1, "opening MIDI device");
        let slot: Arc<Mutex<Option<T::Device>>> = Arc::new(Mutex::new(None));
        let callback_slot = Arc::clone(&slot);
        let callback_state = Arc::clone(&self.run_state);
        let attempt = self.open_attempt;
        self.transport.open_device(
            &self.selection.device,
            Box::new(move |device| {
                *callback_slot.lock().unwrap_or_else(|p| p.into_inner()) = device;
                if !callback_state.complete_device_open(attempt) {
                    debug!(attempt, "open callback arrived after its attempt was abandoned");
                }
            }),
        );

        self.phase.set(LoopPhase::WaitingOpen);
        if let Err(cause) = self.await_open() {
            return self.abandon_open(report, cause);
        }

        let device = slot.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(mut device) = device else {
            error!("could not open MIDI device {}", self.selection.device);
            report.open_failure = Some(OpenFailure::DeviceFailed);
            self.phase.set(LoopPhase::Closed);
            return report;
        };

        let mut port = match self.transport.open_port(&mut device, channel) {
            Ok(port) => port,
            Err(e) => {
                error!("could not open port on MIDI device {}: {}", self.selection.device, e);
                report.open_failure = Some(OpenFailure::PortFailed(e.to_string()));
                self.phase.set(LoopPhase::Closed);
                return report;
            }
        };

        self.send(
            &mut port,
            MidiCommand::ProgramChange {
                channel,
                program: self.selection.patch,
            },
            &mut report,
        );

        let mut translator = NoteEventTranslator::new(channel).with_velocity(self.config.velocity);
        self.phase.set(LoopPhase::Running);
        report.reached_running = true;
        if let Err(e) = thread_priority::set_current_thread_priority(ThreadPriority::Max) {
            warn!("could not raise MIDI thread priority: {:?}", e);
        }
        info!("MIDI performance running");

        while self.run_state.is_midi_active() {
            let sample = self.oracle.pull_pitch_sample();
            let note = self.oracle.pull_midi_note();
            for command in translator.translate(&sample, note) {
                self.send(&mut port, command, &mut report);
            }
            thread::sleep(self.config.throttle);
        }

        self.phase.set(LoopPhase::Draining);
        debug!(state = ?translator.state(), "draining notes");
        for command in translator.drain() {
            self.send(&mut port, command, &mut report);
        }

        if let Err(e) = self.transport.flush(&mut port) {
            warn!("MIDI port flush failed: {}", e);
        }
        if let Err(e) = self.transport.close(port) {
            warn!("MIDI port close failed: {}", e);
        }
        drop(device);

        self.phase.set(LoopPhase::Closed);
        info!(
            sent = report.commands_sent,
            failed = report.send_failures,
            "MIDI performance closed"
        );
        report
    }

    /// Gives up on this loop's open attempt so its late callback is ignored.
    fn abandon_open(
        &self,
        mut report: PerformanceReport,
        cause: OpenFailure,
    ) -> PerformanceReport {
        self.run_state.complete_device_open(self.open_attempt);
        report.open_failure = Some(cause);
        self.phase.set(LoopPhase::Closed);
        report
    }

    fn await_open(&self) -> std::result::Result<(), OpenFailure> {
        let started = Instant::now();
        while self.run_state.is_open_attempt_pending(self.open_attempt) {
            if !self.run_state.is_midi_active() {
                info!("MIDI performance stopped before the device opened");
                return Err(OpenFailure::Cancelled);
            }
            if let Some(timeout) = self.config.open_timeout {
                if started.elapsed() >= timeout {
                    error!("{}", Error::OpenTimeout(timeout));
                    return Err(OpenFailure::TimedOut(timeout));
                }
            }
            thread::sleep(self.config.open_poll_interval);
        }
        Ok(())
    }

    fn send(
        &self,
        port: &mut T::Port,
        command: MidiCommand,
        report: &mut PerformanceReport,
    ) {
        let timestamp_ns = monotonic_ns();
        trace!(?command, timestamp_ns, "MIDI send");
        match self.transport.send(port, &command.to_bytes(), timestamp_ns) {
            Ok(()) => report.commands_sent += 1,
            Err(e) => {
                report.send_failures += 1;
                error!("MIDI send failed for {:?}: {}", command, e);
            }
        }
    }
}
