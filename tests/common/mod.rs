#![allow(dead_code)]

use pitch_to_midi::dsp::{DspOracle, PitchSample, ProcessingMode};
use pitch_to_midi::midi::{DeviceDescriptor, MidiCommand, MidiTransport, OnOpened};
use pitch_to_midi::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// How the stub answers `open_device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Immediate,
    Delayed(Duration),
    /// The callback is never invoked.
    Never,
    /// The callback reports failure.
    Fail,
}

pub struct StubDevice;

pub struct StubPort;

/// Records everything the performance loop does to the device.
pub struct StubTransport {
    pub devices: Vec<DeviceDescriptor>,
    pub open_behavior: OpenBehavior,
    pub port_fails: bool,
    pub send_fails: bool,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub timestamps: Mutex<Vec<u64>>,
    pub device_opens: AtomicUsize,
    pub port_opens: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl StubTransport {
    pub fn new(open_behavior: OpenBehavior) -> Self {
        Self {
            devices: vec![DeviceDescriptor {
                index: 0,
                name: "Stub Synth".into(),
            }],
            open_behavior,
            port_fails: false,
            send_fails: false,
            sent: Mutex::new(Vec::new()),
            timestamps: Mutex::new(Vec::new()),
            device_opens: AtomicUsize::new(0),
            port_opens: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn commands(&self) -> Vec<MidiCommand> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| MidiCommand::parse(bytes).expect("stub received malformed message"))
            .collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl MidiTransport for StubTransport {
    type Device = StubDevice;
    type Port = StubPort;

    fn enumerate_output_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.devices.clone())
    }

    fn open_device(&self, _descriptor: &DeviceDescriptor, on_opened: OnOpened<StubDevice>) {
        self.device_opens.fetch_add(1, Ordering::SeqCst);
        match self.open_behavior {
            OpenBehavior::Immediate => {
                thread::spawn(move || on_opened(Some(StubDevice)));
            }
            OpenBehavior::Delayed(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    on_opened(Some(StubDevice));
                });
            }
            OpenBehavior::Never => drop(on_opened),
            OpenBehavior::Fail => {
                thread::spawn(move || on_opened(None));
            }
        }
    }

    fn open_port(&self, _device: &mut StubDevice, _channel: u8) -> Result<StubPort> {
        if self.port_fails {
            return Err(Error::MidiPort("stub port refused".into()));
        }
        self.port_opens.fetch_add(1, Ordering::SeqCst);
        Ok(StubPort)
    }

    fn send(&self, _port: &mut StubPort, bytes: &[u8], timestamp_ns: u64) -> Result<()> {
        if self.send_fails {
            return Err(Error::MidiSend("stub send refused".into()));
        }
        self.sent.lock().unwrap().push(bytes.to_vec());
        self.timestamps.lock().unwrap().push(timestamp_ns);
        Ok(())
    }

    fn flush(&self, _port: &mut StubPort) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self, _port: StubPort) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Plays back a fixed list of `(frequency, note)` readings, then holds the last.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<(f32, i32)>>,
    current: Mutex<(f32, i32)>,
    pub deny_permission: AtomicBool,
    pub inits: AtomicUsize,
    pub teardowns: AtomicUsize,
    pub mode: Mutex<Option<ProcessingMode>>,
}

impl ScriptedOracle {
    pub fn new(script: &[(f32, i32)]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            current: Mutex::new((0.0, 0)),
            deny_permission: AtomicBool::new(false),
            inits: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            mode: Mutex::new(None),
        }
    }

    pub fn steady(hz: f32, note: i32) -> Self {
        Self::new(&[(hz, note)])
    }
}

impl DspOracle for ScriptedOracle {
    fn init(&self) -> Result<()> {
        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(Error::PermissionDenied("record audio".into()));
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn set_processing_mode(&self, mode: ProcessingMode) {
        *self.mode.lock().unwrap() = Some(mode);
    }

    fn pull_feature_vector(&self, _mode: ProcessingMode) -> Vec<f32> {
        vec![0.0, 0.5, -0.5, 0.25]
    }

    fn pull_pitch_sample(&self) -> PitchSample {
        let mut current = self.current.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *current = next;
        }
        PitchSample {
            frequency_hz: current.0,
            midi_pitch: current.0,
            midi_note: current.1,
            timestamp: Instant::now(),
        }
    }

    fn pull_midi_note(&self) -> i32 {
        self.current.lock().unwrap().1
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub fn note_on(note: u8) -> MidiCommand {
    MidiCommand::NoteOn {
        channel: 0,
        note,
        velocity: 100,
    }
}

pub fn note_off(note: u8) -> MidiCommand {
    MidiCommand::NoteOff {
        channel: 0,
        note,
        velocity: 100,
    }
}
