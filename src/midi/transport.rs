//! MIDI output transport: device enumeration, asynchronous device open and
//! port I/O. The performance loop only talks to a [`MidiTransport`].

use crate::error::{Error, Result};
use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use std::fmt;
use std::thread;
use tracing::{error, info};

/// One output device as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.index + 1, self.name)
    }
}

/// Invoked once per open attempt, on a thread of the transport's choosing.
/// `None` means the device could not be opened.
pub type OnOpened<D> = Box<dyn FnOnce(Option<D>) + Send + 'static>;

pub trait MidiTransport: Send + Sync + 'static {
    type Device: Send + 'static;
    type Port: Send + 'static;

    fn enumerate_output_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Starts opening `descriptor`; completion is reported through `on_opened`.
    fn open_device(&self, descriptor: &DeviceDescriptor, on_opened: OnOpened<Self::Device>);

    fn open_port(&self, device: &mut Self::Device, channel: u8) -> Result<Self::Port>;

    /// Sends `bytes` immediately. `timestamp_ns` is a monotonic send time.
    fn send(&self, port: &mut Self::Port, bytes: &[u8], timestamp_ns: u64) -> Result<()>;

    fn flush(&self, port: &mut Self::Port) -> Result<()>;

    fn close(&self, port: Self::Port) -> Result<()>;
}

/// A resolved midir output port waiting to be connected.
pub struct MidirDevice {
    output: Option<MidiOutput>,
    port: MidiOutputPort,
    name: String,
}

/// [`MidiTransport`] over the platform MIDI API via `midir`.
#[derive(Debug, Clone)]
pub struct MidirTransport {
    client_name: String,
}

impl MidirTransport {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn resolve(client_name: &str, descriptor: &DeviceDescriptor) -> Result<MidirDevice> {
        let output = MidiOutput::new(client_name)?;
        let ports = output.ports();
        let port = ports
            .get(descriptor.index)
            .cloned()
            .ok_or_else(|| Error::MidiDevice(format!("no output device at {}", descriptor)))?;
        let name = output.port_name(&port)?;
        if name != descriptor.name {
            return Err(Error::MidiDevice(format!(
                "device list changed: expected '{}', found '{}'",
                descriptor.name, name
            )));
        }
        Ok(MidirDevice {
            output: Some(output),
            port,
            name,
        })
    }
}

impl Default for MidirTransport {
    fn default() -> Self {
        Self::new("pitch-to-midi")
    }
}

impl MidiTransport for MidirTransport {
    type Device = MidirDevice;
    type Port = MidiOutputConnection;

    fn enumerate_output_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let output = MidiOutput::new(&format!("{} scanner", self.client_name))?;
        output
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| -> Result<DeviceDescriptor> {
                Ok(DeviceDescriptor {
                    index,
                    name: output.port_name(port)?,
                })
            })
            .collect()
    }

    fn open_device(&self, descriptor: &DeviceDescriptor, on_opened: OnOpened<MidirDevice>) {
        let client_name = self.client_name.clone();
        let descriptor = descriptor.clone();
        // Resolving ports can be slow on some backends; keep it off the caller's thread.
        let spawned = thread::Builder::new()
            .name("midi-open".into())
            .spawn(move || match Self::resolve(&client_name, &descriptor) {
                Ok(device) => {
                    info!("MIDI device opened: {}", device.name);
                    on_opened(Some(device));
                }
                Err(e) => {
                    error!("Could not open MIDI device {}: {}", descriptor, e);
                    on_opened(None);
                }
            });
        if let Err(e) = spawned {
            error!("Failed to spawn MIDI open thread: {}", e);
        }
    }

    fn open_port(&self, device: &mut MidirDevice, channel: u8) -> Result<MidiOutputConnection> {
        let output = device
            .output
            .take()
            .ok_or_else(|| Error::MidiPort(format!("port on '{}' already opened", device.name)))?;
        let port_name = format!("{} ch{}", self.client_name, channel + 1);
        let connection = output.connect(&device.port, &port_name)?;
        Ok(connection)
    }

    fn send(&self, port: &mut MidiOutputConnection, bytes: &[u8], _timestamp_ns: u64) -> Result<()> {
        port.send(bytes)?;
        Ok(())
    }

    fn flush(&self, _port: &mut MidiOutputConnection) -> Result<()> {
        // midir writes through on every send.
        Ok(())
    }

    fn close(&self, port: MidiOutputConnection) -> Result<()> {
        drop(port.close());
        Ok(())
    }
}
