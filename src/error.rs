//! Error types for the performance engine.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device error: {0}")]
    Audio(String),

    #[error("MIDI device error: {0}")]
    MidiDevice(String),

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("MIDI send failed: {0}")]
    MidiSend(String),

    #[error("timed out after {0:?} waiting for the MIDI device to open")]
    OpenTimeout(Duration),

    #[error("UI error: {0}")]
    Ui(String),

    #[error("a performance is already running")]
    AlreadyRunning,
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::MidiPort(e.to_string())
    }
}

impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::MidiSend(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        Error::Audio(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(e: cpal::BuildStreamError) -> Self {
        let message = e.to_string();
        // Platforms report a refused microphone as a backend-specific failure.
        if message.to_lowercase().contains("permission") {
            Error::PermissionDenied(message)
        } else {
            Error::Audio(message)
        }
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(e: cpal::PlayStreamError) -> Self {
        Error::Audio(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
