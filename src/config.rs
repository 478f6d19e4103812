//! Engine settings (TOML file) and command-line options.

use crate::dsp::ProcessingMode;
use crate::error::{Error, Result};
use crate::midi::PerformanceConfig;
use crate::supervisor::SupervisorConfig;
use crate::visualizer::{NormalizerPolicy, VisualizerConfig};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub frame_period_ms: u64,
    pub midi_throttle_ms: u64,
    pub open_poll_ms: u64,
    /// 0 waits for the device indefinitely.
    pub open_timeout_ms: u64,
    pub readout_period_ms: u64,
    pub history_capacity: usize,
    pub velocity: u8,
    pub normalizer: NormalizerPolicy,
    pub pitch_ceiling_hz: f32,
    pub block_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_period_ms: 16,
            midi_throttle_ms: 1,
            open_poll_ms: 1,
            open_timeout_ms: 5000,
            readout_period_ms: 16,
            history_capacity: 75,
            velocity: 100,
            normalizer: NormalizerPolicy::Hold,
            pitch_ceiling_hz: 1500.0,
            block_size: 1024,
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(Error::InvalidConfig(message.to_string()));
        if self.frame_period_ms == 0 || self.readout_period_ms == 0 {
            return invalid("loop periods must be at least 1 ms");
        }
        if self.midi_throttle_ms == 0 || self.open_poll_ms == 0 {
            return invalid("MIDI throttle and open poll interval must be at least 1 ms");
        }
        if self.history_capacity == 0 {
            return invalid("history_capacity must be non-zero");
        }
        if self.velocity > 127 {
            return invalid("velocity must be 0-127");
        }
        if self.block_size < 64 {
            return invalid("block_size must be at least 64 samples");
        }
        if self.pitch_ceiling_hz <= 0.0 {
            return invalid("pitch_ceiling_hz must be positive");
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            visualizer: VisualizerConfig {
                frame_period: Duration::from_millis(self.frame_period_ms),
                history_capacity: self.history_capacity,
                normalizer: self.normalizer,
                pitch_ceiling_hz: self.pitch_ceiling_hz,
            },
            performance: PerformanceConfig {
                throttle: Duration::from_millis(self.midi_throttle_ms),
                open_poll_interval: Duration::from_millis(self.open_poll_ms),
                open_timeout: (self.open_timeout_ms > 0)
                    .then(|| Duration::from_millis(self.open_timeout_ms)),
                velocity: self.velocity,
            },
            readout_period: Duration::from_millis(self.readout_period_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SourceKind {
    /// Default microphone.
    #[default]
    Capture,
    /// Generated tone, no audio device needed.
    Synthetic,
}

/// Real-time pitch-to-MIDI performance engine
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ProcessingMode::PitchEstimate)]
    pub mode: ProcessingMode,

    /// MIDI output device number as shown by --list-devices
    #[arg(long)]
    pub device: Option<usize>,

    /// MIDI channel
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub channel: u8,

    /// Program (patch) number
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=128))]
    pub patch: u8,

    #[arg(long, value_enum, default_value_t = SourceKind::Capture)]
    pub source: SourceKind,

    /// Run without a window until Ctrl-C or --duration
    #[arg(long)]
    pub headless: bool,

    /// Stop a headless run after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print MIDI output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    #[arg(long)]
    pub throttle_ms: Option<u64>,

    #[arg(long)]
    pub frame_ms: Option<u64>,

    /// 0 waits for the device indefinitely
    #[arg(long)]
    pub open_timeout_ms: Option<u64>,
}

impl Cli {
    /// Loads the settings file and applies command-line overrides on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(ms) = self.throttle_ms {
            settings.midi_throttle_ms = ms;
        }
        if let Some(ms) = self.frame_ms {
            settings.frame_period_ms = ms;
        }
        if let Some(ms) = self.open_timeout_ms {
            settings.open_timeout_ms = ms;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Zero-based channel.
    pub fn channel_index(&self) -> u8 {
        self.channel - 1
    }

    /// Zero-based program number.
    pub fn patch_index(&self) -> u8 {
        self.patch - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_fields() {
        let settings: Settings = toml::from_str(
            r#"
            history_capacity = 120
            normalizer = "per_frame"
            open_timeout_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(settings.history_capacity, 120);
        assert_eq!(settings.normalizer, NormalizerPolicy::PerFrame);
        let config = settings.supervisor_config();
        assert_eq!(config.performance.open_timeout, None);
        assert_eq!(config.visualizer.frame_period, Duration::from_millis(16));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let settings = Settings {
            history_capacity: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));

        let settings = Settings {
            velocity: 200,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn cli_channel_and_patch_are_one_based() {
        let cli = Cli::parse_from([
            "pitch-to-midi",
            "--channel",
            "10",
            "--patch",
            "128",
            "--mode",
            "auto-correlation",
        ]);
        assert_eq!(cli.channel_index(), 9);
        assert_eq!(cli.patch_index(), 127);
        assert_eq!(cli.mode, ProcessingMode::AutoCorrelation);
        assert!(Cli::try_parse_from(["pitch-to-midi", "--channel", "17"]).is_err());
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from(["pitch-to-midi", "--throttle-ms", "4", "--frame-ms", "33"]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.midi_throttle_ms, 4);
        assert_eq!(settings.frame_period_ms, 33);
    }
}
