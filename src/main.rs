use clap::Parser;
use pitch_to_midi::config::{Cli, SourceKind};
use pitch_to_midi::dsp::capture::CaptureOracle;
use pitch_to_midi::dsp::synthetic::SyntheticOracle;
use pitch_to_midi::dsp::DspOracle;
use pitch_to_midi::midi::{MidiSelection, MidiTransport, MidirTransport};
use pitch_to_midi::supervisor::{PerformanceSupervisor, StartRequest};
use pitch_to_midi::{ui, Error};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SYNTHETIC_SAMPLE_RATE: f32 = 44_100.0;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> pitch_to_midi::Result<()> {
    let settings = cli.settings()?;
    let transport = Arc::new(MidirTransport::default());

    let devices = transport.enumerate_output_devices().unwrap_or_else(|e| {
        warn!("Could not list MIDI output devices: {}", e);
        Vec::new()
    });
    if cli.list_devices {
        if devices.is_empty() {
            println!("No MIDI output devices found");
        }
        for device in &devices {
            println!("{device}");
        }
        return Ok(());
    }

    let midi = match cli.device {
        Some(number) => {
            let device = number
                .checked_sub(1)
                .and_then(|index| devices.get(index))
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(format!("no MIDI output device {number}")))?;
            info!("Using MIDI output: {}", device);
            Some(MidiSelection {
                device,
                channel: cli.channel_index(),
                patch: cli.patch_index(),
            })
        }
        None => None,
    };
    let request = StartRequest {
        mode: cli.mode,
        midi,
    };

    let oracle: Arc<dyn DspOracle> = match cli.source {
        SourceKind::Capture => Arc::new(CaptureOracle::capture(settings.block_size)),
        SourceKind::Synthetic => Arc::new(SyntheticOracle::synthetic(
            SYNTHETIC_SAMPLE_RATE,
            settings.block_size,
            rand::random(),
        )),
    };
    let mut supervisor =
        PerformanceSupervisor::new(oracle, transport, settings.supervisor_config());

    if !cli.headless {
        return ui::run_ui(supervisor, request).map_err(|e| Error::Ui(e.to_string()));
    }

    // Headless: no window to lay out, so draw into a fixed-size frame.
    supervisor.display().set_viewport(800.0, 400.0);
    supervisor.start(request)?;
    info!("Running headless, press Ctrl-C to stop");

    let duration = cli.duration.map(Duration::from_secs);
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        } => info!("Duration elapsed"),
    }

    // Stopping joins the loop threads; keep that off the async workers.
    let report = tokio::task::spawn_blocking(move || supervisor.stop())
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    info!(?report, "Stopped");
    Ok(())
}
