use super::oracle::{AnalysisOracle, BlockSource};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Samples written by the input stream callback, read by the oracle.
struct CaptureShared {
    window: Mutex<VecDeque<f32>>,
    /// Incremented once per `block_size` captured samples.
    generation: AtomicU64,
    pending: AtomicU64,
    sample_rate: AtomicU32,
}

struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Live microphone input from the default cpal host.
pub struct CaptureSource {
    block_size: usize,
    shared: Arc<CaptureShared>,
    worker: Mutex<Option<CaptureWorker>>,
}

impl CaptureSource {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            shared: Arc::new(CaptureShared {
                window: Mutex::new(VecDeque::with_capacity(block_size)),
                generation: AtomicU64::new(0),
                pending: AtomicU64::new(0),
                sample_rate: AtomicU32::new(44_100.0f32.to_bits()),
            }),
            worker: Mutex::new(None),
        }
    }
}

impl BlockSource for CaptureSource {
    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        if worker.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let thread_stop = Arc::clone(&stop);
        let block_size = self.block_size;

        // cpal streams are not Send on every platform, so the stream lives and
        // dies on its own thread.
        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(shared, block_size) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                while !thread_stop.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(10));
                }
                drop(stream);
                info!("audio capture stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(CaptureWorker { stop, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Audio("capture thread exited during startup".into()))
            }
        }
    }

    fn stop(&self) {
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Release);
            if worker.handle.join().is_err() {
                warn!("audio capture thread panicked");
            }
        }
        let mut window = self.shared.window.lock().unwrap_or_else(|p| p.into_inner());
        window.clear();
    }

    fn latest_block(&self, out: &mut Vec<f32>) -> u64 {
        out.clear();
        let window = self.shared.window.lock().unwrap_or_else(|p| p.into_inner());
        out.extend(window.iter().copied());
        out.resize(self.block_size, 0.0);
        self.shared.generation.load(Ordering::Acquire)
    }

    fn sample_rate(&self) -> f32 {
        f32::from_bits(self.shared.sample_rate.load(Ordering::Relaxed))
    }
}

fn open_input_stream(shared: Arc<CaptureShared>, block_size: usize) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device found".into()))?;
    info!(
        "Default input device found: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported_config = device.default_input_config()?;
    let sample_format = supported_config.sample_format();
    let config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    shared
        .sample_rate
        .store((config.sample_rate.0 as f32).to_bits(), Ordering::Relaxed);
    info!("Audio input configuration: {:?} {:?}", config, sample_format);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, shared, block_size)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, shared, block_size)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, shared, block_size)?,
        other => {
            return Err(Error::Audio(format!("unsupported sample format {other:?}")));
        }
    };
    stream.play()?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    shared: Arc<CaptureShared>,
    block_size: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mut window = shared.window.lock().unwrap_or_else(|p| p.into_inner());
            let mut captured = 0u64;
            // First channel only.
            for frame in data.chunks(channels) {
                if window.len() == block_size {
                    window.pop_front();
                }
                window.push_back(frame[0].to_sample::<f32>());
                captured += 1;
            }
            let pending = shared.pending.fetch_add(captured, Ordering::Relaxed) + captured;
            if pending >= block_size as u64 {
                shared.pending.store(pending % block_size as u64, Ordering::Relaxed);
                shared.generation.fetch_add(1, Ordering::Release);
            }
        },
        |err| {
            error!("An error occurred on the audio input stream: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

pub type CaptureOracle = AnalysisOracle<CaptureSource>;

impl CaptureOracle {
    pub fn capture(block_size: usize) -> Self {
        AnalysisOracle::new(CaptureSource::new(block_size), block_size)
    }
}
