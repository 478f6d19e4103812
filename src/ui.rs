use crate::dsp::ProcessingMode;
use crate::midi::{DeviceDescriptor, MidiSelection, MidiTransport};
use crate::supervisor::{PerformanceSupervisor, StartRequest};
use crate::visualizer::render::{DrawCommand, Paint, Point};
use eframe::{App, CreationContext};
use egui::{
    Align2, CentralPanel, Color32, ComboBox, Context, FontId, Pos2, Rect, Sense, Stroke,
    TopBottomPanel,
};
use tracing::{error, info};

const MIDI_CHANNELS: u8 = 16;
const MIDI_PATCHES: u8 = 128;

/// Control panel plus the painted visualizer frame.
pub struct PerformanceApp<T: MidiTransport> {
    supervisor: PerformanceSupervisor<T>,
    devices: Vec<DeviceDescriptor>,
    mode: ProcessingMode,
    /// `None` selects no MIDI output.
    device: Option<usize>,
    /// Zero-based.
    channel: u8,
    /// Zero-based.
    patch: u8,
    status: String,
}

impl<T: MidiTransport> PerformanceApp<T> {
    pub fn new(supervisor: PerformanceSupervisor<T>, initial: StartRequest) -> Self {
        let devices = supervisor.output_devices().unwrap_or_else(|e| {
            error!("Could not list MIDI output devices: {}", e);
            Vec::new()
        });
        let (device, channel, patch) = match &initial.midi {
            Some(selection) => (
                Some(selection.device.index),
                selection.channel,
                selection.patch,
            ),
            None => (None, 0, 0),
        };
        Self {
            supervisor,
            devices,
            mode: initial.mode,
            device,
            channel,
            patch,
            status: String::new(),
        }
    }

    fn selection(&self) -> Option<MidiSelection> {
        let device = self.devices.get(self.device?)?.clone();
        Some(MidiSelection {
            device,
            channel: self.channel,
            patch: self.patch,
        })
    }

    fn start_stop(&mut self) {
        if self.supervisor.is_running() {
            if let Some(report) = self.supervisor.stop() {
                info!(?report, "session finished");
            }
            self.status = "Stopped".into();
            return;
        }

        let request = StartRequest {
            mode: self.mode,
            midi: self.selection(),
        };
        match self.supervisor.start(request) {
            Ok(()) => self.status = "Recording".into(),
            Err(e) => {
                error!("Could not start: {}", e);
                self.status = e.to_string();
            }
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let running = self.supervisor.is_running();
        ui.horizontal(|ui| {
            ui.add_enabled_ui(!running, |ui| {
                ComboBox::from_label("Mode")
                    .selected_text(self.mode.label())
                    .show_ui(ui, |ui| {
                        for mode in ProcessingMode::ALL {
                            ui.selectable_value(&mut self.mode, mode, mode.label());
                        }
                    });

                let device_text = self
                    .device
                    .and_then(|i| self.devices.get(i))
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "No MIDI output".to_string());
                ComboBox::from_label("MIDI out")
                    .selected_text(device_text)
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.device, None, "No MIDI output");
                        for device in &self.devices {
                            let label = device.to_string();
                            ui.selectable_value(&mut self.device, Some(device.index), label);
                        }
                    });

                ComboBox::from_label("Channel")
                    .selected_text((self.channel + 1).to_string())
                    .show_ui(ui, |ui| {
                        for channel in 0..MIDI_CHANNELS {
                            let label = (channel + 1).to_string();
                            ui.selectable_value(&mut self.channel, channel, label);
                        }
                    });

                ComboBox::from_label("Patch")
                    .selected_text((self.patch as u16 + 1).to_string())
                    .show_ui(ui, |ui| {
                        for patch in 0..MIDI_PATCHES {
                            let label = (patch as u16 + 1).to_string();
                            ui.selectable_value(&mut self.patch, patch, label);
                        }
                    });
            });

            let label = if running { "Stop" } else { "Start" };
            if ui.button(label).clicked() {
                self.start_stop();
            }
        });

        let stats = self.supervisor.display().stats();
        ui.horizontal(|ui| {
            ui.label(format!("{:.1} Hz", self.supervisor.readout().hz()));
            ui.separator();
            ui.label(format!("{:.0} fps", stats.frames_per_second));
            if let Some(phase) = self.supervisor.midi_phase() {
                ui.separator();
                ui.label(format!("MIDI {:?}", phase));
            }
            if !self.status.is_empty() {
                ui.separator();
                ui.label(&self.status);
            }
        });
    }

    fn paint_frame(&self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::hover());
        let origin = response.rect.min;
        self.supervisor
            .display()
            .set_viewport(response.rect.width(), response.rect.height());

        let to_screen = |p: Point| Pos2::new(origin.x + p.x, origin.y + p.y);
        for command in &self.supervisor.display().latest().commands {
            match command {
                DrawCommand::FillRect { min, max, paint } => {
                    painter.rect_filled(
                        Rect::from_min_max(to_screen(*min), to_screen(*max)),
                        0.0,
                        color(*paint),
                    );
                }
                DrawCommand::Line { from, to, paint } => {
                    painter.line_segment(
                        [to_screen(*from), to_screen(*to)],
                        Stroke::new(1.0, color(*paint)),
                    );
                }
                DrawCommand::Text { at, text, paint } => {
                    painter.text(
                        to_screen(*at),
                        Align2::LEFT_BOTTOM,
                        text,
                        FontId::proportional(18.0),
                        color(*paint),
                    );
                }
            }
        }
    }
}

fn color(paint: Paint) -> Color32 {
    match paint {
        Paint::Background => Color32::BLACK,
        Paint::Green => Color32::GREEN,
        Paint::Blue => Color32::LIGHT_BLUE,
        Paint::White => Color32::WHITE,
    }
}

impl<T: MidiTransport> App for PerformanceApp<T> {
    /// Repaints continuously; the visualizer thread publishes frames at its own rate.
    fn update(&mut self, ctx: &Context, _: &mut eframe::Frame) {
        ctx.request_repaint();

        TopBottomPanel::top("controls").show(ctx, |ui| self.controls(ui));
        CentralPanel::default().show(ctx, |ui| self.paint_frame(ui));
    }
}

/// Initializes and runs the eframe application.
pub fn run_ui<T: MidiTransport>(
    supervisor: PerformanceSupervisor<T>,
    initial: StartRequest,
) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Pitch to MIDI",
        options,
        Box::new(move |_cc: &CreationContext| {
            Ok(Box::new(PerformanceApp::new(supervisor, initial)))
        }),
    )
}
