use eframe::egui;
use eframe::NativeOptions;
use egui::{Color32, Key, Mesh, Modifiers, Painter, Pos2, Rect, Sense, Shape, Stroke};
use log::{info, warn};

use crate::acquisition::{AcquisitionPort, SourceKind};
use crate::config::{ConfigStore, ConfigUpdate, VisualizerConfig};
use crate::palette::{DisplayMode, Palette};
use crate::render::{RenderFrame, RenderingPort};
use crate::scheduler::{FrameScheduler, SchedulerState};
use crate::utils::{slider_from_speed_divisor, FFT_SIZES, SPEED_SLIDER_MAX};

/// Per-refresh step of the drawn heights toward the buffer.
const VISUAL_LERP: f32 = 0.2;
/// Heights are drawn at `amplitude_scale` per this fraction of the view height.
const HEIGHT_SPAN: f32 = 0.45;
/// Horizontal and vertical shift of the back row relative to the front row.
const OBLIQUE_X: f32 = 0.18;
const OBLIQUE_Y: f32 = 0.42;
const MARGIN: f32 = 0.06;

/// Visually smoothed copy of the height field plus the code that paints it.
#[derive(Default)]
pub struct TerrainView {
    heights: Vec<f32>, // oldest slice first
    width: usize,
    depth: usize,
    ready: bool,
}

impl RenderingPort for TerrainView {
    fn consume(&mut self, frame: RenderFrame<'_>, _config: &VisualizerConfig) {
        let Some(snapshot) = frame.snapshot() else {
            self.ready = false;
            return;
        };
        if snapshot.width() != self.width || snapshot.depth() != self.depth {
            self.width = snapshot.width();
            self.depth = snapshot.depth();
            self.heights = snapshot.to_vec();
        } else {
            for (shown, &target) in self.heights.iter_mut().zip(snapshot.slices().flatten()) {
                *shown += (target - *shown) * VISUAL_LERP;
            }
        }
        self.ready = true;
    }
}

impl TerrainView {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[cfg(test)]
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    fn height(&self, slice: usize, column: usize) -> f32 {
        self.heights[slice * self.width + column]
    }

    /// Oblique projection: columns run left to right, the newest slice is at
    /// the front (bottom) and older slices recede up and to the right.
    fn project(&self, rect: Rect, config: &VisualizerConfig, slice: usize, column: usize, height: f32) -> Pos2 {
        let along = if self.width > 1 { column as f32 / (self.width - 1) as f32 } else { 0.0 };
        let recency = if self.depth > 1 { slice as f32 / (self.depth - 1) as f32 } else { 1.0 };
        let extent = if config.half_depth { 0.5 } else { 1.0 };
        let back = (1.0 - recency) * extent;

        let usable_w = rect.width() * (1.0 - 2.0 * MARGIN - OBLIQUE_X);
        let x = rect.left() + rect.width() * MARGIN + along * usable_w + back * rect.width() * OBLIQUE_X;
        let base_y = rect.bottom() - rect.height() * MARGIN - back * rect.height() * OBLIQUE_Y;
        let lift = height / config.amplitude_scale * rect.height() * HEIGHT_SPAN;
        Pos2::new(x, base_y - lift)
    }

    /// Palette runs across the frequency axis; older slices fade out.
    fn color(&self, config: &VisualizerConfig, slice: usize, column: usize) -> Color32 {
        let along = if self.width > 1 { column as f32 / (self.width - 1) as f32 } else { 0.0 };
        let [r, g, b] = config.palette.color_at(along);
        let recency = if self.depth > 1 { slice as f32 / (self.depth - 1) as f32 } else { 1.0 };
        let alpha = (90.0 + 165.0 * recency) as u8;
        Color32::from_rgba_unmultiplied(r, g, b, alpha)
    }

    pub fn paint(&self, painter: &Painter, rect: Rect, config: &VisualizerConfig) {
        if !self.ready || self.width == 0 {
            return;
        }
        // Back to front so newer slices cover older ones.
        match config.display_mode {
            DisplayMode::Solid => self.paint_solid(painter, rect, config),
            DisplayMode::Dots => {
                for i in 0..self.depth {
                    for j in 0..self.width {
                        let p = self.project(rect, config, i, j, self.height(i, j));
                        painter.circle_filled(p, 1.2, self.color(config, i, j));
                    }
                }
            }
            DisplayMode::Lines => {
                // Every other column, traced through time.
                for j in (0..self.width).step_by(2) {
                    let points = (0..self.depth)
                        .map(|i| self.project(rect, config, i, j, self.height(i, j)))
                        .collect();
                    let color = self.color(config, self.depth - 1, j);
                    painter.add(Shape::line(points, Stroke::new(1.0, color)));
                }
            }
            DisplayMode::Wire => {
                for i in 0..self.depth {
                    for j in 0..self.width {
                        let p = self.project(rect, config, i, j, self.height(i, j));
                        let stroke = Stroke::new(0.8, self.color(config, i, j));
                        if j + 1 < self.width {
                            let q = self.project(rect, config, i, j + 1, self.height(i, j + 1));
                            painter.line_segment([p, q], stroke);
                        }
                        if i + 1 < self.depth {
                            let q = self.project(rect, config, i + 1, j, self.height(i + 1, j));
                            painter.line_segment([p, q], stroke);
                        }
                    }
                }
            }
            DisplayMode::Bars => {
                let spacing = rect.width() / self.width.max(1) as f32;
                for i in 0..self.depth {
                    for j in 0..self.width {
                        let top = self.project(rect, config, i, j, self.height(i, j));
                        let base = self.project(rect, config, i, j, 0.0);
                        let stroke = Stroke::new((spacing * 0.6).max(1.0), self.color(config, i, j));
                        painter.line_segment([base, top], stroke);
                    }
                }
            }
        }
    }

    fn paint_solid(&self, painter: &Painter, rect: Rect, config: &VisualizerConfig) {
        let mut mesh = Mesh::default();
        for i in 0..self.depth {
            for j in 0..self.width {
                let p = self.project(rect, config, i, j, self.height(i, j));
                mesh.colored_vertex(p, self.color(config, i, j));
            }
        }
        let w = self.width as u32;
        for i in 0..self.depth.saturating_sub(1) as u32 {
            for j in 0..w.saturating_sub(1) {
                let a = i * w + j;
                let b = a + 1;
                let c = a + w;
                let d = c + 1;
                mesh.add_triangle(a, b, c);
                mesh.add_triangle(b, d, c);
            }
        }
        painter.add(Shape::mesh(mesh));
    }
}

/// Desktop front end: one scheduler tick per repaint.
pub struct TerrainApp<A: AcquisitionPort> {
    scheduler: FrameScheduler<A>,
    store: ConfigStore,
    view: TerrainView,
    source: SourceKind,
    failure: Option<String>,
    show_panel: bool,
}

impl<A: AcquisitionPort> TerrainApp<A> {
    /// Starts acquisition on `source` right away; a failure is shown, not fatal.
    pub fn new(scheduler: FrameScheduler<A>, store: ConfigStore, source: SourceKind) -> Self {
        let mut app = Self {
            scheduler,
            store,
            view: TerrainView::default(),
            source,
            failure: None,
            show_panel: true,
        };
        app.start();
        app
    }

    fn start(&mut self) {
        match self.scheduler.start(self.source, self.store.get().fft_size) {
            Ok(()) => self.failure = None,
            Err(e) => self.failure = Some(e.to_string()),
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let config = self.store.get().clone();
        ui.heading("Spectral Terrain");
        ui.separator();

        let mut amplitude = config.amplitude_scale;
        if ui.add(egui::Slider::new(&mut amplitude, 1.0..=100.0).text("Amp")).changed() {
            self.store.queue(ConfigUpdate::AmplitudeScale(amplitude));
        }
        let mut speed = slider_from_speed_divisor(config.speed_divisor);
        if ui.add(egui::Slider::new(&mut speed, 1..=SPEED_SLIDER_MAX).text("Speed")).changed() {
            self.store.queue(ConfigUpdate::SpeedSlider(speed));
        }
        let mut width = config.width;
        egui::ComboBox::from_label("Columns")
            .selected_text(width.to_string())
            .show_ui(ui, |ui| {
                for option in [64, 128, 256, 512] {
                    ui.selectable_value(&mut width, option, option.to_string());
                }
            });
        if width != config.width {
            self.store.queue(ConfigUpdate::Width(width));
        }
        let mut depth = config.depth;
        if ui.add(egui::Slider::new(&mut depth, 8..=256).text("Depth")).changed() {
            self.store.queue(ConfigUpdate::Depth(depth));
        }
        let mut gate = config.gate_threshold;
        if ui.add(egui::Slider::new(&mut gate, 0..=64).text("Gate")).changed() {
            self.store.queue(ConfigUpdate::GateThreshold(gate));
        }

        let mut palette = config.palette;
        egui::ComboBox::from_label("Palette")
            .selected_text(palette.label())
            .show_ui(ui, |ui| {
                for option in Palette::ALL {
                    ui.selectable_value(&mut palette, option, option.label());
                }
            });
        if palette != config.palette {
            self.store.queue(ConfigUpdate::Palette(palette));
        }

        let mut mode = config.display_mode;
        egui::ComboBox::from_label("Mode")
            .selected_text(mode.label())
            .show_ui(ui, |ui| {
                for option in DisplayMode::ALL {
                    ui.selectable_value(&mut mode, option, option.label());
                }
            });
        if mode != config.display_mode {
            self.store.queue(ConfigUpdate::DisplayMode(mode));
        }

        let mut fft_size = config.fft_size;
        egui::ComboBox::from_label("FFT")
            .selected_text(fft_size.to_string())
            .show_ui(ui, |ui| {
                for option in FFT_SIZES {
                    ui.selectable_value(&mut fft_size, option, option.to_string());
                }
            });
        if fft_size != config.fft_size {
            self.store.queue(ConfigUpdate::FftSize(fft_size));
        }

        let mut half = config.half_depth;
        if ui.checkbox(&mut half, "Half depth").changed() {
            self.store.queue(ConfigUpdate::HalfDepth(half));
        }

        ui.separator();
        let source_label = match self.source {
            SourceKind::Microphone => "Switch to system audio",
            SourceKind::System => "Switch to microphone",
        };
        if ui.button(source_label).clicked() {
            self.source = self.source.toggled();
            info!("User switched source to {:?}", self.source);
            self.start();
        }
        match self.scheduler.state() {
            SchedulerState::NotStarted => {
                let label = if self.failure.is_some() { "Retry" } else { "Start" };
                if ui.button(label).clicked() {
                    self.start();
                }
            }
            SchedulerState::Running => {
                if ui.button("Pause").clicked() {
                    self.scheduler.set_paused(true);
                }
            }
            SchedulerState::Paused => {
                if ui.button("Resume").clicked() {
                    self.scheduler.set_paused(false);
                }
            }
        }
        ui.label(format!(
            "{:?} | frame {} | {}x{}",
            self.scheduler.state(),
            self.scheduler.frame_count(),
            config.width,
            config.depth
        ));
    }
}

impl<A: AcquisitionPort> eframe::App for TerrainApp<A> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();
        ctx.set_visuals(egui::Visuals::dark());

        let (space, tab, half) = ctx.input_mut(|i| {
            (
                i.consume_key(Modifiers::NONE, Key::Space),
                i.consume_key(Modifiers::NONE, Key::Tab),
                i.consume_key(Modifiers::NONE, Key::H),
            )
        });
        if space {
            self.scheduler.toggle_pause();
        }
        if tab {
            self.show_panel = !self.show_panel;
        }
        if half {
            self.store.queue(ConfigUpdate::ToggleHalfDepth);
        }

        if self.show_panel {
            egui::SidePanel::left("controls").show(ctx, |ui| self.controls(ui));
        }

        let change = self.store.commit();
        if change.fft_size {
            if let Err(e) = self.scheduler.set_transform_size(self.store.get().fft_size) {
                warn!("Could not change transform size: {}", e);
            }
        }

        self.scheduler.tick(self.store.get(), &mut self.view);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_rgb(2, 2, 6)))
            .show(ctx, |ui| {
                let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::hover());
                let rect = response.rect;
                if let Some(reason) = &self.failure {
                    painter.text(
                        rect.center(),
                        egui::Align2::CENTER_CENTER,
                        "ACCESS DENIED",
                        egui::FontId::monospace(32.0),
                        Color32::from_rgb(255, 60, 60),
                    );
                    painter.text(
                        rect.center() + egui::vec2(0.0, 32.0),
                        egui::Align2::CENTER_TOP,
                        reason,
                        egui::FontId::monospace(14.0),
                        Color32::GRAY,
                    );
                } else if !self.view.is_ready() {
                    painter.text(
                        rect.center(),
                        egui::Align2::CENTER_CENTER,
                        "waiting for audio",
                        egui::FontId::monospace(18.0),
                        Color32::GRAY,
                    );
                } else {
                    self.view.paint(&painter, rect, self.store.get());
                }
            });
    }
}

pub fn run_native(app_name: &str, app: Box<dyn eframe::App>) -> anyhow::Result<()> {
    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(app_name)
            .with_inner_size([1280.0, 760.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(app_name, options, Box::new(move |_cc| app))
        .map_err(|e| anyhow::anyhow!("eframe error: {}", e))
}
