//! Visualizer configuration and the single path through which it changes.
//!
//! UI code never writes fields directly. It queues [`ConfigUpdate`]s on the
//! [`ConfigStore`], which validates and applies them in [`ConfigStore::commit`]
//! between ticks.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyser::{AnalyserSettings, WindowType};
use crate::palette::{DisplayMode, Palette};
use crate::spectrogram::IngestParams;
use crate::utils::{
    is_valid_fft_size, speed_divisor_from_slider, COMPACT_DEPTH, COMPACT_WIDTH,
    DEFAULT_AMPLITUDE_SCALE, DEFAULT_DEPTH, DEFAULT_FFT_SIZE, DEFAULT_GATE_THRESHOLD,
    DEFAULT_SPEED_DIVISOR, DEFAULT_WIDTH,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("width must be at least 1 column")]
    ZeroWidth,
    #[error("depth must be at least 1 slice")]
    ZeroDepth,
    #[error("speed divisor must be at least 1")]
    ZeroSpeedDivisor,
    #[error("amplitude scale must be positive, got {0}")]
    InvalidAmplitude(f32),
    #[error("FFT size {0} is not a power of two between 32 and 32768")]
    InvalidFftSize(usize),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Frequency columns sampled per slice.
    pub width: usize,
    /// Retained time slices.
    pub depth: usize,
    /// Halves the drawn depth extent; the buffer keeps `depth` slices either way.
    pub half_depth: bool,
    /// Ingest once every this many scheduled frames.
    pub speed_divisor: u32,
    pub amplitude_scale: f32,
    pub gate_threshold: u8,
    pub palette: Palette,
    pub display_mode: DisplayMode,
    pub fft_size: usize,
    /// Taper applied before each transform. Read when the input is opened.
    pub analyser_window: WindowType,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            depth: DEFAULT_DEPTH,
            half_depth: false,
            speed_divisor: DEFAULT_SPEED_DIVISOR,
            amplitude_scale: DEFAULT_AMPLITUDE_SCALE,
            gate_threshold: DEFAULT_GATE_THRESHOLD,
            palette: Palette::default(),
            display_mode: DisplayMode::default(),
            fft_size: DEFAULT_FFT_SIZE,
            analyser_window: WindowType::default(),
        }
    }
}

impl VisualizerConfig {
    /// Smaller field for constrained devices.
    pub fn compact() -> Self {
        Self {
            width: COMPACT_WIDTH,
            depth: COMPACT_DEPTH,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 {
            return Err(ConfigError::ZeroWidth);
        }
        if self.depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        if self.speed_divisor == 0 {
            return Err(ConfigError::ZeroSpeedDivisor);
        }
        if !(self.amplitude_scale.is_finite() && self.amplitude_scale > 0.0) {
            return Err(ConfigError::InvalidAmplitude(self.amplitude_scale));
        }
        if !is_valid_fft_size(self.fft_size) {
            return Err(ConfigError::InvalidFftSize(self.fft_size));
        }
        Ok(())
    }

    pub fn analyser_settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            window: self.analyser_window,
            ..AnalyserSettings::default()
        }
    }

    pub fn ingest_params(&self) -> IngestParams {
        IngestParams {
            gate_threshold: self.gate_threshold,
            amplitude_scale: self.amplitude_scale,
        }
    }
}

/// A single UI-originated change.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    Width(usize),
    Depth(usize),
    HalfDepth(bool),
    ToggleHalfDepth,
    /// 1..=10 slider position, 10 being fastest.
    SpeedSlider(u32),
    AmplitudeScale(f32),
    GateThreshold(u8),
    Palette(Palette),
    DisplayMode(DisplayMode),
    FftSize(usize),
}

/// What a commit changed, for collaborators that must react.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChange {
    /// Width or depth changed; the buffer must be reallocated.
    pub dimensions: bool,
    pub fft_size: bool,
    /// Anything only the renderer cares about.
    pub appearance: bool,
}

impl ConfigChange {
    pub fn any(&self) -> bool {
        self.dimensions || self.fft_size || self.appearance
    }

    fn between(old: &VisualizerConfig, new: &VisualizerConfig) -> Self {
        Self {
            dimensions: old.width != new.width || old.depth != new.depth,
            fft_size: old.fft_size != new.fft_size,
            appearance: old.half_depth != new.half_depth
                || old.palette != new.palette
                || old.display_mode != new.display_mode,
        }
    }
}

#[derive(Debug)]
pub struct ConfigStore {
    current: VisualizerConfig,
    pending: Vec<ConfigUpdate>,
}

impl ConfigStore {
    pub fn new(config: VisualizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            current: config,
            pending: Vec::new(),
        })
    }

    pub fn get(&self) -> &VisualizerConfig {
        &self.current
    }

    pub fn queue(&mut self, update: ConfigUpdate) {
        self.pending.push(update);
    }

    /// Applies queued updates in order.
    ///
    /// Each update is validated against the config it would produce; invalid
    /// ones are logged and dropped while the rest still apply.
    pub fn commit(&mut self) -> ConfigChange {
        if self.pending.is_empty() {
            return ConfigChange::default();
        }

        let before = self.current.clone();
        for update in std::mem::take(&mut self.pending) {
            let mut candidate = self.current.clone();
            apply(&mut candidate, update.clone());
            match candidate.validate() {
                Ok(()) => self.current = candidate,
                Err(e) => warn!("Ignoring config update {:?}: {}", update, e),
            }
        }

        let change = ConfigChange::between(&before, &self.current);
        if change.any() {
            info!("Config committed: {:?}", change);
        }
        change
    }
}

fn apply(config: &mut VisualizerConfig, update: ConfigUpdate) {
    match update {
        ConfigUpdate::Width(width) => config.width = width,
        ConfigUpdate::Depth(depth) => config.depth = depth,
        ConfigUpdate::HalfDepth(half) => config.half_depth = half,
        ConfigUpdate::ToggleHalfDepth => config.half_depth = !config.half_depth,
        ConfigUpdate::SpeedSlider(slider) => {
            config.speed_divisor = speed_divisor_from_slider(slider)
        }
        ConfigUpdate::AmplitudeScale(scale) => config.amplitude_scale = scale,
        ConfigUpdate::GateThreshold(gate) => config.gate_threshold = gate,
        ConfigUpdate::Palette(palette) => config.palette = palette,
        ConfigUpdate::DisplayMode(mode) => config.display_mode = mode,
        ConfigUpdate::FftSize(size) => config.fft_size = size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VisualizerConfig::default();
        assert_eq!(config.width, 256);
        assert_eq!(config.depth, 64);
        assert_eq!(config.speed_divisor, 4);
        assert!(config.validate().is_ok());

        let compact = VisualizerConfig::compact();
        assert_eq!((compact.width, compact.depth), (128, 48));
        assert!(compact.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_sizes() {
        let base = VisualizerConfig::default();
        let cases = [
            (VisualizerConfig { width: 0, ..base.clone() }, ConfigError::ZeroWidth),
            (VisualizerConfig { depth: 0, ..base.clone() }, ConfigError::ZeroDepth),
            (
                VisualizerConfig { speed_divisor: 0, ..base.clone() },
                ConfigError::ZeroSpeedDivisor,
            ),
            (
                VisualizerConfig { amplitude_scale: -1.0, ..base.clone() },
                ConfigError::InvalidAmplitude(-1.0),
            ),
            (
                VisualizerConfig { fft_size: 1000, ..base.clone() },
                ConfigError::InvalidFftSize(1000),
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn test_updates_apply_only_on_commit() {
        let mut store = ConfigStore::new(VisualizerConfig::default()).unwrap();
        store.queue(ConfigUpdate::Depth(32));
        store.queue(ConfigUpdate::Palette(Palette::Ocean));
        assert_eq!(store.get().depth, 64);

        let change = store.commit();
        assert!(change.dimensions);
        assert!(change.appearance);
        assert!(!change.fft_size);
        assert_eq!(store.get().depth, 32);
        assert_eq!(store.get().palette, Palette::Ocean);
        assert_eq!(store.commit(), ConfigChange::default());
    }

    #[test]
    fn test_invalid_update_is_dropped() {
        let mut store = ConfigStore::new(VisualizerConfig::default()).unwrap();
        store.queue(ConfigUpdate::Width(0));
        store.queue(ConfigUpdate::SpeedSlider(10));
        let change = store.commit();
        assert!(!change.dimensions);
        assert_eq!(store.get().width, 256);
        assert_eq!(store.get().speed_divisor, 1);
    }

    #[test]
    fn test_toggle_half_depth_is_appearance_only() {
        let mut store = ConfigStore::new(VisualizerConfig::default()).unwrap();
        store.queue(ConfigUpdate::ToggleHalfDepth);
        let change = store.commit();
        assert!(store.get().half_depth);
        assert_eq!(
            change,
            ConfigChange { dimensions: false, fft_size: false, appearance: true }
        );
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: VisualizerConfig =
            serde_yaml::from_str("width: 128\ndisplay_mode: bars\n").unwrap();
        assert_eq!(config.width, 128);
        assert_eq!(config.depth, 64);
        assert_eq!(config.display_mode, DisplayMode::Bars);
        assert_eq!(config.analyser_window, WindowType::Blackman);
    }

    #[test]
    fn test_analyser_window_from_yaml() {
        let config: VisualizerConfig = serde_yaml::from_str("analyser_window: hanning
").unwrap();
        assert_eq!(config.analyser_window, WindowType::Hanning);
        let settings = config.analyser_settings();
        assert_eq!(settings.window, WindowType::Hanning);
        assert_eq!(settings.smoothing, AnalyserSettings::default().smoothing);
        assert!(serde_yaml::from_str::<VisualizerConfig>("analyser_window: triangle
").is_err());
    }

    #[test]
    fn test_store_rejects_invalid_initial_config() {
        let config = VisualizerConfig { depth: 0, ..VisualizerConfig::default() };
        assert_eq!(ConfigStore::new(config).unwrap_err(), ConfigError::ZeroDepth);
    }
}
