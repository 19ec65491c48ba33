use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::VisualizerConfig;

pub const DEFAULT_PRESET: &str = "default";

// Manages loading, saving, and holding named visualizer configurations
pub struct PresetManager {
    presets: BTreeMap<String, VisualizerConfig>,
    file_path: PathBuf,
}

impl PresetManager {
    /// Loads presets from `file_path`; a missing file leaves just the built-in default.
    pub fn load(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let mut presets: BTreeMap<String, VisualizerConfig> = if file_path.exists() {
            info!("Loading presets from {}", file_path.display());
            let yaml_str = fs::read_to_string(&file_path)
                .with_context(|| format!("Failed to read {}", file_path.display()))?;
            serde_yaml::from_str(&yaml_str)
                .map_err(|e| anyhow!("Failed to parse {}: {}", file_path.display(), e))?
        } else {
            info!("No presets file at {}, using built-in default", file_path.display());
            BTreeMap::new()
        };

        if !presets.contains_key(DEFAULT_PRESET) {
            presets.insert(DEFAULT_PRESET.to_string(), VisualizerConfig::default());
        }

        for (name, preset) in &presets {
            if let Err(e) = preset.validate() {
                warn!("Preset '{}' is invalid and will be rejected on use: {}", name, e);
            }
        }

        Ok(Self { presets, file_path })
    }

    pub fn save(&self) -> Result<()> {
        let yaml_str = serde_yaml::to_string(&self.presets)?;
        fs::write(&self.file_path, yaml_str)
            .with_context(|| format!("Failed to write {}", self.file_path.display()))?;
        info!("Presets saved to {}", self.file_path.display());
        Ok(())
    }

    /// Returns a validated copy of the named preset.
    pub fn get(&self, name: &str) -> Result<VisualizerConfig> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| anyhow!("Unknown preset '{}'", name))?;
        preset
            .validate()
            .with_context(|| format!("Preset '{}' is invalid", name))?;
        Ok(preset.clone())
    }

    pub fn insert(&mut self, name: &str, config: VisualizerConfig) {
        self.presets.insert(name.to_string(), config);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}
