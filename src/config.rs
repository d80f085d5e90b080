use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Tunables for one game window. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Resource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub view: ViewConfig,
    pub pointer: PointerConfig,
    pub run: RunConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub min_cell_size: f64,
    pub max_cell_size: f64,
    pub default_cell_size: f64,
    pub zoom_step: f64,
    /// Extra cells drawn around the viewport so panning never shows pop-in.
    pub visible_margin: i64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_cell_size: 15.0,
            max_cell_size: 40.0,
            default_cell_size: 25.0,
            zoom_step: 5.0,
            visible_margin: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Movement beyond this many pixels turns a press into a pan.
    pub tap_threshold_px: f64,
    pub tap_confirm_ms: u64,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            tap_threshold_px: 6.0,
            tap_confirm_ms: 50,
        }
    }
}

impl PointerConfig {
    pub fn tap_confirm(&self) -> Duration {
        Duration::from_millis(self.tap_confirm_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub step_interval_ms: u64,
    pub batch_interval_ms: u64,
    pub batch_generations: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: 100,
            batch_interval_ms: 50,
            batch_generations: 23,
        }
    }
}

impl RunConfig {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub auto_save: bool,
    pub auto_save_delay_ms: u64,
    pub notice_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            auto_save_delay_ms: 1500,
            notice_ms: 3000,
        }
    }
}

impl PersistenceConfig {
    pub fn auto_save_delay(&self) -> Duration {
        Duration::from_millis(self.auto_save_delay_ms)
    }

    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_ms)
    }
}

impl GameConfig {
    /// Reads a TOML file, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let v = &self.view;
        if !(v.min_cell_size > 0.0 && v.min_cell_size <= v.max_cell_size) {
            bail!(
                "view.min_cell_size must be positive and at most view.max_cell_size ({} > {})",
                v.min_cell_size,
                v.max_cell_size
            );
        }
        if !(v.min_cell_size..=v.max_cell_size).contains(&v.default_cell_size) {
            bail!(
                "view.default_cell_size {} is outside [{}, {}]",
                v.default_cell_size,
                v.min_cell_size,
                v.max_cell_size
            );
        }
        if v.zoom_step <= 0.0 || v.visible_margin < 0 {
            bail!("view.zoom_step must be positive and view.visible_margin non-negative");
        }
        if self.pointer.tap_threshold_px < 0.0 {
            bail!("pointer.tap_threshold_px must not be negative");
        }
        if self.run.step_interval_ms == 0 || self.run.batch_interval_ms == 0 {
            bail!("run intervals must be at least 1ms");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = GameConfig::load(None).unwrap();
        assert_eq!(config.run.batch_generations, 23);
        assert_eq!(config.view.default_cell_size, 25.0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[run]\nbatch_generations = 7\n\n[view]\nmax_cell_size = 60.0").unwrap();

        let config = GameConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.run.batch_generations, 7);
        assert_eq!(config.run.step_interval_ms, 100);
        assert_eq!(config.view.max_cell_size, 60.0);
        assert_eq!(config.view.min_cell_size, 15.0);
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let mut config = GameConfig::default();
        config.view.min_cell_size = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = GameConfig::default();
        config.run.batch_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
