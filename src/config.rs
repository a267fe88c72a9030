use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vjgen::audio::features::KickParams;
use vjgen::audio::spectrum::AnalyserSettings;
use vjgen::effects::{OptionMap, OptionValue};
use vjgen::engine::AutomixSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AnalyserSettings,
    #[serde(default)]
    pub kick: KickParams,
    #[serde(default)]
    pub automix: AutomixSettings,
    #[serde(default)]
    pub blend: Option<String>,
    /// Effect ids activated at start, in composite order
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Option overrides per effect id
    #[serde(default)]
    pub options: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }

impl Config {
    /// Option overrides for one effect, converted to engine values. Arrays
    /// and tables have no option counterpart and are skipped.
    pub fn effect_options(&self, id: &str) -> OptionMap {
        let Some(table) = self.options.get(id) else {
            return OptionMap::new();
        };
        table
            .iter()
            .filter_map(|(key, value)| {
                let converted = match value {
                    toml::Value::Integer(i) => OptionValue::Number(*i as f64),
                    toml::Value::Float(f) => OptionValue::Number(*f),
                    toml::Value::Boolean(b) => OptionValue::Bool(*b),
                    toml::Value::String(s) => OptionValue::Text(s.clone()),
                    other => {
                        log::warn!("Ignoring option {}.{}: unsupported value {}", id, key, other);
                        return None;
                    }
                };
                Some((key.clone(), converted))
            })
            .collect()
    }
}

/// Reads and parses a config file. Kick and automix values are clamped into
/// their valid ranges here.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)?;
    config.kick = config.kick.clamped();
    config.automix = config.automix.clamped();
    Ok(config)
}

/// `--config`, then `./vjgen.toml`, then `~/.config/vjgen/config.toml`, then
/// the platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("vjgen.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("vjgen").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("vjgen").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
