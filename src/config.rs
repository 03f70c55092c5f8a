use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matcher::Distance;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("ROLLCALL_CONFIG_PATH").unwrap_or("/usr/local/etc/rollcall/config.toml"))
});

pub static STORE_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("ROLLCALL_STORE_PATH").unwrap_or("/usr/local/etc/rollcall/identities.bin"),
    )
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Face,
    Fingerprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub face_threshold: f32,
    pub distance: Distance,
    /// Scanning takes one probe per cycle, round-robin over this list.
    pub modalities: Vec<Modality>,
    pub store_path: PathBuf,
    pub exit_keyword: String,
    pub driver: DriverConfig,
    pub sink: SinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            face_threshold: 0.6,
            distance: Distance::Euclidean,
            modalities: vec![Modality::Face, Modality::Fingerprint],
            store_path: STORE_PATH.to_path_buf(),
            exit_keyword: "exit".to_string(),
            driver: DriverConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: "rollcall-driver".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Csv {
        path: PathBuf,
    },
    /// Display name and timestamp are appended as the last two arguments.
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Csv {
            path: PathBuf::from("/var/lib/rollcall/attendance.csv"),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    if cfg.modalities.is_empty() {
        anyhow::bail!("config {}: modalities must not be empty", path.display());
    }
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
