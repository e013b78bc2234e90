use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::gpu::GpuVendor;

const GIB: u64 = 1024 * 1024 * 1024;

/// Which vendor backend to probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorPreference {
    /// NVIDIA, then AMD, then Intel
    #[default]
    Auto,
    Nvidia,
    Amd,
    Intel,
}

impl VendorPreference {
    /// Vendors to probe, in order
    pub fn probe_order(&self) -> Vec<GpuVendor> {
        match self {
            VendorPreference::Auto => GpuVendor::PROBE_ORDER.to_vec(),
            VendorPreference::Nvidia => vec![GpuVendor::Nvidia],
            VendorPreference::Amd => vec![GpuVendor::Amd],
            VendorPreference::Intel => vec![GpuVendor::Intel],
        }
    }

    pub fn vendor(&self) -> Option<GpuVendor> {
        match self {
            VendorPreference::Auto => None,
            VendorPreference::Nvidia => Some(GpuVendor::Nvidia),
            VendorPreference::Amd => Some(GpuVendor::Amd),
            VendorPreference::Intel => Some(GpuVendor::Intel),
        }
    }
}

impl std::str::FromStr for VendorPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(VendorPreference::Auto),
            "nvidia" => Ok(VendorPreference::Nvidia),
            "amd" => Ok(VendorPreference::Amd),
            "intel" => Ok(VendorPreference::Intel),
            other => Err(format!(
                "unknown vendor '{}' (expected auto, nvidia, amd or intel)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vendor: VendorPreference,
    /// Library paths tried before the built-in candidates
    pub extra_library_paths: Vec<PathBuf>,
    /// Wait after the counter warm-up collection
    pub warmup_delay_ms: u64,
    /// Capacity assumed for a discrete adapter when only counters work
    pub discrete_fallback_memory_bytes: u64,
    /// Integrated adapters are assumed to get 1/N of system memory
    pub integrated_memory_divisor: u64,
    /// Root of the DRM class tree used by the Linux counter source
    pub drm_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor: VendorPreference::Auto,
            extra_library_paths: Vec::new(),
            warmup_delay_ms: 100,
            discrete_fallback_memory_bytes: 8 * GIB,
            integrated_memory_divisor: 8,
            drm_root: PathBuf::from("/sys/class/drm"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path. Missing or corrupted files give defaults.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        if data.is_empty() {
            return Ok(Config::default());
        }

        let config = serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!(
                "Ignoring unreadable config file {:?}: {}",
                config_path,
                e
            );
            Config::default()
        });

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(config_path, data)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("gpustat").join("config.json"))
    }

    /// Keys accepted by [`Config::set_value`]
    pub const KEYS: [&'static str; 6] = [
        "vendor",
        "library",
        "warmup_delay_ms",
        "discrete_fallback_memory_bytes",
        "integrated_memory_divisor",
        "drm_root",
    ];

    /// Set one field from its command-line spelling. `library` appends a path.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "vendor" => {
                self.vendor = value.parse::<VendorPreference>().map_err(|e| anyhow::anyhow!(e))?;
            }
            "library" => self.extra_library_paths.push(PathBuf::from(value)),
            "warmup_delay_ms" => self.warmup_delay_ms = parse_number(key, value)?,
            "discrete_fallback_memory_bytes" => {
                self.discrete_fallback_memory_bytes = parse_number(key, value)?
            }
            "integrated_memory_divisor" => {
                self.integrated_memory_divisor = parse_number(key, value)?
            }
            "drm_root" => self.drm_root = PathBuf::from(value),
            other => anyhow::bail!(
                "unknown config key '{}' (expected one of: {})",
                other,
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Normalized divisor; 0 would mean "no estimate" and is treated as 1
    pub fn integrated_divisor(&self) -> u64 {
        self.integrated_memory_divisor.max(1)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} expects a non-negative integer, got '{}'", key, value))
}
