//! DRM sysfs attributes read as counters.
//!
//! amdgpu exposes `gpu_busy_percent` and `mem_info_vram_*` per card; each
//! attribute file holds one decimal number.

use std::fs;
use std::path::{Path, PathBuf};

use super::CounterQuery;
use crate::core::gpu::GpuVendor;
use crate::error::BackendError;

pub struct SysfsQuery {
    root: PathBuf,
    files: Vec<PathBuf>,
    samples: Vec<Option<String>>,
}

impl SysfsQuery {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            files: Vec::new(),
            samples: Vec::new(),
        }
    }

    fn sample(&self, counter: usize) -> Result<&str, BackendError> {
        self.samples
            .get(counter)
            .and_then(|s| s.as_deref())
            .ok_or_else(|| {
                BackendError::counter_unavailable(format!(
                    "no sample for {}",
                    self.files
                        .get(counter)
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                ))
            })
    }
}

impl CounterQuery for SysfsQuery {
    type Counter = usize;

    fn add_counter(&mut self, path: &str) -> Result<usize, BackendError> {
        let file = self.root.join(path);
        if !file.is_file() {
            return Err(BackendError::counter_unavailable(format!(
                "{} does not exist",
                file.display()
            )));
        }
        self.files.push(file);
        self.samples.push(None);
        Ok(self.files.len() - 1)
    }

    fn collect(&mut self) -> Result<(), BackendError> {
        self.samples = self
            .files
            .iter()
            .map(|file| fs::read_to_string(file).ok().map(|s| s.trim().to_string()))
            .collect();

        if !self.files.is_empty() && self.samples.iter().all(Option::is_none) {
            return Err(BackendError::counter_unavailable(format!(
                "no attribute under {} could be read",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn read_double(&self, counter: usize) -> Result<f64, BackendError> {
        let raw = self.sample(counter)?;
        raw.parse::<f64>()
            .map_err(|e| BackendError::counter_unavailable(format!("'{}': {}", raw, e)))
    }

    fn read_large(&self, counter: usize) -> Result<u64, BackendError> {
        let raw = self.sample(counter)?;
        raw.parse::<u64>()
            .map_err(|e| BackendError::counter_unavailable(format!("'{}': {}", raw, e)))
    }

    fn close(&mut self) {
        self.files.clear();
        self.samples.clear();
    }

    fn source(&self) -> String {
        format!("sysfs:{}", self.root.display())
    }
}

/// Cards probed under the DRM class root
pub const MAX_CARDS: u32 = 4;

/// Path of `attribute` for one card, relative to the DRM class root
pub fn card_attribute(card: u32, attribute: &str) -> String {
    format!("card{}/device/{}", card, attribute)
}

/// First card that reports `gpu_busy_percent`
pub fn busy_card(root: &Path) -> Option<u32> {
    (0..MAX_CARDS).find(|&card| root.join(card_attribute(card, "gpu_busy_percent")).is_file())
}

/// Vendor of one card from its PCI vendor id
pub fn card_vendor(root: &Path, card: u32) -> Option<GpuVendor> {
    let raw = fs::read_to_string(root.join(card_attribute(card, "vendor"))).ok()?;
    let id = u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok()?;
    Some(match id {
        0x10de => GpuVendor::Nvidia,
        0x1002 => GpuVendor::Amd,
        0x8086 => GpuVendor::Intel,
        _ => GpuVendor::Unknown,
    })
}
