//! Unified GPU record and the JSON snapshot schema.
//!
//! Every backend's data ends up in [`UnifiedGpuRecord`]; the serialized shape
//! is identical regardless of which backend produced it. Missing data takes
//! zero-equivalent defaults instead of dropping keys.

use serde::{Deserialize, Serialize};

use super::metrics::{DeviceInfo, DeviceStats};
use crate::error::Result;

/// The only externally visible GPU shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedGpuRecord {
    pub index: u32,
    pub name: String,
    #[serde(rename = "gpu_utilization")]
    pub gpu_utilization_pct: u32,
    #[serde(rename = "memory_utilization")]
    pub memory_utilization_pct: u32,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_free: u64,
    pub temperature: f64,
    pub power_usage: f64,
}

impl UnifiedGpuRecord {
    /// Merge static info with an optional sample.
    ///
    /// A missing sample (failed per-call query) yields zeroed dynamic fields
    /// while keeping the cached name and capacity.
    pub fn from_parts(info: &DeviceInfo, stats: Option<&DeviceStats>) -> Self {
        let Some(stats) = stats else {
            return Self {
                index: info.index,
                name: info.name.clone(),
                gpu_utilization_pct: 0,
                memory_utilization_pct: 0,
                memory_total: info.memory_total,
                memory_used: 0,
                memory_free: info.memory_total,
                temperature: 0.0,
                power_usage: 0.0,
            };
        };

        let memory_total = match stats.memory_total {
            Some(total) if total > 0 => total,
            _ => info.memory_total,
        };
        let memory_used = stats.memory_used;

        Self {
            index: info.index,
            name: info.name.clone(),
            gpu_utilization_pct: clamp_percent(stats.utilization_pct),
            memory_utilization_pct: memory_utilization(memory_used, memory_total),
            memory_total,
            memory_used,
            memory_free: memory_free(memory_total, memory_used),
            temperature: finite_or_zero(stats.temperature),
            power_usage: round_hundredths(finite_or_zero(stats.power_watts)),
        }
    }
}

/// Full device list in the fixed `{"gpus":[...]}` shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub gpus: Vec<UnifiedGpuRecord>,
}

impl GpuSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One header row with the JSON key names, then one row per device
    pub fn to_csv(&self) -> String {
        let mut out = CSV_HEADER.join(",");
        out.push('\n');
        for gpu in &self.gpus {
            let row = [
                gpu.index.to_string(),
                csv_field(&gpu.name),
                gpu.gpu_utilization_pct.to_string(),
                gpu.memory_utilization_pct.to_string(),
                gpu.memory_total.to_string(),
                gpu.memory_used.to_string(),
                gpu.memory_free.to_string(),
                gpu.temperature.to_string(),
                gpu.power_usage.to_string(),
            ];
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

const CSV_HEADER: [&str; 9] = [
    "index",
    "name",
    "gpu_utilization",
    "memory_utilization",
    "memory_total",
    "memory_used",
    "memory_free",
    "temperature",
    "power_usage",
];

/// Quote a field when it holds a separator, a quote or a line break
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Clamp a raw vendor percentage into 0..=100, flooring fractions
pub fn clamp_percent(raw: f64) -> u32 {
    if !raw.is_finite() || raw <= 0.0 {
        0
    } else if raw >= 100.0 {
        100
    } else {
        raw.floor() as u32
    }
}

/// `floor(used * 100 / total)`, 0 when total is 0, capped at 100
pub fn memory_utilization(used: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (used as u128 * 100) / total as u128;
    pct.min(100) as u32
}

/// `max(total - used, 0)`
pub fn memory_free(total: u64, used: u64) -> u64 {
    total.saturating_sub(used)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
