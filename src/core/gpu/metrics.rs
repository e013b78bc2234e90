use serde::{Deserialize, Serialize};

/// Longest device name kept, in bytes. Vendor buffers are 256 bytes with a NUL.
pub const MAX_NAME_LEN: usize = 255;

/// Name used when neither the vendor nor the OS can name a device
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    #[default]
    Unknown,
}

impl GpuVendor {
    /// Vendor backends tried by automatic selection, in order.
    pub const PROBE_ORDER: [GpuVendor; 3] = [GpuVendor::Nvidia, GpuVendor::Amd, GpuVendor::Intel];

    pub fn display_name(&self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "NVIDIA",
            GpuVendor::Amd => "AMD",
            GpuVendor::Intel => "Intel",
            GpuVendor::Unknown => "Unknown",
        }
    }

    /// Generic adapter name used by the counter fallback when the OS has none
    pub fn default_adapter_name(&self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "NVIDIA Graphics Card",
            GpuVendor::Amd => "AMD Graphics Card",
            GpuVendor::Intel => "Intel Integrated Graphics",
            GpuVendor::Unknown => "Generic Graphics Adapter",
        }
    }
}

/// Guess the vendor from an adapter display name
pub fn detect_vendor(name: &str) -> GpuVendor {
    let name = name.to_ascii_lowercase();

    if name.contains("nvidia") || name.contains("geforce") || name.contains("quadro") {
        GpuVendor::Nvidia
    } else if name.contains("amd") || name.contains("radeon") {
        GpuVendor::Amd
    } else if name.contains("intel") {
        GpuVendor::Intel
    } else {
        GpuVendor::Unknown
    }
}

/// Which kind of backend produced the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Vendor(GpuVendor),
    Counters,
}

/// Static description of one device.
///
/// Fetched once per index and cached by the session; only re-initialization
/// refreshes it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub memory_total: u64,
    /// Compute units reported at init time (AGS only)
    pub compute_units: Option<u32>,
    /// Peak throughput reported at init time (AGS only)
    pub peak_tflops: Option<f32>,
}

impl DeviceInfo {
    pub fn new(index: u32, name: impl Into<String>, memory_total: u64) -> Self {
        Self {
            index,
            name: bounded_name(name.into()),
            memory_total,
            compute_units: None,
            peak_tflops: None,
        }
    }

    /// Placeholder for a device whose info query failed
    pub fn unknown(index: u32) -> Self {
        Self::new(index, UNKNOWN_DEVICE_NAME, 0)
    }
}

/// One telemetry sample for a device.
///
/// `utilization_pct` is the raw vendor value; it is only clamped when merged
/// into a [`UnifiedGpuRecord`](super::record::UnifiedGpuRecord).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    pub utilization_pct: f64,
    pub memory_used: u64,
    pub memory_free: u64,
    /// Capacity reported alongside the sample, when the vendor does so
    pub memory_total: Option<u64>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Watts
    pub power_watts: f64,
}

/// Convert a vendor milliwatt reading to watts
pub fn milliwatts_to_watts(milliwatts: u32) -> f64 {
    milliwatts as f64 / 1000.0
}

fn bounded_name(name: String) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return UNKNOWN_DEVICE_NAME.to_string();
    }
    if trimmed.len() <= MAX_NAME_LEN {
        return trimmed.to_string();
    }

    let mut end = MAX_NAME_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
