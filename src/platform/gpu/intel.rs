use std::ffi::{c_char, c_int};
use std::path::PathBuf;

use crate::core::gpu::{
    milliwatts_to_watts, BackendKind, DeviceInfo, DeviceStats, GpuBackend, GpuVendor,
};
use crate::error::BackendError;
use crate::platform::probe::{probe, string_from_c_buf, FunctionTable, LoadedLibrary, SymbolResolver};

/// IGCL ships for Windows only
#[cfg(windows)]
pub const CANDIDATES: &[&str] = &[
    "C:\\Windows\\System32\\igcl64.dll",
    "C:\\Windows\\SysWOW64\\igcl32.dll",
    "C:\\Program Files\\Intel\\Intel(R) Graphics\\igcl64.dll",
    "C:\\Program Files (x86)\\Intel\\Intel(R) Graphics\\igcl32.dll",
    "igcl64.dll",
    "igcl32.dll",
];

#[cfg(not(windows))]
pub const CANDIDATES: &[&str] = &[];

type IgclResult = c_int;

const IGCL_SUCCESS: IgclResult = 0;

#[repr(C)]
#[allow(dead_code)]
struct IgclDeviceInfo {
    device_id: u32,
    device_name: [c_char; 256],
    vendor_id: u32,
    total_memory: u64,
}

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct IgclDeviceStats {
    gpu_utilization: u32,
    memory_utilization: u32,
    memory_used: u64,
    memory_total: u64,
    temperature: u32,
    power_usage: u32,
}

pub struct IgclFunctions {
    init: unsafe extern "C" fn() -> IgclResult,
    shutdown: unsafe extern "C" fn() -> IgclResult,
    get_device_count: unsafe extern "C" fn(*mut u32) -> IgclResult,
    get_device_info: unsafe extern "C" fn(u32, *mut IgclDeviceInfo) -> IgclResult,
    get_device_stats: unsafe extern "C" fn(u32, *mut IgclDeviceStats) -> IgclResult,
}

impl FunctionTable for IgclFunctions {
    fn resolve(symbols: &SymbolResolver<'_>) -> Result<Self, String> {
        // SAFETY: signatures match the IGCL declarations
        unsafe {
            Ok(Self {
                init: symbols.function(&["igcl_init"])?,
                shutdown: symbols.function(&["igcl_shutdown"])?,
                get_device_count: symbols.function(&["igcl_get_device_count"])?,
                get_device_info: symbols.function(&["igcl_get_device_info"])?,
                get_device_stats: symbols.function(&["igcl_get_device_stats"])?,
            })
        }
    }
}

/// Where integrated-GPU capacity comes from when IGCL does not report it
#[derive(Debug, Clone)]
pub struct SharedMemoryEstimate {
    pub system_memory: u64,
    pub divisor: u64,
    /// Adapter name from the OS, used when IGCL cannot name the device
    pub os_adapter_name: Option<String>,
}

impl SharedMemoryEstimate {
    /// Integrated GPUs are assumed to get `1/divisor` of system memory.
    /// This is a fixed policy, not a measurement.
    pub fn capacity(&self) -> u64 {
        self.system_memory / self.divisor.max(1)
    }
}

/// Intel integrated GPU backend using the Intel Graphics Control Library
pub struct IntelBackend {
    library: LoadedLibrary<IgclFunctions>,
    estimate: SharedMemoryEstimate,
    initialized: bool,
}

impl IntelBackend {
    pub fn open(candidates: &[PathBuf], estimate: SharedMemoryEstimate) -> Result<Self, BackendError> {
        Ok(Self {
            library: probe(candidates)?,
            estimate,
            initialized: false,
        })
    }

    fn igcl(&self) -> &IgclFunctions {
        self.library.table()
    }

    fn fallback_name(&self) -> String {
        self.estimate
            .os_adapter_name
            .clone()
            .unwrap_or_else(|| GpuVendor::Intel.default_adapter_name().to_string())
    }
}

impl GpuBackend for IntelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vendor(GpuVendor::Intel)
    }

    fn source(&self) -> String {
        self.library.path().display().to_string()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        let code = unsafe { (self.igcl().init)() };
        if code != IGCL_SUCCESS {
            return Err(BackendError::init_failed(format!("igcl_init: {}", error_name(code))));
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.initialized {
            let code = unsafe { (self.igcl().shutdown)() };
            if code != IGCL_SUCCESS {
                log::debug!("igcl_shutdown: {}", error_name(code));
            }
            self.initialized = false;
        }
    }

    /// Integrated graphics show up as one device when IGCL does not say otherwise
    fn device_count(&self) -> Result<u32, BackendError> {
        let mut count: u32 = 0;
        let code = unsafe { (self.igcl().get_device_count)(&mut count) };
        if code != IGCL_SUCCESS {
            log::debug!("igcl_get_device_count: {}, assuming 1", error_name(code));
            return Ok(1);
        }
        Ok(count)
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError> {
        let mut raw = IgclDeviceInfo {
            device_id: 0,
            device_name: [0; 256],
            vendor_id: 0,
            total_memory: 0,
        };
        let code = unsafe { (self.igcl().get_device_info)(index, &mut raw) };

        if code != IGCL_SUCCESS {
            log::debug!("igcl_get_device_info({}): {}", index, error_name(code));
            return Ok(DeviceInfo::new(index, self.fallback_name(), self.estimate.capacity()));
        }

        Ok(device_info_from(index, &raw, &self.estimate))
    }

    fn device_stats(&mut self, index: u32) -> Result<DeviceStats, BackendError> {
        let mut raw = IgclDeviceStats::default();
        let code = unsafe { (self.igcl().get_device_stats)(index, &mut raw) };
        if code != IGCL_SUCCESS {
            return Err(translate(code, "igcl_get_device_stats"));
        }
        Ok(stats_from(&raw))
    }
}

impl Drop for IntelBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Vendor-reported capacity wins; otherwise the shared-memory estimate
fn device_info_from(index: u32, raw: &IgclDeviceInfo, estimate: &SharedMemoryEstimate) -> DeviceInfo {
    let name = string_from_c_buf(&raw.device_name);
    let name = if name.trim().is_empty() {
        estimate
            .os_adapter_name
            .clone()
            .unwrap_or_else(|| GpuVendor::Intel.default_adapter_name().to_string())
    } else {
        name
    };

    let memory_total = if raw.total_memory > 0 {
        raw.total_memory
    } else {
        estimate.capacity()
    };

    DeviceInfo::new(index, name, memory_total)
}

fn stats_from(raw: &IgclDeviceStats) -> DeviceStats {
    DeviceStats {
        utilization_pct: raw.gpu_utilization as f64,
        memory_used: raw.memory_used,
        memory_free: raw.memory_total.saturating_sub(raw.memory_used),
        memory_total: Some(raw.memory_total).filter(|&total| total > 0),
        temperature: raw.temperature as f64,
        power_watts: milliwatts_to_watts(raw.power_usage),
    }
}

fn translate(code: IgclResult, operation: &str) -> BackendError {
    let message = format!("{}: {}", operation, error_name(code));
    match code {
        3 => BackendError::BackendInitFailed(message),
        _ => BackendError::DeviceQueryFailed(message),
    }
}

fn error_name(code: IgclResult) -> &'static str {
    match code {
        0 => "success",
        1 => "invalid argument",
        2 => "not supported",
        3 => "not initialized",
        4 => "device not found",
        _ => "unknown error",
    }
}
