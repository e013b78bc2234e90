use std::ffi::{c_char, c_int, c_longlong, c_void};
use std::path::PathBuf;

use log::info;

use crate::core::gpu::{BackendKind, DeviceInfo, DeviceStats, GpuBackend, GpuVendor};
use crate::error::BackendError;
use crate::platform::probe::{probe, string_from_c_buf, FunctionTable, LoadedLibrary, SymbolResolver};

/// AGS ships for Windows only
#[cfg(windows)]
pub const CANDIDATES: &[&str] = &[
    "C:\\Program Files\\AMD\\ags_lib\\lib\\amd_ags_x64.dll",
    "C:\\Program Files (x86)\\AMD\\ags_lib\\lib\\amd_ags_x86.dll",
    "C:\\Windows\\System32\\amd_ags_x64.dll",
    "C:\\Windows\\SysWOW64\\amd_ags_x86.dll",
    "amd_ags_x64.dll",
    "amd_ags_x86.dll",
];

#[cfg(not(windows))]
pub const CANDIDATES: &[&str] = &[];

type AgsReturnCode = c_int;
type AgsContext = c_void;

const AGS_SUCCESS: AgsReturnCode = 0;
const AGS_API_VERSION: c_int = 5;

#[repr(C)]
#[allow(dead_code)]
struct AgsDeviceInfo {
    adapter_index: c_int,
    vendor_id: c_int,
    device_id: c_int,
    revision_id: c_int,
    adapter_string: [c_char; 256],
    num_cus: c_int,
    num_wgps: c_int,
    num_rops: c_int,
    local_memory_in_bytes: c_longlong,
    shared_memory_in_bytes: c_longlong,
    memory_bandwidth: c_int,
    tera_flops: f32,
}

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct AgsGpuUsage {
    gpu_usage_percent: f32,
    memory_usage_percent: f32,
    memory_used_in_bytes: c_longlong,
    temperature_in_c: f32,
    fan_speed_percent: f32,
    engine_clock_in_mhz: f32,
    memory_clock_in_mhz: f32,
    power_usage_in_watts: f32,
}

#[repr(C)]
struct AgsGpuInfo {
    num_devices: c_int,
    devices: *mut AgsDeviceInfo,
}

pub struct AgsFunctions {
    initialize: unsafe extern "C" fn(
        c_int,
        *const c_void,
        *mut *mut AgsContext,
        *mut AgsGpuInfo,
    ) -> AgsReturnCode,
    deinitialize: unsafe extern "C" fn(*mut AgsContext) -> AgsReturnCode,
    get_gpu_memory_usage: unsafe extern "C" fn(*mut AgsContext, c_int, *mut AgsGpuUsage) -> AgsReturnCode,
}

impl FunctionTable for AgsFunctions {
    fn resolve(symbols: &SymbolResolver<'_>) -> Result<Self, String> {
        // SAFETY: signatures match the AGS declarations
        unsafe {
            Ok(Self {
                initialize: symbols.function(&["agsInitialize"])?,
                deinitialize: symbols.function(&["agsDeInitialize"])?,
                get_gpu_memory_usage: symbols.function(&["agsGetGPUMemoryUsage"])?,
            })
        }
    }
}

/// AMD GPU backend using AMD GPU Services.
///
/// Adapter metadata is only reported by `agsInitialize`, so it is captured
/// there and served from the cache afterwards.
pub struct AmdBackend {
    library: LoadedLibrary<AgsFunctions>,
    context: *mut AgsContext,
    adapters: Vec<DeviceInfo>,
}

impl AmdBackend {
    pub fn open(candidates: &[PathBuf]) -> Result<Self, BackendError> {
        Ok(Self {
            library: probe(candidates)?,
            context: std::ptr::null_mut(),
            adapters: Vec::new(),
        })
    }

    fn ags(&self) -> &AgsFunctions {
        self.library.table()
    }
}

impl GpuBackend for AmdBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vendor(GpuVendor::Amd)
    }

    fn source(&self) -> String {
        self.library.path().display().to_string()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        let mut context: *mut AgsContext = std::ptr::null_mut();
        let mut gpu_info = AgsGpuInfo {
            num_devices: 0,
            devices: std::ptr::null_mut(),
        };

        let code = unsafe {
            (self.ags().initialize)(AGS_API_VERSION, std::ptr::null(), &mut context, &mut gpu_info)
        };
        if code != AGS_SUCCESS {
            return Err(translate(code, "agsInitialize", true));
        }

        let devices: &[AgsDeviceInfo] = if gpu_info.devices.is_null() || gpu_info.num_devices <= 0 {
            &[]
        } else {
            // SAFETY: AGS owns an array of `num_devices` entries that lives
            // until agsDeInitialize; it is copied out before returning.
            unsafe { std::slice::from_raw_parts(gpu_info.devices, gpu_info.num_devices as usize) }
        };

        self.adapters = devices
            .iter()
            .enumerate()
            .map(|(index, raw)| adapter_info(index as u32, raw))
            .collect();
        self.context = context;

        info!("AGS reported {} adapter(s)", self.adapters.len());
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.context.is_null() {
            let code = unsafe { (self.ags().deinitialize)(self.context) };
            if code != AGS_SUCCESS {
                log::debug!("agsDeInitialize: {}", error_name(code));
            }
            self.context = std::ptr::null_mut();
        }
        self.adapters.clear();
    }

    fn device_count(&self) -> Result<u32, BackendError> {
        Ok(self.adapters.len() as u32)
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError> {
        self.adapters
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BackendError::query_failed(format!("no AMD adapter {}", index)))
    }

    fn device_stats(&mut self, index: u32) -> Result<DeviceStats, BackendError> {
        let total = self.device_info(index)?.memory_total;

        let mut usage = AgsGpuUsage::default();
        let code = unsafe {
            (self.ags().get_gpu_memory_usage)(self.context, index as c_int, &mut usage)
        };
        if code != AGS_SUCCESS {
            return Err(translate(code, "agsGetGPUMemoryUsage", false));
        }

        Ok(usage_stats(&usage, total))
    }
}

impl Drop for AmdBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn adapter_info(index: u32, raw: &AgsDeviceInfo) -> DeviceInfo {
    let mut info = DeviceInfo::new(
        index,
        string_from_c_buf(&raw.adapter_string),
        raw.local_memory_in_bytes.max(0) as u64,
    );
    info.compute_units = u32::try_from(raw.num_cus).ok().filter(|&n| n > 0);
    info.peak_tflops = Some(raw.tera_flops).filter(|t| t.is_finite() && *t > 0.0);
    info
}

/// AGS already reports watts and degrees Celsius
fn usage_stats(raw: &AgsGpuUsage, memory_total: u64) -> DeviceStats {
    let memory_used = raw.memory_used_in_bytes.max(0) as u64;
    DeviceStats {
        utilization_pct: raw.gpu_usage_percent as f64,
        memory_used,
        memory_free: memory_total.saturating_sub(memory_used),
        memory_total: None,
        temperature: raw.temperature_in_c as f64,
        power_watts: raw.power_usage_in_watts as f64,
    }
}

fn translate(code: AgsReturnCode, operation: &str, during_init: bool) -> BackendError {
    let message = format!("{}: {}", operation, error_name(code));
    match code {
        // Missing D3D, legacy driver, no AMD driver installed
        -6..=-4 => BackendError::BackendInitFailed(message),
        _ if during_init => BackendError::BackendInitFailed(message),
        _ => BackendError::DeviceQueryFailed(message),
    }
}

fn error_name(code: AgsReturnCode) -> &'static str {
    match code {
        0 => "success",
        -1 => "failure",
        -2 => "invalid arguments",
        -3 => "out of memory",
        -4 => "missing D3D DLL",
        -5 => "legacy driver",
        -6 => "no AMD driver installed",
        -7 => "extension not supported",
        -8 => "ADL failure",
        -9 => "DirectX failure",
        _ => "unknown error",
    }
}
