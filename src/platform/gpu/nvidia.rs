use std::ffi::{c_char, c_int, c_uint, c_ulonglong, c_void};
use std::path::PathBuf;

use crate::core::gpu::{
    milliwatts_to_watts, BackendKind, DeviceInfo, DeviceStats, GpuBackend, GpuVendor,
};
use crate::error::BackendError;
use crate::platform::probe::{probe, string_from_c_buf, FunctionTable, LoadedLibrary, SymbolResolver};

/// Library locations, most specific first
#[cfg(windows)]
pub const CANDIDATES: &[&str] = &[
    "C:\\Program Files\\NVIDIA Corporation\\NVSMI\\nvml.dll",
    "C:\\Windows\\System32\\nvml.dll",
    "nvml.dll",
];

#[cfg(not(windows))]
pub const CANDIDATES: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libnvidia-ml.so.1",
    "/usr/lib64/libnvidia-ml.so.1",
    "libnvidia-ml.so.1",
    "libnvidia-ml.so",
];

type NvmlReturn = c_int;
type NvmlDevice = *mut c_void;

const NVML_SUCCESS: NvmlReturn = 0;
const NVML_TEMPERATURE_GPU: c_int = 0;
const NAME_BUFFER_SIZE: usize = 256;

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct NvmlUtilization {
    gpu: c_uint,
    memory: c_uint,
}

#[repr(C)]
#[derive(Default)]
struct NvmlMemory {
    total: c_ulonglong,
    free: c_ulonglong,
    used: c_ulonglong,
}

/// NVML entry points, resolved all at once
pub struct NvmlFunctions {
    init: unsafe extern "C" fn() -> NvmlReturn,
    shutdown: unsafe extern "C" fn() -> NvmlReturn,
    device_get_count: unsafe extern "C" fn(*mut c_uint) -> NvmlReturn,
    device_get_handle_by_index: unsafe extern "C" fn(c_uint, *mut NvmlDevice) -> NvmlReturn,
    device_get_name: unsafe extern "C" fn(NvmlDevice, *mut c_char, c_uint) -> NvmlReturn,
    device_get_utilization_rates: unsafe extern "C" fn(NvmlDevice, *mut NvmlUtilization) -> NvmlReturn,
    device_get_memory_info: unsafe extern "C" fn(NvmlDevice, *mut NvmlMemory) -> NvmlReturn,
    device_get_temperature: unsafe extern "C" fn(NvmlDevice, c_int, *mut c_uint) -> NvmlReturn,
    device_get_power_usage: unsafe extern "C" fn(NvmlDevice, *mut c_uint) -> NvmlReturn,
}

impl FunctionTable for NvmlFunctions {
    fn resolve(symbols: &SymbolResolver<'_>) -> Result<Self, String> {
        // SAFETY: signatures match the NVML headers
        unsafe {
            Ok(Self {
                init: symbols.function(&["nvmlInit_v2", "nvmlInit"])?,
                shutdown: symbols.function(&["nvmlShutdown"])?,
                device_get_count: symbols.function(&["nvmlDeviceGetCount_v2", "nvmlDeviceGetCount"])?,
                device_get_handle_by_index: symbols
                    .function(&["nvmlDeviceGetHandleByIndex_v2", "nvmlDeviceGetHandleByIndex"])?,
                device_get_name: symbols.function(&["nvmlDeviceGetName"])?,
                device_get_utilization_rates: symbols.function(&["nvmlDeviceGetUtilizationRates"])?,
                device_get_memory_info: symbols.function(&["nvmlDeviceGetMemoryInfo"])?,
                device_get_temperature: symbols.function(&["nvmlDeviceGetTemperature"])?,
                device_get_power_usage: symbols.function(&["nvmlDeviceGetPowerUsage"])?,
            })
        }
    }
}

/// NVIDIA GPU backend using NVML
pub struct NvidiaBackend {
    library: LoadedLibrary<NvmlFunctions>,
    initialized: bool,
}

impl NvidiaBackend {
    /// Probe `candidates` for a complete NVML
    pub fn open(candidates: &[PathBuf]) -> Result<Self, BackendError> {
        Ok(Self {
            library: probe(candidates)?,
            initialized: false,
        })
    }

    fn nvml(&self) -> &NvmlFunctions {
        self.library.table()
    }

    fn device(&self, index: u32) -> Result<NvmlDevice, BackendError> {
        let mut device: NvmlDevice = std::ptr::null_mut();
        let code = unsafe { (self.nvml().device_get_handle_by_index)(index, &mut device) };
        check(code, "nvmlDeviceGetHandleByIndex")?;
        Ok(device)
    }

    fn utilization_rates(&self, device: NvmlDevice) -> Result<NvmlUtilization, BackendError> {
        let mut utilization = NvmlUtilization::default();
        let code = unsafe { (self.nvml().device_get_utilization_rates)(device, &mut utilization) };
        check(code, "nvmlDeviceGetUtilizationRates")?;
        Ok(utilization)
    }

    fn memory_info(&self, device: NvmlDevice) -> Result<NvmlMemory, BackendError> {
        let mut memory = NvmlMemory::default();
        let code = unsafe { (self.nvml().device_get_memory_info)(device, &mut memory) };
        check(code, "nvmlDeviceGetMemoryInfo")?;
        Ok(memory)
    }
}

impl GpuBackend for NvidiaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vendor(GpuVendor::Nvidia)
    }

    fn source(&self) -> String {
        self.library.path().display().to_string()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        let code = unsafe { (self.nvml().init)() };
        if code != NVML_SUCCESS {
            return Err(BackendError::init_failed(format!(
                "nvmlInit: {}",
                error_name(code)
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.initialized {
            let code = unsafe { (self.nvml().shutdown)() };
            if code != NVML_SUCCESS {
                log::debug!("nvmlShutdown: {}", error_name(code));
            }
            self.initialized = false;
        }
    }

    fn device_count(&self) -> Result<u32, BackendError> {
        let mut count: c_uint = 0;
        let code = unsafe { (self.nvml().device_get_count)(&mut count) };
        check(code, "nvmlDeviceGetCount")?;
        Ok(count)
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError> {
        let device = self.device(index)?;

        let mut buf = [0 as c_char; NAME_BUFFER_SIZE];
        let code = unsafe {
            (self.nvml().device_get_name)(device, buf.as_mut_ptr(), NAME_BUFFER_SIZE as c_uint)
        };
        let name = if code == NVML_SUCCESS {
            string_from_c_buf(&buf)
        } else {
            "Unknown NVIDIA GPU".to_string()
        };

        let memory_total = self.memory_info(device).map(|m| m.total).unwrap_or(0);

        Ok(DeviceInfo::new(index, name, memory_total))
    }

    fn device_stats(&mut self, index: u32) -> Result<DeviceStats, BackendError> {
        let device = self.device(index)?;
        let memory = self.memory_info(device)?;

        let gpu_utilization = self.utilization_rates(device).map(|u| u.gpu).unwrap_or(0);

        let mut temperature: c_uint = 0;
        let code = unsafe {
            (self.nvml().device_get_temperature)(device, NVML_TEMPERATURE_GPU, &mut temperature)
        };
        if code != NVML_SUCCESS {
            temperature = 0;
        }

        let mut milliwatts: c_uint = 0;
        let code = unsafe { (self.nvml().device_get_power_usage)(device, &mut milliwatts) };
        if code != NVML_SUCCESS {
            milliwatts = 0;
        }

        Ok(DeviceStats {
            utilization_pct: gpu_utilization as f64,
            memory_used: memory.used,
            memory_free: memory.free,
            memory_total: Some(memory.total),
            temperature: temperature as f64,
            power_watts: milliwatts_to_watts(milliwatts),
        })
    }

    fn utilization(&mut self, index: u32) -> Result<f64, BackendError> {
        let device = self.device(index)?;
        Ok(self.utilization_rates(device)?.gpu as f64)
    }
}

impl Drop for NvidiaBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check(code: NvmlReturn, operation: &str) -> Result<(), BackendError> {
    if code == NVML_SUCCESS {
        Ok(())
    } else {
        Err(translate(code, operation))
    }
}

/// Map an NVML return code onto the shared taxonomy
fn translate(code: NvmlReturn, operation: &str) -> BackendError {
    let message = format!("{}: {}", operation, error_name(code));
    match code {
        // Uninitialized, no permission, driver not loaded, library not found,
        // function not found, driver/library version mismatch
        1 | 4 | 9 | 12 | 13 | 18 => BackendError::BackendInitFailed(message),
        _ => BackendError::DeviceQueryFailed(message),
    }
}

fn error_name(code: NvmlReturn) -> &'static str {
    match code {
        0 => "success",
        1 => "uninitialized",
        2 => "invalid argument",
        3 => "not supported",
        4 => "no permission",
        5 => "already initialized",
        6 => "not found",
        7 => "insufficient size",
        8 => "insufficient power",
        9 => "driver not loaded",
        10 => "timeout",
        11 => "IRQ issue",
        12 => "library not found",
        13 => "function not found",
        14 => "corrupted inforom",
        15 => "GPU is lost",
        16 => "reset required",
        17 => "operating system error",
        18 => "library/driver version mismatch",
        19 => "in use",
        20 => "out of memory",
        21 => "no data",
        22 => "vGPU ECC not supported",
        23 => "insufficient resources",
        24 => "frequency not supported",
        25 => "argument version mismatch",
        26 => "deprecated",
        _ => "unknown error",
    }
}
