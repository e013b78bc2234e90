//! Vendor telemetry adapters.
//!
//! Each adapter is compiled behind its cargo feature. A disabled vendor still
//! takes its slot in the probe order and reports `LibraryNotFound`.

#[cfg(feature = "amd")]
pub mod amd;
#[cfg(feature = "intel")]
pub mod intel;
#[cfg(feature = "nvidia")]
pub mod nvidia;

use log::debug;

use crate::core::config::Config;
use crate::core::gpu::{BackendAttempt, GpuVendor};

/// Probe attempts for every vendor the configuration allows, in order.
///
/// The iterator is lazy: a vendor's library is only probed when the previous
/// vendor failed to come up.
pub fn vendor_attempts(config: &Config) -> impl Iterator<Item = BackendAttempt> + '_ {
    config
        .vendor
        .probe_order()
        .into_iter()
        .map(move |vendor| open_vendor(vendor, config))
}

/// Probe one vendor's library without initializing it
pub fn open_vendor(vendor: GpuVendor, config: &Config) -> BackendAttempt {
    debug!("Probing {} telemetry library", vendor.display_name());
    match vendor {
        GpuVendor::Nvidia => open_nvidia(config),
        GpuVendor::Amd => open_amd(config),
        GpuVendor::Intel => open_intel(config),
        GpuVendor::Unknown => Err(crate::error::BackendError::LibraryNotFound { tried: 0 }),
    }
}

#[cfg(feature = "nvidia")]
fn open_nvidia(config: &Config) -> BackendAttempt {
    let candidates = crate::platform::probe::candidate_list(&config.extra_library_paths, nvidia::CANDIDATES);
    Ok(Box::new(nvidia::NvidiaBackend::open(&candidates)?))
}

#[cfg(not(feature = "nvidia"))]
fn open_nvidia(_config: &Config) -> BackendAttempt {
    disabled(GpuVendor::Nvidia)
}

#[cfg(feature = "amd")]
fn open_amd(config: &Config) -> BackendAttempt {
    let candidates = crate::platform::probe::candidate_list(&config.extra_library_paths, amd::CANDIDATES);
    Ok(Box::new(amd::AmdBackend::open(&candidates)?))
}

#[cfg(not(feature = "amd"))]
fn open_amd(_config: &Config) -> BackendAttempt {
    disabled(GpuVendor::Amd)
}

#[cfg(feature = "intel")]
fn open_intel(config: &Config) -> BackendAttempt {
    let candidates = crate::platform::probe::candidate_list(&config.extra_library_paths, intel::CANDIDATES);
    let estimate = intel::SharedMemoryEstimate {
        system_memory: crate::platform::system::total_memory_bytes(),
        divisor: config.integrated_divisor(),
        os_adapter_name: crate::platform::system::display_adapter_name(),
    };
    Ok(Box::new(intel::IntelBackend::open(&candidates, estimate)?))
}

#[cfg(not(feature = "intel"))]
fn open_intel(_config: &Config) -> BackendAttempt {
    disabled(GpuVendor::Intel)
}

#[allow(dead_code)]
fn disabled(vendor: GpuVendor) -> BackendAttempt {
    debug!("{} support not enabled in this build", vendor.display_name());
    Err(crate::error::BackendError::LibraryNotFound { tried: 0 })
}
