use std::fs;
use std::path::Path;
use std::time::Duration;

use gpustat::core::config::{Config, VendorPreference};
use gpustat::core::gpu::{BackendAttempt, GpuBackend, GpuSnapshot, InitStatus, Session};
use gpustat::platform::counters::sysfs::{self, SysfsQuery};
use gpustat::platform::counters::{AdapterIdentity, CounterBackend, CounterPaths};
use gpustat::BackendError;
use tempfile::TempDir;

const GIB: u64 = 1024 * 1024 * 1024;

fn write_attr(root: &Path, card: u32, name: &str, value: &str) {
    let dir = root.join(format!("card{}/device", card));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), value).unwrap();
}

/// amdgpu-style card at 42% busy with 2 of 8 GiB used
fn busy_card(root: &Path) {
    write_attr(root, 0, "gpu_busy_percent", "42\n");
    write_attr(root, 0, "mem_info_vram_used", &format!("{}\n", 2 * GIB));
    write_attr(root, 0, "mem_info_vram_total", &format!("{}\n", 8 * GIB));
    write_attr(root, 0, "vendor", "0x1002\n");
}

fn no_vendor_libraries() -> Vec<BackendAttempt> {
    vec![
        Err(BackendError::LibraryNotFound { tried: 4 }),
        Err(BackendError::LibraryNotFound { tried: 6 }),
        Err(BackendError::LibraryNotFound { tried: 6 }),
    ]
}

fn sysfs_backend(root: &Path, identity: AdapterIdentity) -> BackendAttempt {
    let card = sysfs::busy_card(root).unwrap_or(0);
    let query = SysfsQuery::new(root);
    let backend = CounterBackend::open(query, &CounterPaths::drm_card(card), identity, Duration::ZERO)?;
    Ok(Box::new(backend))
}

#[test]
fn test_counter_fallback_scenario() {
    let temp = TempDir::new().unwrap();
    busy_card(temp.path());
    let identity = AdapterIdentity::resolve(None, &Config::default(), 32 * GIB);

    let mut session = Session::select(no_vendor_libraries(), || sysfs_backend(temp.path(), identity));

    assert_eq!(session.status(), InitStatus::Ready);
    assert_eq!(session.state().name(), "fallback");
    assert_eq!(session.get_usage(), 42);

    let snapshot: GpuSnapshot = serde_json::from_str(&session.get_info_json().unwrap()).unwrap();
    assert_eq!(snapshot.gpus.len(), 1);
    let gpu = &snapshot.gpus[0];
    assert_eq!(gpu.index, 0);
    assert_eq!(gpu.memory_utilization_pct, 25);
    assert_eq!(gpu.memory_total, 8 * GIB);
    assert_eq!(gpu.memory_used, 2 * GIB);
    assert_eq!(gpu.memory_free, 6 * GIB);
    assert_eq!(gpu.temperature, 0.0);
    assert_eq!(gpu.power_usage, 0.0);
}

#[test]
fn test_empty_tree_leaves_no_backend() {
    let temp = TempDir::new().unwrap();
    let identity = AdapterIdentity::resolve(None, &Config::default(), 32 * GIB);

    let mut session = Session::select(no_vendor_libraries(), || sysfs_backend(temp.path(), identity));

    assert_eq!(session.status(), InitStatus::NoLibrary);
    assert_eq!(session.get_count(), -1);
    assert_eq!(session.get_info_json(), None);
}

#[test]
fn test_utilization_without_memory_counter() {
    let temp = TempDir::new().unwrap();
    write_attr(temp.path(), 2, "gpu_busy_percent", "17");
    let identity = AdapterIdentity::resolve(None, &Config::default(), 32 * GIB);

    let mut session = Session::select(no_vendor_libraries(), || sysfs_backend(temp.path(), identity));
    let snapshot = session.snapshot().unwrap();

    let gpu = &snapshot.gpus[0];
    assert_eq!(gpu.gpu_utilization_pct, 17);
    assert_eq!(gpu.memory_used, 0);
    assert_eq!(gpu.memory_utilization_pct, 0);
    // No capacity counter: discrete assumption
    assert_eq!(gpu.memory_total, 8 * GIB);
    assert_eq!(gpu.name, "Generic Graphics Adapter");
}

#[test]
fn test_integrated_estimate_without_capacity_counter() {
    let temp = TempDir::new().unwrap();
    write_attr(temp.path(), 0, "gpu_busy_percent", "3");
    write_attr(temp.path(), 0, "mem_info_vram_used", &format!("{}", GIB));
    let config = Config {
        vendor: VendorPreference::Intel,
        integrated_memory_divisor: 4,
        ..Default::default()
    };
    let identity = AdapterIdentity::resolve(None, &config, 16 * GIB);

    let mut backend = match sysfs_backend(temp.path(), identity) {
        Ok(backend) => backend,
        Err(e) => panic!("counter backend failed: {}", e),
    };
    backend.initialize().unwrap();

    let info = backend.device_info(0).unwrap();
    assert_eq!(info.name, "Intel Integrated Graphics");
    assert_eq!(info.memory_total, 4 * GIB);

    let stats = backend.device_stats(0).unwrap();
    assert_eq!(stats.memory_used, GIB);
    assert_eq!(stats.memory_free, 3 * GIB);
}

#[test]
fn test_attribute_vanishing_mid_session_reads_zero() {
    let temp = TempDir::new().unwrap();
    busy_card(temp.path());
    let identity = AdapterIdentity::resolve(None, &Config::default(), 32 * GIB);

    let mut session = Session::select(no_vendor_libraries(), || sysfs_backend(temp.path(), identity));
    assert_eq!(session.get_usage(), 42);

    fs::remove_dir_all(temp.path().join("card0")).unwrap();
    assert_eq!(session.get_usage(), 0);
    assert_eq!(session.state().name(), "fallback");
}

#[cfg(not(windows))]
#[test]
fn test_platform_fallback_reads_configured_drm_root() {
    let temp = TempDir::new().unwrap();
    busy_card(temp.path());
    let config = Config {
        drm_root: temp.path().to_path_buf(),
        warmup_delay_ms: 0,
        ..Default::default()
    };

    let mut session = Session::select(no_vendor_libraries(), || {
        gpustat::platform::open_counter_backend(&config)
    });

    assert_eq!(session.state().name(), "fallback");
    assert_eq!(session.get_usage(), 42);
    assert!(session.describe().contains("sysfs"));

    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.gpus[0].name, "AMD Graphics Card");
    assert_eq!(snapshot.gpus[0].memory_utilization_pct, 25);
}

#[cfg(not(windows))]
#[test]
fn test_hybrid_machine_reports_the_busy_card() {
    let temp = TempDir::new().unwrap();
    // Intel iGPU without counters ahead of an amdgpu card
    write_attr(temp.path(), 0, "vendor", "0x8086\n");
    write_attr(temp.path(), 1, "vendor", "0x1002\n");
    write_attr(temp.path(), 1, "gpu_busy_percent", "70\n");
    write_attr(temp.path(), 1, "mem_info_vram_used", &format!("{}\n", GIB));
    let config = Config {
        drm_root: temp.path().to_path_buf(),
        warmup_delay_ms: 0,
        ..Default::default()
    };

    let mut session = Session::select(no_vendor_libraries(), || {
        gpustat::platform::open_counter_backend(&config)
    });
    assert_eq!(session.get_usage(), 70);

    let snapshot = session.snapshot().unwrap();
    let gpu = &snapshot.gpus[0];
    assert_eq!(gpu.name, "AMD Graphics Card");
    assert_eq!(gpu.memory_total, config.discrete_fallback_memory_bytes);
    assert_eq!(gpu.memory_used, GIB);
    assert_eq!(gpu.memory_free, config.discrete_fallback_memory_bytes - GIB);
    assert_eq!(gpu.memory_utilization_pct, 12);
}

#[cfg(not(windows))]
#[test]
fn test_capacity_read_from_the_busy_card() {
    let temp = TempDir::new().unwrap();
    write_attr(temp.path(), 0, "mem_info_vram_total", &format!("{}\n", 2 * GIB));
    write_attr(temp.path(), 1, "gpu_busy_percent", "5\n");
    write_attr(temp.path(), 1, "mem_info_vram_total", &format!("{}\n", 16 * GIB));
    let config = Config {
        drm_root: temp.path().to_path_buf(),
        warmup_delay_ms: 0,
        ..Default::default()
    };

    let mut session = Session::select(no_vendor_libraries(), || {
        gpustat::platform::open_counter_backend(&config)
    });
    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.gpus[0].memory_total, 16 * GIB);
}
