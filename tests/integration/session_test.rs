use std::cell::Cell;
use std::rc::Rc;

use gpustat::core::gpu::{
    BackendAttempt, BackendKind, DeviceInfo, DeviceStats, GpuBackend, GpuSnapshot, GpuVendor,
    InitStatus, Session,
};
use gpustat::BackendError;

const GIB: u64 = 1024 * 1024 * 1024;

/// Scripted vendor backend
struct FakeVendor {
    devices: u32,
    failing_device: Option<u32>,
    utilization_unknown: bool,
    init_error: Option<BackendError>,
    initialized: Rc<Cell<u32>>,
    shutdowns: Rc<Cell<u32>>,
    stats_calls: Rc<Cell<u32>>,
}

impl FakeVendor {
    fn new(devices: u32) -> Self {
        Self {
            devices,
            failing_device: None,
            utilization_unknown: false,
            init_error: None,
            initialized: Rc::new(Cell::new(0)),
            shutdowns: Rc::new(Cell::new(0)),
            stats_calls: Rc::new(Cell::new(0)),
        }
    }
}

impl GpuBackend for FakeVendor {
    fn kind(&self) -> BackendKind {
        BackendKind::Vendor(GpuVendor::Nvidia)
    }

    fn source(&self) -> String {
        "fake-vendor".to_string()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        self.initialized.set(self.initialized.get() + 1);
        match self.init_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        self.shutdowns.set(self.shutdowns.get() + 1);
    }

    fn device_count(&self) -> Result<u32, BackendError> {
        Ok(self.devices)
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError> {
        Ok(DeviceInfo::new(index, format!("Fake GPU {}", index), 8 * GIB))
    }

    fn device_stats(&mut self, index: u32) -> Result<DeviceStats, BackendError> {
        self.stats_calls.set(self.stats_calls.get() + 1);
        if self.failing_device == Some(index) {
            return Err(BackendError::query_failed("GPU is lost"));
        }
        Ok(DeviceStats {
            utilization_pct: 63.0,
            memory_used: 2 * GIB,
            memory_free: 6 * GIB,
            memory_total: Some(8 * GIB),
            temperature: 64.0,
            power_watts: 180.456,
        })
    }

    fn utilization(&mut self, index: u32) -> Result<f64, BackendError> {
        if self.utilization_unknown {
            return Err(BackendError::query_failed("utilization not supported"));
        }
        Ok(self.device_stats(index)?.utilization_pct)
    }
}

/// Counter-style fallback that always answers
struct FakeCounters {
    utilization: f64,
}

impl GpuBackend for FakeCounters {
    fn kind(&self) -> BackendKind {
        BackendKind::Counters
    }

    fn source(&self) -> String {
        "fake-counters".to_string()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn device_count(&self) -> Result<u32, BackendError> {
        Ok(1)
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError> {
        Ok(DeviceInfo::new(index, "Generic Graphics Adapter", 8 * GIB))
    }

    fn device_stats(&mut self, _index: u32) -> Result<DeviceStats, BackendError> {
        Ok(DeviceStats {
            utilization_pct: self.utilization,
            memory_used: 2 * GIB,
            ..Default::default()
        })
    }
}

fn not_found() -> BackendAttempt {
    Err(BackendError::LibraryNotFound { tried: 4 })
}

fn no_counters() -> BackendAttempt {
    Err(BackendError::counter_unavailable("no utilization counter"))
}

fn parse(json: &str) -> GpuSnapshot {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_vendor_with_transient_device_failure() {
    let mut vendor = FakeVendor::new(2);
    vendor.failing_device = Some(1);

    let mut session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], no_counters);
    assert_eq!(session.status(), InitStatus::Ready);
    assert_eq!(session.state().name(), "vendor");

    let snapshot = parse(&session.get_info_json().unwrap());
    assert_eq!(snapshot.gpus.len(), 2);

    let first = &snapshot.gpus[0];
    assert_eq!(first.name, "Fake GPU 0");
    assert_eq!(first.gpu_utilization_pct, 63);
    assert_eq!(first.memory_utilization_pct, 25);
    assert_eq!(first.memory_free, 6 * GIB);
    assert_eq!(first.power_usage, 180.46);

    let second = &snapshot.gpus[1];
    assert_eq!(second.index, 1);
    assert_eq!(second.name, "Fake GPU 1");
    assert_eq!(second.gpu_utilization_pct, 0);
    assert_eq!(second.memory_used, 0);
    assert_eq!(second.temperature, 0.0);
    assert_eq!(second.power_usage, 0.0);

    // Still on the vendor backend after the failure
    assert_eq!(session.state().name(), "vendor");
}

#[test]
fn test_fallback_when_no_vendor_library() {
    let mut session = Session::select(vec![not_found(), not_found(), not_found()], || {
        Ok(Box::new(FakeCounters { utilization: 42.0 }) as Box<dyn GpuBackend>)
    });

    assert_eq!(session.status(), InitStatus::Ready);
    assert_eq!(session.state().name(), "fallback");
    assert_eq!(session.kind(), Some(BackendKind::Counters));
    assert_eq!(session.get_count(), 1);
    assert_eq!(session.get_usage(), 42);

    let snapshot = parse(&session.get_info_json().unwrap());
    assert_eq!(snapshot.gpus.len(), 1);
    assert_eq!(snapshot.gpus[0].memory_utilization_pct, 25);
    assert_eq!(snapshot.gpus[0].memory_total, 8 * GIB);
}

#[test]
fn test_everything_unavailable() {
    let mut session = Session::select(vec![not_found()], no_counters);

    assert_eq!(session.status(), InitStatus::NoLibrary);
    assert_eq!(session.status().code(), -1);
    assert!(!session.is_available());
    assert_eq!(session.get_count(), -1);
    assert_eq!(session.get_info_json(), None);
    assert_eq!(session.get_usage(), -1);
}

#[test]
fn test_rejected_library_reports_minus_two() {
    let rejected: BackendAttempt = Err(BackendError::SymbolMissing {
        path: "nvml.dll".to_string(),
        symbol: "nvmlDeviceGetPowerUsage".to_string(),
    });
    let session = Session::select(vec![rejected, not_found()], no_counters);
    assert_eq!(session.status(), InitStatus::LibraryRejected);
    assert_eq!(session.status().code(), -2);
}

#[test]
fn test_failed_initialize_falls_back_and_releases_vendor() {
    let mut vendor = FakeVendor::new(1);
    vendor.init_error = Some(BackendError::init_failed("driver not loaded"));
    let shutdowns = vendor.shutdowns.clone();

    let session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], || {
        Ok(Box::new(FakeCounters { utilization: 5.0 }) as Box<dyn GpuBackend>)
    });

    assert_eq!(session.state().name(), "fallback");
    assert_eq!(shutdowns.get(), 1);
}

#[test]
fn test_first_working_vendor_stops_probing() {
    let probed = Rc::new(Cell::new(0u32));
    let counter = probed.clone();
    let attempts = (0..3).map(move |_| {
        counter.set(counter.get() + 1);
        Ok(Box::new(FakeVendor::new(1)) as Box<dyn GpuBackend>)
    });

    let session = Session::select(attempts, no_counters);
    assert_eq!(session.state().name(), "vendor");
    assert_eq!(probed.get(), 1);
}

#[test]
fn test_fallback_not_consulted_when_vendor_works() {
    let consulted = Cell::new(false);
    let session = Session::select(vec![Ok(Box::new(FakeVendor::new(1)) as Box<dyn GpuBackend>)], || {
        consulted.set(true);
        no_counters()
    });
    assert_eq!(session.state().name(), "vendor");
    assert!(!consulted.get());
}

#[test]
fn test_record_count_matches_device_count() {
    for devices in [0u32, 1, 3, 8] {
        let mut session =
            Session::select(vec![Ok(Box::new(FakeVendor::new(devices)) as Box<dyn GpuBackend>)], no_counters);
        let snapshot = parse(&session.get_info_json().unwrap());
        assert_eq!(snapshot.gpus.len(), devices as usize);
        assert_eq!(session.get_count(), devices as i32);
    }
}

#[test]
fn test_zero_devices_serialize_to_empty_list() {
    let mut session = Session::select(vec![Ok(Box::new(FakeVendor::new(0)) as Box<dyn GpuBackend>)], no_counters);
    assert_eq!(session.get_info_json().unwrap(), r#"{"gpus":[]}"#);
}

#[test]
fn test_double_shutdown_releases_once() {
    let vendor = FakeVendor::new(1);
    let shutdowns = vendor.shutdowns.clone();

    let mut session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], no_counters);
    session.shutdown();
    session.shutdown();
    drop(session);

    assert_eq!(shutdowns.get(), 1);
}

#[test]
fn test_drop_shuts_backend_down() {
    let vendor = FakeVendor::new(1);
    let shutdowns = vendor.shutdowns.clone();

    {
        let _session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], no_counters);
    }

    assert_eq!(shutdowns.get(), 1);
}

#[test]
fn test_usage_unknown_when_device_zero_sample_fails() {
    let mut vendor = FakeVendor::new(2);
    vendor.failing_device = Some(0);

    let mut session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], no_counters);
    assert_eq!(session.get_usage(), -1);
    assert_eq!(session.state().name(), "vendor");
}

#[test]
fn test_usage_unknown_while_snapshot_still_has_memory() {
    let mut vendor = FakeVendor::new(1);
    vendor.utilization_unknown = true;

    let mut session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], no_counters);
    assert_eq!(session.get_usage(), -1);

    let snapshot = parse(&session.get_info_json().unwrap());
    assert_eq!(snapshot.gpus[0].memory_used, 2 * GIB);
}

#[test]
fn test_queries_after_shutdown_are_unavailable() {
    let mut session = Session::select(vec![Ok(Box::new(FakeVendor::new(2)) as Box<dyn GpuBackend>)], no_counters);
    assert_eq!(session.status(), InitStatus::Ready);
    session.shutdown();
    assert_eq!(session.status(), InitStatus::Released);
    assert_eq!(session.status().code(), -1);
    assert_eq!(session.get_count(), -1);
    assert_eq!(session.get_usage(), -1);
    assert_eq!(session.get_info_json(), None);
}

#[test]
fn test_each_query_takes_a_fresh_sample() {
    let vendor = FakeVendor::new(2);
    let stats_calls = vendor.stats_calls.clone();

    let mut session = Session::select(vec![Ok(Box::new(vendor) as Box<dyn GpuBackend>)], no_counters);
    session.get_info_json().unwrap();
    session.get_info_json().unwrap();
    session.get_usage();

    assert_eq!(stats_calls.get(), 5);
}

#[test]
fn test_fallback_stays_selected_across_queries() {
    let mut session = Session::select(vec![not_found()], || {
        Ok(Box::new(FakeCounters { utilization: 250.0 }) as Box<dyn GpuBackend>)
    });

    for _ in 0..5 {
        assert_eq!(session.get_usage(), 100);
        assert_eq!(session.state().name(), "fallback");
    }
}

#[test]
fn test_snapshot_fills_info_cache() {
    let mut session = Session::select(vec![Ok(Box::new(FakeVendor::new(2)) as Box<dyn GpuBackend>)], no_counters);
    assert!(session.cached_infos().is_empty());

    session.snapshot().unwrap();
    let infos = session.cached_infos();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[1].name, "Fake GPU 1");

    session.shutdown();
    assert!(session.cached_infos().is_empty());
}
