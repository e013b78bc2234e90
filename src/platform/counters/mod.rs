//! OS performance-counter fallback.
//!
//! Used when no vendor library comes up. One query is opened, a utilization
//! counter is required and memory and capacity counters are optional. The
//! backend always answers with a number: a failed collection reads as 0.

#[cfg(windows)]
pub mod pdh;
pub mod sysfs;

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::core::config::{Config, VendorPreference};
use crate::core::gpu::{
    detect_vendor, BackendAttempt, BackendKind, DeviceInfo, DeviceStats, GpuBackend, GpuVendor,
};
use crate::error::BackendError;

/// An open counter query on some OS facility
pub trait CounterQuery {
    type Counter: Copy;

    /// Register a counter path. Fails if the path does not exist here.
    fn add_counter(&mut self, path: &str) -> Result<Self::Counter, BackendError>;

    /// Take a fresh sample of every registered counter
    fn collect(&mut self) -> Result<(), BackendError>;

    /// Latest collected value as a float, summed over wildcard instances
    fn read_double(&self, counter: Self::Counter) -> Result<f64, BackendError>;

    /// Latest collected value as an integer, summed over wildcard instances
    fn read_large(&self, counter: Self::Counter) -> Result<u64, BackendError>;

    fn close(&mut self);

    fn source(&self) -> String;
}

/// Candidate counter paths in priority order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterPaths {
    pub utilization: Vec<String>,
    pub memory: Vec<String>,
    pub capacity: Vec<String>,
}

impl CounterPaths {
    /// PDH paths. The vendor-named counter objects are driver-specific; with
    /// no preference the AMD list is tried before the Intel one.
    pub fn pdh(vendor: VendorPreference) -> Self {
        let vendors = match vendor.vendor() {
            Some(v) => vec![v],
            None => vec![GpuVendor::Amd, GpuVendor::Intel],
        };

        let mut paths = Self::default();
        for vendor in vendors {
            let object = pdh_object(vendor);
            // Integrated adapters account their memory as shared
            let process_memory = if vendor == GpuVendor::Intel {
                "\\GPU Process Memory(*)\\Shared Usage"
            } else {
                "\\GPU Process Memory(*)\\Dedicated Usage"
            };

            let utilization = [
                Some("\\GPU Engine(*)\\Utilization Percentage".to_string()),
                object.map(|o| format!("\\{}\\GPU Utilization", o)),
                Some(process_memory.to_string()),
                Some("\\GPU Engine(engtype_3D)\\Utilization Percentage".to_string()),
            ];
            let memory = [
                Some("\\GPU Process Memory(*)\\Dedicated Usage".to_string()),
                Some("\\GPU Process Memory(*)\\Shared Usage".to_string()),
                object.map(|o| format!("\\{}\\Memory Usage", o)),
            ];

            push_unique(&mut paths.utilization, utilization.into_iter().flatten());
            push_unique(&mut paths.memory, memory.into_iter().flatten());
        }
        paths
    }

    /// DRM sysfs attributes of one card, relative to the DRM class root
    pub fn drm_card(card: u32) -> Self {
        Self {
            utilization: vec![sysfs::card_attribute(card, "gpu_busy_percent")],
            memory: vec![sysfs::card_attribute(card, "mem_info_vram_used")],
            capacity: vec![sysfs::card_attribute(card, "mem_info_vram_total")],
        }
    }
}

/// Driver counter object a vendor registers with PDH, if any
fn pdh_object(vendor: GpuVendor) -> Option<&'static str> {
    match vendor {
        GpuVendor::Amd => Some("AMD Graphics"),
        GpuVendor::Intel => Some("Intel(R) Graphics"),
        GpuVendor::Nvidia | GpuVendor::Unknown => None,
    }
}

fn push_unique(list: &mut Vec<String>, paths: impl Iterator<Item = String>) {
    for path in paths {
        if !list.contains(&path) {
            list.push(path);
        }
    }
}

/// What the fallback knows about the adapter without a vendor API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterIdentity {
    pub name: String,
    pub integrated: bool,
    pub system_memory: u64,
    pub integrated_divisor: u64,
    pub discrete_memory: u64,
}

impl AdapterIdentity {
    /// Name from the OS if it has one. Integrated means Intel by name or by
    /// preference.
    pub fn resolve(name: Option<String>, config: &Config, system_memory: u64) -> Self {
        let preferred = config.vendor.vendor();
        let name = name.unwrap_or_else(|| {
            preferred
                .unwrap_or(GpuVendor::Unknown)
                .default_adapter_name()
                .to_string()
        });
        let integrated =
            detect_vendor(&name) == GpuVendor::Intel || preferred == Some(GpuVendor::Intel);

        Self {
            name,
            integrated,
            system_memory,
            integrated_divisor: config.integrated_divisor(),
            discrete_memory: config.discrete_fallback_memory_bytes,
        }
    }

    /// Capacity to report when no counter measures it
    pub fn estimated_memory(&self) -> u64 {
        if self.integrated {
            self.system_memory / self.integrated_divisor.max(1)
        } else {
            self.discrete_memory
        }
    }
}

/// Single-device backend over an OS counter query
pub struct CounterBackend<Q: CounterQuery> {
    query: Q,
    utilization: Q::Counter,
    memory: Option<Q::Counter>,
    capacity: Option<Q::Counter>,
    identity: AdapterIdentity,
    warmup: Duration,
    open: bool,
}

impl<Q: CounterQuery> CounterBackend<Q> {
    /// Register counters on `query`, first matching path per kind.
    ///
    /// Without a utilization counter the query is closed and the backend is
    /// unavailable. A missing memory counter only degrades memory to 0.
    pub fn open(
        mut query: Q,
        paths: &CounterPaths,
        identity: AdapterIdentity,
        warmup: Duration,
    ) -> Result<Self, BackendError> {
        let Some(utilization) = first_counter(&mut query, &paths.utilization) else {
            query.close();
            return Err(BackendError::counter_unavailable(format!(
                "no utilization counter registered on {}",
                query.source()
            )));
        };

        let memory = first_counter(&mut query, &paths.memory);
        if memory.is_none() {
            warn!("No GPU memory counter on {}, memory will read 0", query.source());
        }
        let capacity = first_counter(&mut query, &paths.capacity);

        Ok(Self {
            query,
            utilization,
            memory,
            capacity,
            identity,
            warmup,
            open: true,
        })
    }

    fn measured_capacity(&self) -> Option<u64> {
        let counter = self.capacity?;
        self.query.read_large(counter).ok().filter(|&total| total > 0)
    }
}

fn first_counter<Q: CounterQuery>(query: &mut Q, paths: &[String]) -> Option<Q::Counter> {
    paths.iter().find_map(|path| match query.add_counter(path) {
        Ok(counter) => {
            debug!("Registered counter {}", path);
            Some(counter)
        }
        Err(e) => {
            debug!("Counter {} unavailable: {}", path, e);
            None
        }
    })
}

impl<Q: CounterQuery> GpuBackend for CounterBackend<Q> {
    fn kind(&self) -> BackendKind {
        BackendKind::Counters
    }

    fn source(&self) -> String {
        self.query.source()
    }

    /// One warm-up collection, then a fixed wait so rate counters have two samples
    fn initialize(&mut self) -> Result<(), BackendError> {
        if let Err(e) = self.query.collect() {
            debug!("Warm-up collection failed: {}", e);
        }
        if !self.warmup.is_zero() {
            thread::sleep(self.warmup);
        }
        info!("Counter fallback ready for {}", self.identity.name);
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.open {
            self.query.close();
            self.open = false;
        }
    }

    fn device_count(&self) -> Result<u32, BackendError> {
        Ok(1)
    }

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError> {
        if index != 0 {
            return Err(BackendError::query_failed(format!(
                "counter fallback only exposes device 0, not {}",
                index
            )));
        }
        let memory_total = self
            .measured_capacity()
            .unwrap_or_else(|| self.identity.estimated_memory());
        Ok(DeviceInfo::new(0, self.identity.name.clone(), memory_total))
    }

    fn device_stats(&mut self, index: u32) -> Result<DeviceStats, BackendError> {
        if index != 0 {
            return Err(BackendError::query_failed(format!(
                "counter fallback only exposes device 0, not {}",
                index
            )));
        }

        if let Err(e) = self.query.collect() {
            debug!("Counter collection failed: {}", e);
            return Ok(DeviceStats::default());
        }

        let utilization_pct = self.query.read_double(self.utilization).unwrap_or(0.0);
        let memory_used = self
            .memory
            .and_then(|counter| self.query.read_large(counter).ok())
            .unwrap_or(0);
        let memory_total = self.measured_capacity();
        let total_for_free = memory_total.unwrap_or_else(|| self.identity.estimated_memory());

        Ok(DeviceStats {
            utilization_pct,
            memory_used,
            memory_free: total_for_free.saturating_sub(memory_used),
            memory_total,
            ..Default::default()
        })
    }
}

impl<Q: CounterQuery> Drop for CounterBackend<Q> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Open the counter source for this platform
pub fn open_counter_backend(config: &Config) -> BackendAttempt {
    let warmup = Duration::from_millis(config.warmup_delay_ms);
    let system_memory = crate::platform::system::total_memory_bytes();
    open_platform_counters(config, warmup, system_memory)
}

#[cfg(windows)]
fn open_platform_counters(config: &Config, warmup: Duration, system_memory: u64) -> BackendAttempt {
    let identity = AdapterIdentity::resolve(
        crate::platform::system::display_adapter_name(),
        config,
        system_memory,
    );
    let query = pdh::PdhQuery::open()?;
    let backend = CounterBackend::open(query, &CounterPaths::pdh(config.vendor), identity, warmup)?;
    Ok(Box::new(backend))
}

#[cfg(not(windows))]
fn open_platform_counters(config: &Config, warmup: Duration, system_memory: u64) -> BackendAttempt {
    let root = &config.drm_root;
    let Some(card) = sysfs::busy_card(root) else {
        return Err(BackendError::counter_unavailable(format!(
            "no DRM card under {} reports gpu_busy_percent",
            root.display()
        )));
    };
    debug!("Reading counters from card{}", card);

    // Counters and identity come from the same card
    let name = sysfs::card_vendor(root, card).map(|vendor| vendor.default_adapter_name().to_string());
    let identity = AdapterIdentity::resolve(name, config, system_memory);
    let query = sysfs::SysfsQuery::new(root);
    let backend = CounterBackend::open(query, &CounterPaths::drm_card(card), identity, warmup)?;
    Ok(Box::new(backend))
}
