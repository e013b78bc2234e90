//! Backend selection and the public query surface.
//!
//! A [`Session`] owns whichever backend won selection. Selection happens once:
//! vendor backends are probed and initialized in order, the counter fallback
//! is tried if none of them comes up, and the outcome is fixed until
//! [`Session::shutdown`] or [`Session::reinit`].

use std::collections::BTreeMap;

use log::{debug, info, warn};

use super::backend::GpuBackend;
use super::metrics::{BackendKind, DeviceInfo};
use super::record::{clamp_percent, GpuSnapshot, UnifiedGpuRecord};
use crate::core::config::Config;
use crate::error::BackendError;

/// Outcome of one probe attempt, before initialization
pub type BackendAttempt = Result<Box<dyn GpuBackend>, BackendError>;

/// Init status reported to callers as a plain integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Ready,
    /// No vendor library found and counters unavailable
    NoLibrary,
    /// A vendor library was found but incomplete or rejected, and counters unavailable
    LibraryRejected,
    /// The backend was released by `shutdown`
    Released,
}

impl InitStatus {
    pub fn code(&self) -> i32 {
        match self {
            InitStatus::Ready => 0,
            InitStatus::NoLibrary | InitStatus::Released => -1,
            InitStatus::LibraryRejected => -2,
        }
    }
}

pub enum SessionState {
    NoneSelected,
    VendorActive(Box<dyn GpuBackend>),
    FallbackActive(Box<dyn GpuBackend>),
    /// Terminal: nothing works. Holds the most telling vendor failure.
    Failed(BackendError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::NoneSelected => "none",
            SessionState::VendorActive(_) => "vendor",
            SessionState::FallbackActive(_) => "fallback",
            SessionState::Failed(_) => "failed",
        }
    }

    fn backend(&self) -> Option<&dyn GpuBackend> {
        match self {
            SessionState::VendorActive(backend) | SessionState::FallbackActive(backend) => {
                Some(backend.as_ref())
            }
            _ => None,
        }
    }

    fn backend_mut(&mut self) -> Option<&mut Box<dyn GpuBackend>> {
        match self {
            SessionState::VendorActive(backend) | SessionState::FallbackActive(backend) => {
                Some(backend)
            }
            _ => None,
        }
    }
}

pub struct Session {
    state: SessionState,
    status: InitStatus,
    info_cache: BTreeMap<u32, DeviceInfo>,
}

impl Session {
    /// Probe the platform according to `config` and select a backend
    pub fn init(config: &Config) -> Self {
        Self::select(crate::platform::gpu::vendor_attempts(config), || {
            crate::platform::counters::open_counter_backend(config)
        })
    }

    /// Run the selection state machine over explicit attempts.
    ///
    /// `vendors` is consumed lazily, so probing stops at the first vendor that
    /// initializes. `fallback` only runs when every vendor failed.
    pub fn select<I, F>(vendors: I, fallback: F) -> Self
    where
        I: IntoIterator<Item = BackendAttempt>,
        F: FnOnce() -> BackendAttempt,
    {
        let mut vendor_failure: Option<BackendError> = None;

        for attempt in vendors {
            match attempt.and_then(activate) {
                Ok(backend) => {
                    info!(
                        "{} telemetry initialized from {}",
                        kind_label(backend.kind()),
                        backend.source()
                    );
                    return Self::with_state(SessionState::VendorActive(backend), InitStatus::Ready);
                }
                Err(e) => {
                    debug!("Vendor backend unavailable: {}", e);
                    vendor_failure = Some(worse_failure(vendor_failure, e));
                }
            }
        }

        match fallback().and_then(activate) {
            Ok(backend) => {
                info!("Performance counters initialized from {}", backend.source());
                Self::with_state(SessionState::FallbackActive(backend), InitStatus::Ready)
            }
            Err(e) => {
                warn!("No GPU telemetry available (counters: {})", e);
                let failure = vendor_failure.unwrap_or(BackendError::LibraryNotFound { tried: 0 });
                let status = if failure.library_was_found() {
                    InitStatus::LibraryRejected
                } else {
                    InitStatus::NoLibrary
                };
                Self::with_state(SessionState::Failed(failure), status)
            }
        }
    }

    fn with_state(state: SessionState, status: InitStatus) -> Self {
        Self {
            state,
            status,
            info_cache: BTreeMap::new(),
        }
    }

    pub fn status(&self) -> InitStatus {
        self.status
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn kind(&self) -> Option<BackendKind> {
        self.state.backend().map(|b| b.kind())
    }

    pub fn is_available(&self) -> bool {
        self.state.backend().is_some()
    }

    /// Human-readable description of the active backend
    pub fn describe(&self) -> String {
        match &self.state {
            SessionState::Failed(e) => format!("unavailable ({})", e),
            SessionState::NoneSelected => "not initialized".to_string(),
            state => match state.backend() {
                Some(b) => format!("{} via {}", kind_label(b.kind()), b.source()),
                None => state.name().to_string(),
            },
        }
    }

    pub fn device_count(&self) -> Result<u32, BackendError> {
        self.state
            .backend()
            .ok_or(BackendError::Unavailable)?
            .device_count()
    }

    /// Device count, or -1 when unknown
    pub fn get_count(&self) -> i32 {
        match self.device_count() {
            Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
            Err(e) => {
                debug!("Device count unavailable: {}", e);
                -1
            }
        }
    }

    /// Collect one record per device.
    ///
    /// Per-device failures degrade that record to defaults; only an unknown
    /// device count or a missing backend fails the whole snapshot.
    pub fn snapshot(&mut self) -> Result<GpuSnapshot, BackendError> {
        let Session {
            state, info_cache, ..
        } = self;
        let backend = state.backend_mut().ok_or(BackendError::Unavailable)?;
        let count = backend.device_count()?;

        let mut gpus = Vec::with_capacity(count as usize);
        for index in 0..count {
            let info = cached_info(backend.as_ref(), info_cache, index);
            let stats = match backend.device_stats(index) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("GPU {} sample failed: {}", index, e);
                    None
                }
            };
            gpus.push(UnifiedGpuRecord::from_parts(&info, stats.as_ref()));
        }

        Ok(GpuSnapshot { gpus })
    }

    /// Static info cached by earlier snapshots, in index order
    pub fn cached_infos(&self) -> Vec<DeviceInfo> {
        self.info_cache.values().cloned().collect()
    }

    /// Snapshot serialized to the fixed schema, or `None` when unavailable
    pub fn get_info_json(&mut self) -> Option<String> {
        let snapshot = self.snapshot().ok()?;
        match snapshot.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("Failed to serialize GPU snapshot: {}", e);
                None
            }
        }
    }

    /// Utilization of device 0, or -1 when unavailable
    pub fn get_usage(&mut self) -> i32 {
        let Some(backend) = self.state.backend_mut() else {
            return -1;
        };
        match backend.utilization(0) {
            Ok(utilization) => clamp_percent(utilization) as i32,
            Err(e) => {
                debug!("GPU 0 usage unavailable: {}", e);
                -1
            }
        }
    }

    /// Release the backend. Safe to call repeatedly or after a failed init.
    pub fn shutdown(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::NoneSelected);
        if let SessionState::VendorActive(mut backend) | SessionState::FallbackActive(mut backend) =
            state
        {
            debug!("Shutting down {}", backend.source());
            backend.shutdown();
        }
        self.status = InitStatus::Released;
        self.info_cache.clear();
    }

    /// Tear down the current backend and run selection again
    pub fn reinit(&mut self, config: &Config) {
        self.shutdown();
        *self = Self::init(config);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn activate(mut backend: Box<dyn GpuBackend>) -> BackendAttempt {
    match backend.initialize() {
        Ok(()) => Ok(backend),
        Err(e) => {
            backend.shutdown();
            Err(e)
        }
    }
}

/// A library that was found beats one that was not when reporting status
fn worse_failure(previous: Option<BackendError>, next: BackendError) -> BackendError {
    match previous {
        Some(prev) if prev.library_was_found() && !next.library_was_found() => prev,
        _ => next,
    }
}

fn cached_info(
    backend: &dyn GpuBackend,
    cache: &mut BTreeMap<u32, DeviceInfo>,
    index: u32,
) -> DeviceInfo {
    if let Some(info) = cache.get(&index) {
        return info.clone();
    }
    match backend.device_info(index) {
        Ok(info) => {
            cache.insert(index, info.clone());
            info
        }
        Err(e) => {
            warn!("GPU {} info unavailable: {}", index, e);
            DeviceInfo::unknown(index)
        }
    }
}

fn kind_label(kind: BackendKind) -> String {
    match kind {
        BackendKind::Vendor(vendor) => vendor.display_name().to_string(),
        BackendKind::Counters => "Counter".to_string(),
    }
}
