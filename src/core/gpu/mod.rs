//! GPU telemetry core.
//!
//! Vendor-neutral types, the backend trait, the selector session and the
//! unified record/serializer. Backend implementations live in the platform
//! layer.

mod backend;
mod metrics;
pub mod record;
pub mod session;

pub use backend::GpuBackend;
pub use metrics::{
    detect_vendor, milliwatts_to_watts, BackendKind, DeviceInfo, DeviceStats, GpuVendor,
    MAX_NAME_LEN, UNKNOWN_DEVICE_NAME,
};
pub use record::{GpuSnapshot, UnifiedGpuRecord};
pub use session::{BackendAttempt, InitStatus, Session, SessionState};
