use super::metrics::{BackendKind, DeviceInfo, DeviceStats};
use crate::error::BackendError;

/// Trait for GPU telemetry backends
///
/// Implemented by the three vendor adapters and by the counter fallback in the
/// platform layer. A value of an implementing type only exists once its native
/// function table resolved completely, so every method here may call into it.
pub trait GpuBackend {
    /// Which backend kind this is
    fn kind(&self) -> BackendKind;

    /// Where the data comes from (library path or counter source)
    fn source(&self) -> String;

    /// Bring the native API up. Called exactly once by the selector.
    fn initialize(&mut self) -> Result<(), BackendError>;

    /// Release native resources. Must be safe to call more than once.
    fn shutdown(&mut self);

    fn device_count(&self) -> Result<u32, BackendError>;

    fn device_info(&self, index: u32) -> Result<DeviceInfo, BackendError>;

    /// Take a fresh sample. A failure here is per call and never fatal.
    fn device_stats(&mut self, index: u32) -> Result<DeviceStats, BackendError>;

    /// Utilization alone. Fails when the backend cannot tell, where
    /// `device_stats` would fill in 0.
    fn utilization(&mut self, index: u32) -> Result<f64, BackendError> {
        Ok(self.device_stats(index)?.utilization_pct)
    }
}
