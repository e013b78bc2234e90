use thiserror::Error;

/// Shared failure taxonomy for every telemetry backend.
///
/// Vendor adapters translate their native return codes into one of these
/// variants at the boundary; nothing above the adapters ever sees a vendor code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("No usable library found ({tried} candidates tried)")]
    LibraryNotFound { tried: usize },

    #[error("Library {path} is missing required symbol {symbol}")]
    SymbolMissing { path: String, symbol: String },

    #[error("Backend initialization failed: {0}")]
    BackendInitFailed(String),

    #[error("Device query failed: {0}")]
    DeviceQueryFailed(String),

    #[error("Performance counters unavailable: {0}")]
    CounterUnavailable(String),

    #[error("No GPU telemetry backend is available")]
    Unavailable,
}

impl BackendError {
    pub fn init_failed<S: Into<String>>(msg: S) -> Self {
        BackendError::BackendInitFailed(msg.into())
    }

    pub fn query_failed<S: Into<String>>(msg: S) -> Self {
        BackendError::DeviceQueryFailed(msg.into())
    }

    pub fn counter_unavailable<S: Into<String>>(msg: S) -> Self {
        BackendError::CounterUnavailable(msg.into())
    }

    /// True when a library was located on disk but could not be used.
    ///
    /// Drives the `-2` init status, as opposed to `-1` for nothing found.
    pub fn library_was_found(&self) -> bool {
        matches!(
            self,
            BackendError::SymbolMissing { .. } | BackendError::BackendInitFailed(_)
        )
    }
}

/// Custom error type for the gpustat crate
#[derive(Error, Debug)]
pub enum GpuStatError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Result type alias for the gpustat crate
pub type Result<T> = std::result::Result<T, GpuStatError>;
