// Core business logic module

pub mod config;
pub mod gpu;

// Re-export commonly used items
pub use config::{Config, VendorPreference};
pub use gpu::{GpuSnapshot, InitStatus, Session, UnifiedGpuRecord};
