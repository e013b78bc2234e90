// Platform-specific code module

pub mod counters;
pub mod gpu;
pub mod probe;
pub mod system;

// Re-exports para imports limpios
pub use counters::open_counter_backend;
pub use gpu::vendor_attempts;
