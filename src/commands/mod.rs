// Command handlers module
pub mod config;
pub mod export;
pub mod gpu;
pub mod version;

// Re-exports for cleaner imports
pub use version::execute as version;
