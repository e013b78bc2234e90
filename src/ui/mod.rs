// UI and formatting module

pub mod formatters;
pub mod gpu_formatters;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_percent, format_power, format_size, format_temperature};
pub use gpu_formatters::{print_snapshot, snapshot_line};
