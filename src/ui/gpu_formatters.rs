use colored::Colorize;

use super::formatters::{format_percent, format_power, format_size, format_temperature};
use crate::core::gpu::{DeviceInfo, GpuSnapshot, UnifiedGpuRecord};

fn print_section_header(title: &str) {
    println!("\n{}", title.bold().green());
    println!("{}", "-".repeat(title.len()));
}

/// Human-readable table of every device in the snapshot.
///
/// `infos` adds vendor extras such as compute units where a backend has them.
pub fn print_snapshot(snapshot: &GpuSnapshot, source: &str, infos: &[DeviceInfo]) {
    print_section_header("GPU");
    println!("  {}", source.dimmed());

    if snapshot.gpus.is_empty() {
        println!("  No GPU detected");
        return;
    }

    for (i, gpu) in snapshot.gpus.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let info = infos.iter().find(|info| info.index == gpu.index);
        print_record(gpu, info);
    }
}

fn print_record(gpu: &UnifiedGpuRecord, info: Option<&DeviceInfo>) {
    println!("  [{}] {}", gpu.index, gpu.name.bold());
    println!("  Utilization: {}", format_percent(gpu.gpu_utilization_pct));
    println!(
        "  Memory: {} ({} / {}, {} free)",
        format_percent(gpu.memory_utilization_pct),
        format_size(gpu.memory_used),
        format_size(gpu.memory_total),
        format_size(gpu.memory_free)
    );
    println!("  Temperature: {}", format_temperature(gpu.temperature));
    println!("  Power: {}", format_power(gpu.power_usage));
    if let Some(line) = info.and_then(compute_line) {
        println!("  Compute: {}", line);
    }
}

/// Compute units and peak throughput, when the backend reported either
fn compute_line(info: &DeviceInfo) -> Option<String> {
    let parts: Vec<String> = [
        info.compute_units.map(|units| format!("{} CUs", units)),
        info.peak_tflops.map(|tflops| format!("{:.2} TFLOPS peak", tflops)),
    ]
    .into_iter()
    .flatten()
    .collect();

    (!parts.is_empty()).then(|| parts.join(", "))
}

/// One line per device, for `watch`
pub fn snapshot_line(snapshot: &GpuSnapshot) -> String {
    snapshot
        .gpus
        .iter()
        .map(|gpu| {
            format!(
                "[{}] gpu {} mem {} {}",
                gpu.index,
                format_percent(gpu.gpu_utilization_pct),
                format_percent(gpu.memory_utilization_pct),
                format_temperature(gpu.temperature)
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}
