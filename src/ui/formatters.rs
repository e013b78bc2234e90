use colored::{ColoredString, Colorize};

/// Format byte counts in human-readable form (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Percentage colored by load: green, yellow above 60, red above 85
pub fn format_percent(pct: u32) -> ColoredString {
    let text = format!("{:>3}%", pct);
    if pct > 85 {
        text.red()
    } else if pct > 60 {
        text.yellow()
    } else {
        text.green()
    }
}

/// Temperature colored like the usage columns, blank when unreported
pub fn format_temperature(celsius: f64) -> ColoredString {
    if celsius <= 0.0 {
        return "-".dimmed();
    }
    let text = format!("{:.0}°C", celsius);
    if celsius > 80.0 {
        text.red()
    } else if celsius > 70.0 {
        text.yellow()
    } else {
        text.green()
    }
}

pub fn format_power(watts: f64) -> String {
    if watts <= 0.0 {
        "-".to_string()
    } else {
        format!("{:.1}W", watts)
    }
}
