//! Host facts the GPU backends fall back on when a vendor API stays silent

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Display adapter device class
#[cfg(windows)]
const DISPLAY_CLASS_KEY: &str =
    "SYSTEM\\CurrentControlSet\\Control\\Class\\{4d36e968-e325-11ce-bfc1-08002be10318}\\0000";

/// Installed physical memory in bytes, 0 if it cannot be read
pub fn total_memory_bytes() -> u64 {
    let refresh = RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram());
    let sys = System::new_with_specifics(refresh);
    sys.total_memory()
}

/// `DriverDesc` of the first display adapter registered with Windows
#[cfg(windows)]
pub fn display_adapter_name() -> Option<String> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let key = match hklm.open_subkey(DISPLAY_CLASS_KEY) {
        Ok(key) => key,
        Err(e) => {
            log::debug!("Display adapter registry key unavailable: {}", e);
            return None;
        }
    };

    let name: String = key.get_value("DriverDesc").ok()?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(not(windows))]
pub fn display_adapter_name() -> Option<String> {
    None
}
