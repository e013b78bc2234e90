use std::fs;
use std::path::PathBuf;

use gpustat::core::config::{Config, VendorPreference};
use tempfile::TempDir;

const GIB: u64 = 1024 * 1024 * 1024;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.vendor, VendorPreference::Auto);
    assert!(config.extra_library_paths.is_empty());
    assert_eq!(config.warmup_delay_ms, 100);
    assert_eq!(config.discrete_fallback_memory_bytes, 8 * GIB);
    assert_eq!(config.integrated_memory_divisor, 8);
    assert_eq!(config.drm_root, PathBuf::from("/sys/class/drm"));
}

#[test]
fn test_config_load_nonexistent_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from(&temp_dir.path().join("missing.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.json");

    let config = Config {
        vendor: VendorPreference::Amd,
        extra_library_paths: vec![PathBuf::from("/opt/amd/amd_ags_x64.dll")],
        warmup_delay_ms: 250,
        ..Default::default()
    };
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_config_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"vendor":"intel","integrated_memory_divisor":4}"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.vendor, VendorPreference::Intel);
    assert_eq!(config.integrated_memory_divisor, 4);
    assert_eq!(config.warmup_delay_ms, 100);
}

#[test]
fn test_config_corrupted_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), Config::default());
}

#[test]
fn test_config_empty_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, "").unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), Config::default());
}

#[test]
fn test_config_unknown_vendor_is_rejected_as_whole_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"vendor":"matrox"}"#).unwrap();

    assert_eq!(Config::load_from(&path).unwrap().vendor, VendorPreference::Auto);
}
