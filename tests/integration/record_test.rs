use gpustat::core::gpu::{DeviceInfo, DeviceStats, GpuSnapshot, UnifiedGpuRecord, MAX_NAME_LEN};

const GIB: u64 = 1024 * 1024 * 1024;

fn sample(used: u64, total: Option<u64>) -> DeviceStats {
    DeviceStats {
        utilization_pct: 50.0,
        memory_used: used,
        memory_total: total,
        ..Default::default()
    }
}

#[test]
fn test_free_and_utilization_invariants() {
    let totals = [0, 1, 3, GIB, 8 * GIB, u64::MAX];
    let useds = [0, 1, 2, GIB, 9 * GIB, u64::MAX];

    for &total in &totals {
        for &used in &useds {
            let info = DeviceInfo::new(0, "GPU", total);
            let record = UnifiedGpuRecord::from_parts(&info, Some(&sample(used, None)));

            assert_eq!(record.memory_free, total.saturating_sub(used), "total={total} used={used}");
            assert!(record.memory_utilization_pct <= 100);
            if total == 0 {
                assert_eq!(record.memory_utilization_pct, 0);
            } else {
                let expected = ((used as u128 * 100) / total as u128).min(100) as u32;
                assert_eq!(record.memory_utilization_pct, expected, "total={total} used={used}");
            }
        }
    }
}

#[test]
fn test_zero_live_capacity_keeps_cached_capacity() {
    let info = DeviceInfo::new(0, "Radeon", 16 * GIB);
    let record = UnifiedGpuRecord::from_parts(&info, Some(&sample(4 * GIB, Some(0))));
    assert_eq!(record.memory_total, 16 * GIB);
    assert_eq!(record.memory_utilization_pct, 25);
}

#[test]
fn test_non_finite_readings_become_zero() {
    let info = DeviceInfo::new(0, "GPU", GIB);
    let stats = DeviceStats {
        utilization_pct: f64::INFINITY,
        temperature: f64::NAN,
        power_watts: f64::NEG_INFINITY,
        ..Default::default()
    };
    let record = UnifiedGpuRecord::from_parts(&info, Some(&stats));
    assert_eq!(record.gpu_utilization_pct, 0);
    assert_eq!(record.temperature, 0.0);
    assert_eq!(record.power_usage, 0.0);

    // Still valid JSON
    let snapshot = GpuSnapshot { gpus: vec![record] };
    assert!(snapshot.to_json().is_ok());
}

#[test]
fn test_long_and_blank_names() {
    let long = "X".repeat(400);
    assert_eq!(DeviceInfo::new(0, long, 0).name.len(), MAX_NAME_LEN);
    assert_eq!(DeviceInfo::new(0, "   ", 0).name, "Unknown");
    assert_eq!(DeviceInfo::new(0, "  Radeon RX 6800  ", 0).name, "Radeon RX 6800");
}

#[test]
fn test_multibyte_name_truncated_on_char_boundary() {
    let name = "é".repeat(200);
    let info = DeviceInfo::new(0, name, 0);
    assert!(info.name.len() <= MAX_NAME_LEN);
    assert!(info.name.chars().all(|c| c == 'é'));
}

#[test]
fn test_snapshot_shape_is_identical_for_every_source() {
    let vendor = UnifiedGpuRecord::from_parts(
        &DeviceInfo::new(0, "NVIDIA GeForce RTX 4090", 24 * GIB),
        Some(&DeviceStats {
            utilization_pct: 97.0,
            memory_used: 20 * GIB,
            memory_free: 4 * GIB,
            memory_total: Some(24 * GIB),
            temperature: 71.0,
            power_watts: 412.0,
        }),
    );
    let counters = UnifiedGpuRecord::from_parts(
        &DeviceInfo::new(1, "Generic Graphics Adapter", 8 * GIB),
        Some(&sample(0, None)),
    );
    let failed = UnifiedGpuRecord::from_parts(&DeviceInfo::unknown(2), None);

    let snapshot = GpuSnapshot {
        gpus: vec![vendor, counters, failed],
    };
    let value: serde_json::Value = serde_json::from_str(&snapshot.to_json_pretty().unwrap()).unwrap();

    let key_sets: Vec<Vec<String>> = value["gpus"]
        .as_array()
        .unwrap()
        .iter()
        .map(|gpu| {
            let mut keys: Vec<String> = gpu.as_object().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        })
        .collect();

    assert_eq!(key_sets.len(), 3);
    assert!(key_sets.iter().all(|keys| keys == &key_sets[0]));
    assert_eq!(value["gpus"][2]["name"], "Unknown");
    assert_eq!(value["gpus"][0]["gpu_utilization"], 97);
}
