// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Pool Benchmarks
//
// Criterion-based benchmarks for pool membership moves and profile
// application against a fake sysfs tree.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ghostpower::{Host, IdentitySource, PowerConfig, VENDOR_ID_INTEL};
use std::collections::BTreeMap;
use std::fs;
use std::hint::black_box;
use tempfile::TempDir;

fn build_tree(cpus: u32) -> TempDir {
    let dir = TempDir::new().unwrap();
    let write = |rel: String, content: String| {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    };

    for id in 0..cpus {
        write(
            format!("cpu{}/topology/physical_package_id", id),
            "0\n".to_string(),
        );
        write(format!("cpu{}/topology/die_id", id), "0\n".to_string());
        write(format!("cpu{}/topology/core_id", id), format!("{}\n", id));

        let cpufreq = format!("cpu{}/cpufreq", id);
        write(format!("{}/cpuinfo_min_freq", cpufreq), "400000\n".to_string());
        write(format!("{}/cpuinfo_max_freq", cpufreq), "3600000\n".to_string());
        write(format!("{}/scaling_min_freq", cpufreq), "400000\n".to_string());
        write(format!("{}/scaling_max_freq", cpufreq), "3600000\n".to_string());
        write(format!("{}/scaling_governor", cpufreq), "powersave\n".to_string());
        write(
            format!("{}/scaling_available_governors", cpufreq),
            "performance powersave\n".to_string(),
        );
        write(format!("{}/scaling_driver", cpufreq), "intel_pstate\n".to_string());
        write(
            format!("{}/energy_performance_preference", cpufreq),
            "balance_performance\n".to_string(),
        );

        for (number, name) in [(0, "POLL"), (1, "C1"), (2, "C6")] {
            let state = format!("cpu{}/cpuidle/state{}", id, number);
            write(format!("{}/name", state), format!("{}\n", name));
            write(format!("{}/disable", state), "0\n".to_string());
            write(format!("{}/latency", state), "0\n".to_string());
        }
    }
    write("modules".to_string(), String::new());
    dir
}

fn build_host(dir: &TempDir) -> Host {
    let source: IdentitySource = Box::new(|key: &str| match key {
        "Architecture" => Ok("x86_64".to_string()),
        "Vendor ID" => Ok(VENDOR_ID_INTEL.to_string()),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            other.to_string(),
        )),
    });
    let config = PowerConfig {
        cpu_path: dir.path().to_path_buf(),
        modules_path: dir.path().join("modules"),
        identity_source: source,
        ..PowerConfig::default()
    };
    Host::with_config("bench", config).unwrap()
}

/// Benchmark moving all CPUs between two pools.
fn bench_move_cpus(c: &mut Criterion) {
    let mut group = c.benchmark_group("move_cpus");

    for nr_cpus in [8u32, 32, 64] {
        let tree = build_tree(nr_cpus);
        let host = build_host(&tree);
        let ids: Vec<u32> = (0..nr_cpus).collect();

        group.bench_with_input(BenchmarkId::from_parameter(nr_cpus), &ids, |b, ids| {
            b.iter(|| {
                host.shared_pool().move_cpu_ids(ids).unwrap();
                host.reserved_pool().move_cpu_ids(ids).unwrap();
                black_box(host.reserved_pool().cpu_ids().len())
            });
        });
    }

    group.finish();
}

/// Benchmark a full profile apply over a pool.
fn bench_profile_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile_apply");
    group.sample_size(20);

    for nr_cpus in [8u32, 32] {
        let tree = build_tree(nr_cpus);
        let host = build_host(&tree);
        host.shared_pool()
            .move_cpu_ids(&(0..nr_cpus).collect::<Vec<_>>())
            .unwrap();
        let profile = host
            .new_power_profile(
                "bench",
                500_000,
                3_000_000,
                "performance",
                "performance",
                BTreeMap::from([("C1".to_string(), true), ("C6".to_string(), false)]),
                true,
            )
            .unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(nr_cpus),
            &profile,
            |b, profile| {
                b.iter(|| {
                    host.shared_pool()
                        .set_power_profile(Some(profile.clone()))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_move_cpus, bench_profile_apply);
criterion_main!(benches);
