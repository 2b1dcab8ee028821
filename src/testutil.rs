// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Shared Test Fixtures
//
// Builds a fake sysfs tree in a temp directory so every subsystem can be
// exercised without touching the machine running the tests.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::config::PowerConfig;
use crate::esmi::{EsmiBackend, ESMI_SUCCESS};
use crate::host::Host;
use crate::identity::{IdentitySource, VENDOR_ID_AMD, VENDOR_ID_INTEL};
use crate::sysfs::SysfsIo;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub(crate) fn intel_identity() -> IdentitySource {
    fixed_identity("x86_64", VENDOR_ID_INTEL)
}

pub(crate) fn amd_identity() -> IdentitySource {
    fixed_identity("x86_64", VENDOR_ID_AMD)
}

pub(crate) fn fixed_identity(arch: &'static str, vendor: &'static str) -> IdentitySource {
    Box::new(move |key: &str| match key {
        "Architecture" => Ok(arch.to_string()),
        "Vendor ID" => Ok(vendor.to_string()),
        other => Err(io::Error::new(io::ErrorKind::NotFound, other.to_string())),
    })
}

/// Recording mock of the E-SMI native library.
#[derive(Default)]
pub(crate) struct MockEsmi {
    range: Mutex<Vec<(u8, u8, u8)>>,
    apb: Mutex<Vec<(u32, u8)>>,
    /// When set, every call returns this status instead of success.
    pub fail_with: Mutex<Option<i32>>,
}

impl MockEsmi {
    fn status(&self) -> i32 {
        self.fail_with.lock().unwrap().unwrap_or(ESMI_SUCCESS)
    }

    pub fn range_calls(&self) -> Vec<(u8, u8, u8)> {
        self.range.lock().unwrap().clone()
    }

    pub fn apb_calls(&self) -> Vec<(u32, u8)> {
        self.apb.lock().unwrap().clone()
    }
}

impl EsmiBackend for MockEsmi {
    fn init(&self) -> i32 {
        self.status()
    }

    fn set_df_pstate_range(&self, package: u8, min: u8, max: u8) -> i32 {
        let status = self.status();
        if status == ESMI_SUCCESS {
            self.range.lock().unwrap().push((package, min, max));
        }
        status
    }

    fn disable_apb(&self, package: u32, pstate: u8) -> i32 {
        let status = self.status();
        if status == ESMI_SUCCESS {
            self.apb.lock().unwrap().push((package, pstate));
        }
        status
    }

    fn err_msg(&self, status: i32) -> String {
        format!("esmi status {}", status)
    }
}

const DEFAULT_CPUINFO_MIN: u64 = 400_000;
const DEFAULT_CPUINFO_MAX: u64 = 3_600_000;

/// Fake sysfs tree plus the injectables a host needs.
pub(crate) struct FakeCpuFiles {
    dir: TempDir,
    pub esmi: Arc<MockEsmi>,
}

impl FakeCpuFiles {
    /// Empty tree: no CPUs, no modules file.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            esmi: Arc::new(MockEsmi::default()),
        }
    }

    /// The standard fixture: `count` CPUs on package 0 / die 0, an Intel
    /// uncore entry with hardware range [1_200_000, 2_400_000], the uncore
    /// module loaded and an idle driver present.
    pub fn with_cpus(count: u32) -> Self {
        let fake = Self::new();
        for id in 0..count {
            fake.add_cpu_at(id, 0, 0, id as u64);
        }
        fake.add_intel_uncore(0, 0, 1_200_000, 2_400_000);
        fake.write_modules(
            "intel_cstates 14 0 - Live 0000ffffad212d\n\
             intel_uncore_frequency 324 0 - Live 0000ffff3ea334\n\
             amd_hsmp 324 0 - Live 0000ffff3ea334\n",
        );
        fake
    }

    /// CPUs with topology and cpufreq files only (no cpuidle).
    pub fn bare(count: u32) -> Self {
        let fake = Self::new();
        for id in 0..count {
            fake.add_cpu_topology(id, 0, 0, id as u64);
            fake.add_cpu_cpufreq(id);
        }
        fake
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn add_cpu_topology(&self, id: u32, package: u64, die: u64, core: u64) {
        self.write(
            &format!("cpu{}/topology/physical_package_id", id),
            &format!("{}\n", package),
        );
        self.write(&format!("cpu{}/topology/die_id", id), &format!("{}\n", die));
        self.write(&format!("cpu{}/topology/core_id", id), &format!("{}\n", core));
    }

    fn add_cpu_cpufreq(&self, id: u32) {
        let base = format!("cpu{}/cpufreq", id);
        self.write(
            &format!("{}/cpuinfo_min_freq", base),
            &format!("{}\n", DEFAULT_CPUINFO_MIN),
        );
        self.write(
            &format!("{}/cpuinfo_max_freq", base),
            &format!("{}\n", DEFAULT_CPUINFO_MAX),
        );
        self.write(
            &format!("{}/scaling_min_freq", base),
            &format!("{}\n", DEFAULT_CPUINFO_MIN),
        );
        self.write(
            &format!("{}/scaling_max_freq", base),
            &format!("{}\n", DEFAULT_CPUINFO_MAX),
        );
        self.write(&format!("{}/scaling_governor", base), "powersave\n");
        self.write(
            &format!("{}/scaling_available_governors", base),
            "performance powersave\n",
        );
        self.write(&format!("{}/scaling_driver", base), "intel_pstate\n");
        self.write(
            &format!("{}/energy_performance_preference", base),
            "balance_performance\n",
        );
    }

    fn add_cpu_cpuidle(&self, id: u32) {
        let states = [
            (0, "POLL", 0),
            (1, "C1", 1),
            (2, "C1E", 10),
            (3, "C6", 170),
        ];
        for (number, name, latency) in states {
            let base = format!("cpu{}/cpuidle/state{}", id, number);
            self.write(&format!("{}/name", base), &format!("{}\n", name));
            self.write(&format!("{}/disable", base), "0\n");
            self.write(&format!("{}/latency", base), &format!("{}\n", latency));
        }
        self.write("cpuidle/current_driver", "intel_idle\n");
    }

    /// Fully equipped CPU at an explicit topology position.
    pub fn add_cpu_at(&self, id: u32, package: u64, die: u64, core: u64) {
        self.add_cpu_topology(id, package, die, core);
        self.add_cpu_cpufreq(id);
        self.add_cpu_cpuidle(id);
    }

    pub fn set_cpuinfo_range(&self, id: u32, min: u64, max: u64) {
        self.write(
            &format!("cpu{}/cpufreq/cpuinfo_min_freq", id),
            &format!("{}\n", min),
        );
        self.write(
            &format!("cpu{}/cpufreq/cpuinfo_max_freq", id),
            &format!("{}\n", max),
        );
    }

    pub fn add_intel_uncore(&self, package: u64, die: u64, init_min: u64, init_max: u64) {
        let base = format!(
            "intel_uncore_frequency/package_{:02}_die_{:02}",
            package, die
        );
        self.write(
            &format!("{}/initial_min_freq_khz", base),
            &format!("{}\n", init_min),
        );
        self.write(
            &format!("{}/initial_max_freq_khz", base),
            &format!("{}\n", init_max),
        );
        self.write(&format!("{}/min_freq_khz", base), &format!("{}\n", init_min));
        self.write(&format!("{}/max_freq_khz", base), &format!("{}\n", init_max));
    }

    pub fn write_modules(&self, content: &str) {
        self.write("modules", content);
    }

    pub fn modules_path(&self) -> PathBuf {
        self.dir.path().join("modules")
    }

    pub fn sysfs(&self) -> SysfsIo {
        SysfsIo::new(self.dir.path())
    }

    /// Plain config pointing at the fake tree.
    pub fn config(&self) -> PowerConfig {
        PowerConfig {
            cpu_path: self.dir.path().to_path_buf(),
            modules_path: self.modules_path(),
            core_count: None,
            identity_source: intel_identity(),
            esmi: None,
        }
    }

    pub fn intel_config(&self) -> PowerConfig {
        self.config()
    }

    pub fn amd_config(&self) -> PowerConfig {
        PowerConfig {
            identity_source: amd_identity(),
            esmi: Some(self.esmi.clone()),
            ..self.config()
        }
    }
}

/// Intel host over the standard fixture.
pub(crate) fn intel_host(cpus: u32) -> (FakeCpuFiles, Host) {
    let fake = FakeCpuFiles::with_cpus(cpus);
    let host = Host::with_config("host", fake.intel_config()).unwrap();
    (fake, host)
}

/// Intel host whose modules file lacks the uncore driver.
pub(crate) fn intel_host_no_uncore(cpus: u32) -> (FakeCpuFiles, Host) {
    let fake = FakeCpuFiles::with_cpus(cpus);
    fake.write_modules("intel_cstates 14 0 - Live 0000ffffad212d\n");
    let host = Host::with_config("host", fake.intel_config()).unwrap();
    (fake, host)
}

/// AMD host with a recording E-SMI mock.
pub(crate) fn amd_host(cpus: u32) -> (FakeCpuFiles, Host) {
    let fake = FakeCpuFiles::with_cpus(cpus);
    let host = Host::with_config("host", fake.amd_config()).unwrap();
    (fake, host)
}
