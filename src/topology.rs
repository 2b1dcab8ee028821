// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - CPU Topology Discovery
//
// Builds the package -> die -> CPU tree from sysfs. Entities live in flat
// vectors and reference each other by index; the tree is structurally
// immutable once discovered, only the uncore override slots and the pool
// tags on CPUs change afterwards.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::config::PowerConfig;
use crate::cstate;
use crate::error::PowerError;
use crate::pstate::{cpufreq_file, CPUINFO_MAX_FILE, CPUINFO_MIN_FILE};
use crate::sysfs::SysfsIo;
use crate::uncore::UncoreFreq;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Mutex;

pub(crate) const PACKAGE_ID_FILE: &str = "physical_package_id";
pub(crate) const DIE_ID_FILE: &str = "die_id";
pub(crate) const CORE_ID_FILE: &str = "core_id";

fn topology_file(cpu: u32, file: &str) -> String {
    format!("cpu{}/topology/{}", cpu, file)
}

/// A class of cores sharing one hardware frequency range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreType {
    name: String,
    min_freq_khz: u64,
    max_freq_khz: u64,
}

impl CoreType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_freq_khz(&self) -> u64 {
        self.min_freq_khz
    }

    pub fn max_freq_khz(&self) -> u64 {
        self.max_freq_khz
    }
}

/// One logical CPU.
#[derive(Debug)]
pub struct Cpu {
    id: u32,
    package_id: u64,
    die_id: u64,
    core_id: u64,
    core_type: usize,
    /// Index of the owning pool in the host's pool table. Mutated only
    /// while both affected pool locks are held; reads outside those locks
    /// are advisory and re-checked under them.
    pub(crate) pool: AtomicUsize,
    /// Idle state name -> state number, materialized at discovery.
    pub(crate) cstates: BTreeMap<String, u32>,
}

impl Cpu {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn package_id(&self) -> u64 {
        self.package_id
    }

    pub fn die_id(&self) -> u64 {
        self.die_id
    }

    pub fn core_id(&self) -> u64 {
        self.core_id
    }

    /// Index into the host's core type list.
    pub fn core_type_index(&self) -> usize {
        self.core_type
    }
}

#[derive(Debug)]
pub(crate) struct Package {
    pub id: u64,
    pub dies: Vec<usize>,
    pub uncore: Mutex<Option<UncoreFreq>>,
}

#[derive(Debug)]
pub(crate) struct Die {
    pub id: u64,
    /// Arena index of the parent package.
    pub package: usize,
    pub cpus: Vec<u32>,
    pub uncore: Mutex<Option<UncoreFreq>>,
}

/// Root of the discovered CPU tree.
#[derive(Debug)]
pub(crate) struct Topology {
    pub packages: Vec<Package>,
    pub dies: Vec<Die>,
    pub cpus: Vec<Cpu>,
    pub core_types: Vec<CoreType>,
    pub uncore: Mutex<Option<UncoreFreq>>,
}

impl Topology {
    /// Look up a CPU by id.
    pub fn cpu(&self, id: u32) -> Option<&Cpu> {
        self.cpus
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.cpus[i])
    }

    pub fn package_index(&self, package_id: u64) -> Option<usize> {
        self.packages.iter().position(|p| p.id == package_id)
    }

    pub fn die_index(&self, package_index: usize, die_id: u64) -> Option<usize> {
        self.packages[package_index]
            .dies
            .iter()
            .copied()
            .find(|&d| self.dies[d].id == die_id)
    }
}

/// Enumerate `cpuN` directory ids below the base path.
fn enumerate_cpu_ids(sysfs: &SysfsIo) -> Result<Vec<u32>, PowerError> {
    let mut ids = Vec::new();

    let pattern = sysfs.path("cpu[0-9]*");
    let Some(pattern) = pattern.to_str().map(String::from) else {
        return Ok(ids);
    };

    for entry in glob::glob(&pattern).into_iter().flatten().flatten() {
        if let Some(name) = entry.file_name().and_then(|n| n.to_str())
            && let Ok(id) = name.trim_start_matches("cpu").parse::<u32>()
        {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

/// Discover the CPU tree.
///
/// Topology files are always required. Frequency-range files are required
/// only while the P-states feature is usable; without it the CPU falls into
/// the zero range. Idle-state maps are built only when the C-states feature
/// is usable.
pub(crate) fn discover(
    sysfs: &SysfsIo,
    cfg: &PowerConfig,
    pstates_ok: bool,
    cstates_ok: bool,
) -> Result<Topology, PowerError> {
    let cpu_ids: Vec<u32> = match cfg.core_count {
        Some(count) => (0..count).collect(),
        None => enumerate_cpu_ids(sysfs)?,
    };
    if cpu_ids.is_empty() {
        return Err(PowerError::Validation(format!(
            "no cpus found under {:?}",
            sysfs.base()
        )));
    }

    let mut packages: Vec<Package> = Vec::new();
    let mut dies: Vec<Die> = Vec::new();
    let mut cpus: Vec<Cpu> = Vec::new();
    let mut freq_ranges: Vec<(u64, u64)> = Vec::new();

    for id in cpu_ids {
        let package_id = sysfs.read_uint(topology_file(id, PACKAGE_ID_FILE))?;
        let die_id = sysfs.read_uint(topology_file(id, DIE_ID_FILE))?;
        let core_id = sysfs.read_uint(topology_file(id, CORE_ID_FILE))?;

        let package_index = match packages.iter().position(|p| p.id == package_id) {
            Some(i) => i,
            None => {
                packages.push(Package {
                    id: package_id,
                    dies: Vec::new(),
                    uncore: Mutex::new(None),
                });
                packages.len() - 1
            }
        };

        let die_index = match packages[package_index]
            .dies
            .iter()
            .copied()
            .find(|&d| dies[d].id == die_id)
        {
            Some(i) => i,
            None => {
                dies.push(Die {
                    id: die_id,
                    package: package_index,
                    cpus: Vec::new(),
                    uncore: Mutex::new(None),
                });
                packages[package_index].dies.push(dies.len() - 1);
                dies.len() - 1
            }
        };
        dies[die_index].cpus.push(id);

        let range = match (
            sysfs.read_uint(cpufreq_file(id, CPUINFO_MIN_FILE)),
            sysfs.read_uint(cpufreq_file(id, CPUINFO_MAX_FILE)),
        ) {
            (Ok(min), Ok(max)) => (min, max),
            (Err(e), _) | (_, Err(e)) => {
                if pstates_ok {
                    return Err(e);
                }
                (0, 0)
            }
        };
        freq_ranges.push(range);

        let cstates = if cstates_ok {
            cstate::discover_cpu_states(sysfs, id)?
        } else {
            BTreeMap::new()
        };

        debug!(
            "cpu{}: package={}, die={}, core={}, range=[{}, {}]",
            id, package_id, die_id, core_id, range.0, range.1
        );

        cpus.push(Cpu {
            id,
            package_id,
            die_id,
            core_id,
            core_type: 0,
            pool: AtomicUsize::new(0),
            cstates,
        });
    }

    let core_types = build_core_types(&freq_ranges);
    for (cpu, range) in cpus.iter_mut().zip(&freq_ranges) {
        cpu.core_type = core_types
            .iter()
            .position(|t| (t.min_freq_khz, t.max_freq_khz) == *range)
            .unwrap_or(0);
    }

    info!(
        "topology discovered: {} cpus, {} packages, {} dies, {} core types",
        cpus.len(),
        packages.len(),
        dies.len(),
        core_types.len()
    );

    Ok(Topology {
        packages,
        dies,
        cpus,
        core_types,
        uncore: Mutex::new(None),
    })
}

/// Distinct (min, max) pairs become core types, named fastest-first.
fn build_core_types(freq_ranges: &[(u64, u64)]) -> Vec<CoreType> {
    let mut distinct: Vec<(u64, u64)> = Vec::new();
    for range in freq_ranges {
        if !distinct.contains(range) {
            distinct.push(*range);
        }
    }
    distinct.sort_by(|a, b| (b.1, b.0).cmp(&(a.1, a.0)));

    let single = distinct.len() == 1;
    distinct
        .into_iter()
        .enumerate()
        .map(|(i, (min, max))| {
            let name = if single {
                "core".to_string()
            } else {
                match i {
                    0 => "P-core".to_string(),
                    1 => "E-core".to_string(),
                    n => format!("E-core-{}", n),
                }
            };
            CoreType {
                name,
                min_freq_khz: min,
                max_freq_khz: max,
            }
        })
        .collect()
}
