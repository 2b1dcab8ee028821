// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Host Facade
//
// The host owns everything the library used to keep in process-wide state:
// configuration, CPU identity, the feature registry, the discovered
// topology and the pool table. Tests build a fresh host against a fake
// sysfs tree instead of mutating globals.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::config::PowerConfig;
use crate::cstate::{self, CstateInfo};
use crate::error::PowerError;
use crate::features::{Feature, FeatureSet, InitCtx};
use crate::identity::{CpuIdentity, Vendor};
use crate::pool::{Pool, PoolEntry, PoolKind, RESERVED_POOL_NAME, SHARED_POOL_NAME};
use crate::profile::{self, PowerProfile};
use crate::pstate::{self, PstateInfo};
use crate::sysfs::SysfsIo;
use crate::topology::{self, CoreType, Cpu, Topology};
use crate::uncore::{
    self, UncoreFreq, UncoreWriter, AMD_UNCORE_LABEL, INTEL_UNCORE_LABEL,
};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

pub struct Host {
    name: Mutex<String>,
    config: PowerConfig,
    sysfs: SysfsIo,
    identity: CpuIdentity,
    features: FeatureSet,
    /// Joined feature init failures; the host is usable regardless.
    init_error: Option<PowerError>,
    pstate: Option<PstateInfo>,
    cstate: Option<CstateInfo>,
    uncore_writer: UncoreWriter,
    uncore_default: UncoreFreq,
    pub(crate) topology: Topology,
    pub(crate) pools: RwLock<Vec<Arc<PoolEntry>>>,
}

impl Host {
    /// Build a host against the live system defaults.
    pub fn new(name: impl Into<String>) -> Result<Self, PowerError> {
        Self::with_config(name, PowerConfig::default())
    }

    /// Build a host with explicit configuration.
    ///
    /// Feature init failures are collected, not fatal: the host comes up
    /// with the working subset and [`Host::feature_errors`] reports the
    /// rest. Only topology discovery failure aborts construction.
    pub fn with_config(name: impl Into<String>, config: PowerConfig) -> Result<Self, PowerError> {
        let sysfs = SysfsIo::new(&config.cpu_path);
        let identity = CpuIdentity::detect(&config.identity_source);

        let mut features = FeatureSet::builtin();
        let mut ctx = InitCtx::new(&config, &sysfs, &identity);
        let init_result = features.init(&mut ctx);
        let InitCtx {
            pstate,
            cstate,
            uncore,
            ..
        } = ctx;

        let (uncore_writer, uncore_default) = match uncore {
            Some(setup) => (setup.writer, setup.hw_default),
            None => (UncoreWriter::Disabled, UncoreFreq::new(0, 0)),
        };

        let topology = topology::discover(
            &sysfs,
            &config,
            features.is_supported(Feature::PStates),
            features.is_supported(Feature::CStates),
        )
        .map_err(|e| {
            warn!("failed to discover topology: {}", e);
            e
        })?;

        let all_cpu_ids: Vec<u32> = topology.cpus.iter().map(|c| c.id()).collect();
        let pools = vec![
            Arc::new(PoolEntry::new(
                0,
                RESERVED_POOL_NAME,
                PoolKind::Reserved,
                all_cpu_ids,
            )),
            Arc::new(PoolEntry::new(1, SHARED_POOL_NAME, PoolKind::Shared, Vec::new())),
        ];

        let host = Self {
            name: Mutex::new(name.into()),
            config,
            sysfs,
            identity,
            features,
            init_error: init_result.err(),
            pstate,
            cstate,
            uncore_writer,
            uncore_default,
            topology,
            pools: RwLock::new(pools),
        };

        info!(
            "host {} initialized: architecture={}, vendor={}, {} cpus",
            host.name(),
            host.identity.architecture,
            host.identity.vendor.id(),
            host.topology.cpus.len()
        );
        Ok(host)
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().unwrap() = name.into();
    }

    pub fn architecture(&self) -> &str {
        &self.identity.architecture
    }

    pub fn vendor(&self) -> &Vendor {
        &self.identity.vendor
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    pub(crate) fn sysfs(&self) -> &SysfsIo {
        &self.sysfs
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Joined errors from feature init, when any feature came up degraded.
    pub fn feature_errors(&self) -> Option<&PowerError> {
        self.init_error.as_ref()
    }

    /// Kernel scaling driver, when the P-states feature initialized.
    pub fn scaling_driver(&self) -> Option<&str> {
        self.pstate.as_ref().map(|p| p.driver.as_str())
    }

    /// Kernel idle driver, when the C-states feature initialized.
    pub fn idle_driver(&self) -> Option<&str> {
        self.cstate.as_ref().map(|c| c.driver.as_str())
    }

    pub fn all_cpus(&self) -> &[Cpu] {
        &self.topology.cpus
    }

    pub fn cpu(&self, id: u32) -> Option<&Cpu> {
        self.topology.cpu(id)
    }

    pub fn core_types(&self) -> &[CoreType] {
        &self.topology.core_types
    }

    pub fn num_core_types(&self) -> usize {
        self.topology.core_types.len()
    }

    // ---- pools -----------------------------------------------------------

    pub(crate) fn pool_entry(&self, index: usize) -> Arc<PoolEntry> {
        self.pools.read().unwrap()[index].clone()
    }

    pub fn reserved_pool(&self) -> Pool<'_> {
        Pool {
            host: self,
            entry: self.pool_entry(0),
        }
    }

    pub fn shared_pool(&self) -> Pool<'_> {
        Pool {
            host: self,
            entry: self.pool_entry(1),
        }
    }

    /// Create a new, empty exclusive pool. The existing pool stays
    /// reachable through [`Host::exclusive_pool`] when the name is taken.
    pub fn add_exclusive_pool(&self, name: &str) -> Result<Pool<'_>, PowerError> {
        let mut pools = self.pools.write().unwrap();
        if pools
            .iter()
            .any(|p| p.name == name && !p.state.lock().unwrap().removed)
        {
            return Err(PowerError::AlreadyExists(name.to_string()));
        }

        let entry = Arc::new(PoolEntry::new(
            pools.len(),
            name,
            PoolKind::Exclusive,
            Vec::new(),
        ));
        pools.push(entry.clone());
        Ok(Pool { host: self, entry })
    }

    pub fn exclusive_pool(&self, name: &str) -> Option<Pool<'_>> {
        let pools = self.pools.read().unwrap();
        pools
            .iter()
            .find(|p| {
                p.kind == PoolKind::Exclusive
                    && p.name == name
                    && !p.state.lock().unwrap().removed
            })
            .map(|entry| Pool {
                host: self,
                entry: entry.clone(),
            })
    }

    pub fn exclusive_pools(&self) -> Vec<Pool<'_>> {
        let pools = self.pools.read().unwrap();
        pools
            .iter()
            .filter(|p| p.kind == PoolKind::Exclusive && !p.state.lock().unwrap().removed)
            .map(|entry| Pool {
                host: self,
                entry: entry.clone(),
            })
            .collect()
    }

    // ---- profiles --------------------------------------------------------

    /// Validate and build a power profile.
    ///
    /// Bounds and the EPP/driver agreement are checked here; governor
    /// acceptance and per-CPU idle state availability are re-checked
    /// against each CPU when the profile is applied.
    pub fn new_power_profile(
        &self,
        name: &str,
        min_freq_khz: u64,
        max_freq_khz: u64,
        governor: &str,
        epp: &str,
        cstates: BTreeMap<String, bool>,
        shared: bool,
    ) -> Result<Arc<PowerProfile>, PowerError> {
        if let Some(err) = self.features.error(Feature::PStates) {
            return Err(err);
        }
        profile::validate_bounds(min_freq_khz, max_freq_khz, governor)?;

        let epp_supported = self.pstate.as_ref().is_some_and(|p| p.epp_supported);
        if epp.is_empty() && epp_supported {
            return Err(PowerError::Validation(
                "epp cannot be empty when the scaling driver supports energy performance preference"
                    .to_string(),
            ));
        }
        if !epp.is_empty() && !epp_supported {
            return Err(PowerError::Validation(
                "epp is not supported by the scaling driver".to_string(),
            ));
        }

        Ok(Arc::new(PowerProfile::validated(
            name,
            min_freq_khz,
            max_freq_khz,
            governor,
            epp,
            cstates,
            shared,
        )))
    }

    /// Re-read every sysfs file a profile governs on one CPU and report all
    /// mismatches at once.
    pub fn verify_profile(&self, cpu_id: u32, profile: &PowerProfile) -> Result<(), PowerError> {
        let Some(cpu) = self.topology.cpu(cpu_id) else {
            return Err(PowerError::Validation(format!("unknown cpu {}", cpu_id)));
        };

        let mut errs = Vec::new();

        match pstate::read_governor(&self.sysfs, cpu_id) {
            Ok(governor) if governor == profile.governor() => {}
            Ok(governor) => errs.push(PowerError::Validation(format!(
                "governor mismatch expected: {}, current: {}",
                profile.governor(),
                governor
            ))),
            Err(e) => errs.push(e),
        }

        if !profile.epp().is_empty() {
            match pstate::read_epp(&self.sysfs, cpu_id) {
                Ok(epp) if epp == profile.epp() => {}
                Ok(epp) => errs.push(PowerError::Validation(format!(
                    "epp mismatch expected: {}, current: {}",
                    profile.epp(),
                    epp
                ))),
                Err(e) => errs.push(e),
            }
        }

        match pstate::read_max_freq(&self.sysfs, cpu_id) {
            Ok(max) if max == profile.max_freq_khz() => {}
            Ok(max) => errs.push(PowerError::Validation(format!(
                "max freq mismatch expected: {}, current: {}",
                profile.max_freq_khz(),
                max
            ))),
            Err(e) => errs.push(e),
        }
        match pstate::read_min_freq(&self.sysfs, cpu_id) {
            Ok(min) if min == profile.min_freq_khz() => {}
            Ok(min) => errs.push(PowerError::Validation(format!(
                "min freq mismatch expected: {}, current: {}",
                profile.min_freq_khz(),
                min
            ))),
            Err(e) => errs.push(e),
        }

        for (state_name, &expected) in profile.cstates() {
            let Some(&number) = cpu.cstates.get(state_name) else {
                continue;
            };
            match cstate::read_cstate_disable(&self.sysfs, cpu_id, number) {
                Ok(disable) if (disable == 0) == expected => {}
                Ok(_) => errs.push(PowerError::Validation(format!(
                    "c-state {} mismatch expected enabled={}",
                    state_name, expected
                ))),
                Err(e) => errs.push(e),
            }
        }

        PowerError::join(errs)
    }

    // ---- uncore ----------------------------------------------------------

    /// Validate an uncore limit pair against the hardware default range,
    /// normalizing to the driver granularity on Intel.
    pub fn new_uncore(&self, min: u64, max: u64) -> Result<UncoreFreq, PowerError> {
        if let Some(err) = self.features.error(Feature::Uncore) {
            return Err(err);
        }

        let label = match self.identity.vendor {
            Vendor::Intel => INTEL_UNCORE_LABEL,
            Vendor::Amd => AMD_UNCORE_LABEL,
            Vendor::Other(ref id) => {
                return Err(PowerError::UnsupportedVendor(id.clone()));
            }
        };

        uncore::validate_range(label, UncoreFreq::new(min, max), self.uncore_default)?;

        if self.identity.vendor == Vendor::Intel {
            let normalized_min = uncore::normalize_uncore_freq(min);
            let normalized_max = uncore::normalize_uncore_freq(max);
            if normalized_min != min {
                info!(
                    "requested min {} {} was normalized to {} due to driver requirements",
                    label, min, normalized_min
                );
            }
            if normalized_max != max {
                info!(
                    "requested max {} {} was normalized to {} due to driver requirements",
                    label, max, normalized_max
                );
            }
            return Ok(UncoreFreq::new(normalized_min, normalized_max));
        }
        Ok(UncoreFreq::new(min, max))
    }

    pub fn topology(&self) -> TopologyView<'_> {
        TopologyView { host: self }
    }
}

/// Uncore control surface at the topology root.
#[derive(Clone, Copy)]
pub struct TopologyView<'h> {
    host: &'h Host,
}

impl<'h> TopologyView<'h> {
    /// Replace the host-wide override and re-apply the whole tree. The
    /// walk stops at the first die that fails; the override stays in place
    /// either way, so a re-drive picks up where it left off.
    pub fn set_uncore(&self, freq: Option<UncoreFreq>) -> Result<(), PowerError> {
        *self.host.topology.uncore.lock().unwrap() = freq;
        uncore::apply_all(
            &self.host.topology,
            &self.host.sysfs,
            &self.host.uncore_writer,
            self.host.uncore_default,
        )
    }

    pub fn uncore(&self) -> Option<UncoreFreq> {
        *self.host.topology.uncore.lock().unwrap()
    }

    pub fn effective_uncore(&self) -> UncoreFreq {
        self.uncore().unwrap_or(self.host.uncore_default)
    }

    pub fn package(&self, package_id: u64) -> Option<PackageView<'h>> {
        self.host
            .topology
            .package_index(package_id)
            .map(|index| PackageView {
                host: self.host,
                index,
            })
    }

    pub fn packages(&self) -> Vec<PackageView<'h>> {
        (0..self.host.topology.packages.len())
            .map(|index| PackageView {
                host: self.host,
                index,
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
pub struct PackageView<'h> {
    host: &'h Host,
    index: usize,
}

impl<'h> PackageView<'h> {
    pub fn id(&self) -> u64 {
        self.host.topology.packages[self.index].id
    }

    pub fn set_uncore(&self, freq: Option<UncoreFreq>) -> Result<(), PowerError> {
        *self.host.topology.packages[self.index]
            .uncore
            .lock()
            .unwrap() = freq;
        uncore::apply_package(
            &self.host.topology,
            self.index,
            &self.host.sysfs,
            &self.host.uncore_writer,
            self.host.uncore_default,
        )
    }

    pub fn effective_uncore(&self) -> UncoreFreq {
        if let Some(freq) = *self.host.topology.packages[self.index].uncore.lock().unwrap() {
            return freq;
        }
        self.host.topology().effective_uncore()
    }

    pub fn die(&self, die_id: u64) -> Option<DieView<'h>> {
        self.host
            .topology
            .die_index(self.index, die_id)
            .map(|index| DieView {
                host: self.host,
                index,
            })
    }

    pub fn dies(&self) -> Vec<DieView<'h>> {
        self.host.topology.packages[self.index]
            .dies
            .iter()
            .map(|&index| DieView {
                host: self.host,
                index,
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
pub struct DieView<'h> {
    host: &'h Host,
    index: usize,
}

impl DieView<'_> {
    pub fn id(&self) -> u64 {
        self.host.topology.dies[self.index].id
    }

    pub fn package_id(&self) -> u64 {
        let package = self.host.topology.dies[self.index].package;
        self.host.topology.packages[package].id
    }

    pub fn cpu_ids(&self) -> &[u32] {
        &self.host.topology.dies[self.index].cpus
    }

    pub fn set_uncore(&self, freq: Option<UncoreFreq>) -> Result<(), PowerError> {
        *self.host.topology.dies[self.index].uncore.lock().unwrap() = freq;
        uncore::apply_die(
            &self.host.topology,
            self.index,
            &self.host.sysfs,
            &self.host.uncore_writer,
            self.host.uncore_default,
        )
    }

    pub fn effective_uncore(&self) -> UncoreFreq {
        uncore::effective_for_die(&self.host.topology, self.index, self.host.uncore_default)
    }
}
