// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Uncore Frequency Driver
//
// Intel exposes per-(package, die) uncore limits through sysfs; AMD
// expresses the same knob as a package-scoped DF P-state behind E-SMI.
// Overrides attach at topology, package or die level and unset levels
// inherit from their parent, bottoming out at the hardware default read
// during feature init.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;
use crate::esmi::{self, EsmiBackend};
use crate::features::{FeatureState, InitCtx};
use crate::identity::Vendor;
use crate::sysfs::SysfsIo;
use crate::topology::Topology;
use log::debug;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub(crate) const INTEL_UNCORE_KMOD: &str = "intel_uncore_frequency";
pub(crate) const INTEL_UNCORE_DIR: &str = "intel_uncore_frequency";
pub(crate) const AMD_HSMP_KMOD: &str = "amd_hsmp";

pub(crate) const INIT_MAX_FREQ_FILE: &str = "initial_max_freq_khz";
pub(crate) const INIT_MIN_FREQ_FILE: &str = "initial_min_freq_khz";
pub(crate) const MAX_FREQ_FILE: &str = "max_freq_khz";
pub(crate) const MIN_FREQ_FILE: &str = "min_freq_khz";

/// Granularity the intel_uncore_frequency driver accepts.
pub const UNCORE_STEP_KHZ: u64 = 100_000;

pub(crate) const INTEL_UNCORE_LABEL: &str = "uncore frequency (kHz)";
pub(crate) const AMD_UNCORE_LABEL: &str = "DF P-state";

/// An uncore limit pair. Units are kHz on Intel and an opaque DF P-state
/// number on AMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncoreFreq {
    pub(crate) min: u64,
    pub(crate) max: u64,
}

impl UncoreFreq {
    pub(crate) fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

/// Round a requested frequency down to the driver granularity.
pub fn normalize_uncore_freq(freq_khz: u64) -> u64 {
    freq_khz - freq_khz % UNCORE_STEP_KHZ
}

pub(crate) fn package_die_dir(package: u64, die: u64) -> String {
    format!("{}/package_{:02}_die_{:02}", INTEL_UNCORE_DIR, package, die)
}

/// Bounds check a requested range against the hardware default range.
pub(crate) fn validate_range(
    label: &str,
    requested: UncoreFreq,
    hw: UncoreFreq,
) -> Result<(), PowerError> {
    if requested.min < hw.min {
        return Err(PowerError::Validation(format!(
            "requested min {} {} is lower than {} allowed by the hardware",
            label, requested.min, hw.min
        )));
    }
    if requested.max > hw.max {
        return Err(PowerError::Validation(format!(
            "requested max {} {} is higher than {} allowed by the hardware",
            label, requested.max, hw.max
        )));
    }
    if requested.max < requested.min {
        return Err(PowerError::Validation(format!(
            "requested max {} {} cannot be lower than min {} {}",
            label, requested.max, label, requested.min
        )));
    }
    Ok(())
}

/// Vendor backend that lands an effective limit on one die.
pub(crate) enum UncoreWriter {
    /// intel_uncore_frequency sysfs entries.
    Intel,
    /// Injected E-SMI handle; the die id is ignored (DF P-state is
    /// package-scoped).
    Amd(Arc<dyn EsmiBackend>),
    /// Feature unavailable; writes are no-ops.
    Disabled,
}

impl UncoreWriter {
    pub(crate) fn write(
        &self,
        sysfs: &SysfsIo,
        package: u64,
        die: u64,
        freq: UncoreFreq,
    ) -> Result<(), PowerError> {
        match self {
            UncoreWriter::Intel => {
                let dir = package_die_dir(package, die);
                sysfs.write_uint(format!("{}/{}", dir, MAX_FREQ_FILE), freq.max)?;
                sysfs.write_uint(format!("{}/{}", dir, MIN_FREQ_FILE), freq.min)
            }
            UncoreWriter::Amd(backend) => {
                if freq.min == freq.max {
                    esmi::check(
                        backend.as_ref(),
                        backend.disable_apb(package as u32, freq.min as u8),
                        "DF Pstate set failed",
                    )
                } else {
                    esmi::check(
                        backend.as_ref(),
                        backend.set_df_pstate_range(package as u8, freq.min as u8, freq.max as u8),
                        "DF Pstate range set failed",
                    )
                }
            }
            UncoreWriter::Disabled => Ok(()),
        }
    }
}

/// Vendor writer plus hardware default range, published by feature init.
pub(crate) struct UncoreSetup {
    pub writer: UncoreWriter,
    pub hw_default: UncoreFreq,
}

/// Line-scan the kernel modules file for a module name.
pub(crate) fn module_loaded(modules_path: &Path, module: &str) -> bool {
    let Ok(content) = fs::read_to_string(modules_path) else {
        return false;
    };
    content.lines().any(|line| line.contains(module))
}

/// Uncore feature init, dispatching on vendor.
pub(crate) fn init_uncore(ctx: &mut InitCtx) -> FeatureState {
    let result = match ctx.identity.vendor {
        Vendor::Intel => init_intel_uncore(ctx),
        Vendor::Amd => init_amd_uncore(ctx),
        Vendor::Other(_) => Err(PowerError::UnsupportedVendor(format!(
            "{} ({} architecture)",
            ctx.identity.vendor.id(),
            ctx.identity.architecture
        ))),
    };

    match result {
        Ok(setup) => {
            let state = FeatureState::ok("Uncore frequency", "N/A");
            ctx.uncore = Some(setup);
            state
        }
        Err(e) => FeatureState::failed("Uncore frequency", e),
    }
}

fn init_intel_uncore(ctx: &InitCtx) -> Result<UncoreSetup, PowerError> {
    if !module_loaded(&ctx.cfg.modules_path, INTEL_UNCORE_KMOD) {
        return Err(PowerError::ModuleNotLoaded(INTEL_UNCORE_KMOD.to_string()));
    }

    let uncore_dir = ctx.sysfs.path(INTEL_UNCORE_DIR);
    let has_dies = fs::read_dir(&uncore_dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if !has_dies {
        return Err(PowerError::Validation(format!(
            "uncore dir {:?} empty or invalid",
            uncore_dir
        )));
    }

    let read_init = |file: &str| {
        ctx.sysfs
            .read_uint(format!("{}/{}", package_die_dir(0, 0), file))
            .map_err(|e| {
                PowerError::Validation(format!("failed to determine init freq: {}", e))
            })
    };
    let max = read_init(INIT_MAX_FREQ_FILE)?;
    let min = read_init(INIT_MIN_FREQ_FILE)?;

    debug!("intel uncore hardware range: [{}, {}] kHz", min, max);
    Ok(UncoreSetup {
        writer: UncoreWriter::Intel,
        hw_default: UncoreFreq::new(min, max),
    })
}

// TBD: probe the platform DF P-state depth instead of the fixed 0..2 range.
const AMD_DF_PSTATE_RANGE: UncoreFreq = UncoreFreq { min: 0, max: 2 };

fn init_amd_uncore(ctx: &InitCtx) -> Result<UncoreSetup, PowerError> {
    if !module_loaded(&ctx.cfg.modules_path, AMD_HSMP_KMOD) {
        return Err(PowerError::ModuleNotLoaded(AMD_HSMP_KMOD.to_string()));
    }

    let backend = ctx
        .cfg
        .esmi
        .clone()
        .ok_or_else(|| PowerError::Validation("no E-SMI backend configured".to_string()))?;

    esmi::check(
        backend.as_ref(),
        backend.init(),
        "AMD ESMI initialization failed",
    )?;

    let hw = AMD_DF_PSTATE_RANGE;
    esmi::check(
        backend.as_ref(),
        backend.set_df_pstate_range(0, hw.min as u8, hw.max as u8),
        "DF Pstate range set failed",
    )?;

    debug!("amd DF P-state range: [{}, {}]", hw.min, hw.max);
    Ok(UncoreSetup {
        writer: UncoreWriter::Amd(backend),
        hw_default: hw,
    })
}

/// Resolve a die's effective limit: own override, then package, then
/// topology, then the hardware default.
pub(crate) fn effective_for_die(topo: &Topology, die_index: usize, hw: UncoreFreq) -> UncoreFreq {
    let die = &topo.dies[die_index];
    if let Some(freq) = *die.uncore.lock().unwrap() {
        return freq;
    }
    let package = &topo.packages[die.package];
    if let Some(freq) = *package.uncore.lock().unwrap() {
        return freq;
    }
    if let Some(freq) = *topo.uncore.lock().unwrap() {
        return freq;
    }
    hw
}

pub(crate) fn apply_die(
    topo: &Topology,
    die_index: usize,
    sysfs: &SysfsIo,
    writer: &UncoreWriter,
    hw: UncoreFreq,
) -> Result<(), PowerError> {
    let die = &topo.dies[die_index];
    let effective = effective_for_die(topo, die_index, hw);
    writer.write(sysfs, topo.packages[die.package].id, die.id, effective)
}

pub(crate) fn apply_package(
    topo: &Topology,
    package_index: usize,
    sysfs: &SysfsIo,
    writer: &UncoreWriter,
    hw: UncoreFreq,
) -> Result<(), PowerError> {
    for &die_index in &topo.packages[package_index].dies {
        apply_die(topo, die_index, sysfs, writer, hw)?;
    }
    Ok(())
}

pub(crate) fn apply_all(
    topo: &Topology,
    sysfs: &SysfsIo,
    writer: &UncoreWriter,
    hw: UncoreFreq,
) -> Result<(), PowerError> {
    for package_index in 0..topo.packages.len() {
        apply_package(topo, package_index, sysfs, writer, hw)?;
    }
    Ok(())
}
