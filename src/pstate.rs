// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - P-state Driver
//
// Per-CPU governor, EPP and scaling frequency control through cpufreq.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;
use crate::features::{FeatureState, InitCtx};
use crate::sysfs::SysfsIo;
use log::debug;

pub(crate) const SCALING_DRIVER_FILE: &str = "scaling_driver";
pub(crate) const SCALING_GOVERNOR_FILE: &str = "scaling_governor";
pub(crate) const AVAILABLE_GOVERNORS_FILE: &str = "scaling_available_governors";
pub(crate) const EPP_FILE: &str = "energy_performance_preference";
pub(crate) const SCALING_MIN_FILE: &str = "scaling_min_freq";
pub(crate) const SCALING_MAX_FILE: &str = "scaling_max_freq";
pub(crate) const CPUINFO_MIN_FILE: &str = "cpuinfo_min_freq";
pub(crate) const CPUINFO_MAX_FILE: &str = "cpuinfo_max_freq";

/// Path of a cpufreq file, relative to the sysfs base.
pub(crate) fn cpufreq_file(cpu: u32, file: &str) -> String {
    format!("cpu{}/cpufreq/{}", cpu, file)
}

/// Scaling driver facts published by feature init.
#[derive(Debug, Clone)]
pub(crate) struct PstateInfo {
    pub driver: String,
    pub epp_supported: bool,
}

/// P-states feature init: the scaling driver of cpu0 must be readable;
/// EPP support is probed by file presence.
pub(crate) fn init_pstates(ctx: &mut InitCtx) -> FeatureState {
    let driver = match ctx.sysfs.read_string(cpufreq_file(0, SCALING_DRIVER_FILE)) {
        Ok(driver) => driver,
        Err(e) => {
            return FeatureState::failed(
                "P-states",
                PowerError::Validation(format!("P-states feature error: {}", e)),
            );
        }
    };

    let epp_supported = ctx.sysfs.exists(cpufreq_file(0, EPP_FILE));
    debug!(
        "P-states driver {}, epp supported: {}",
        driver, epp_supported
    );

    ctx.pstate = Some(PstateInfo {
        driver: driver.clone(),
        epp_supported,
    });
    FeatureState::ok("P-states", driver)
}

/// Governors the kernel accepts for this CPU.
pub(crate) fn available_governors(sysfs: &SysfsIo, cpu: u32) -> Result<Vec<String>, PowerError> {
    let raw = sysfs.read_string(cpufreq_file(cpu, AVAILABLE_GOVERNORS_FILE))?;
    Ok(raw.split_whitespace().map(String::from).collect())
}

/// Write the scaling governor, re-checking it against the CPU's advertised
/// governor list first.
pub(crate) fn set_governor(sysfs: &SysfsIo, cpu: u32, governor: &str) -> Result<(), PowerError> {
    let available = available_governors(sysfs, cpu)?;
    if !available.iter().any(|g| g == governor) {
        return Err(PowerError::Validation(format!(
            "governor {} is not available for cpu {}",
            governor, cpu
        )));
    }
    sysfs.write_string(cpufreq_file(cpu, SCALING_GOVERNOR_FILE), governor)
}

pub(crate) fn set_epp(sysfs: &SysfsIo, cpu: u32, epp: &str) -> Result<(), PowerError> {
    sysfs.write_string(cpufreq_file(cpu, EPP_FILE), epp)
}

#[derive(Debug, PartialEq, Eq)]
enum FreqWriteOrder {
    MaxFirst,
    MinFirst,
}

/// The kernel rejects transient min > max windows, so the write order
/// depends on where the new range sits relative to the current one: a new
/// max at or above the current min can land first, otherwise the min has
/// to drop first.
fn freq_write_order(new_max: u64, current_min: u64) -> FreqWriteOrder {
    if new_max >= current_min {
        FreqWriteOrder::MaxFirst
    } else {
        FreqWriteOrder::MinFirst
    }
}

/// Write both scaling frequency bounds in a kernel-acceptable order.
pub(crate) fn set_freq_range(
    sysfs: &SysfsIo,
    cpu: u32,
    min_khz: u64,
    max_khz: u64,
) -> Result<(), PowerError> {
    if min_khz > max_khz {
        return Err(PowerError::Validation(format!(
            "requested min frequency {} is higher than max {} for cpu {}",
            min_khz, max_khz, cpu
        )));
    }

    let current_min = sysfs.read_uint(cpufreq_file(cpu, SCALING_MIN_FILE))?;
    match freq_write_order(max_khz, current_min) {
        FreqWriteOrder::MaxFirst => {
            sysfs.write_uint(cpufreq_file(cpu, SCALING_MAX_FILE), max_khz)?;
            sysfs.write_uint(cpufreq_file(cpu, SCALING_MIN_FILE), min_khz)?;
        }
        FreqWriteOrder::MinFirst => {
            sysfs.write_uint(cpufreq_file(cpu, SCALING_MIN_FILE), min_khz)?;
            sysfs.write_uint(cpufreq_file(cpu, SCALING_MAX_FILE), max_khz)?;
        }
    }
    Ok(())
}

pub(crate) fn read_governor(sysfs: &SysfsIo, cpu: u32) -> Result<String, PowerError> {
    sysfs.read_string(cpufreq_file(cpu, SCALING_GOVERNOR_FILE))
}

pub(crate) fn read_epp(sysfs: &SysfsIo, cpu: u32) -> Result<String, PowerError> {
    sysfs.read_string(cpufreq_file(cpu, EPP_FILE))
}

pub(crate) fn read_min_freq(sysfs: &SysfsIo, cpu: u32) -> Result<u64, PowerError> {
    sysfs.read_uint(cpufreq_file(cpu, SCALING_MIN_FILE))
}

pub(crate) fn read_max_freq(sysfs: &SysfsIo, cpu: u32) -> Result<u64, PowerError> {
    sysfs.read_uint(cpufreq_file(cpu, SCALING_MAX_FILE))
}
