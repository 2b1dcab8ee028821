// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - C-state Driver
//
// Idle states are addressed by name in profiles but by state number in
// sysfs, so discovery materializes a name -> number map per CPU.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;
use crate::features::{FeatureState, InitCtx};
use crate::sysfs::SysfsIo;
use log::debug;
use std::collections::BTreeMap;

pub(crate) const CPUIDLE_DRIVER_FILE: &str = "cpuidle/current_driver";

pub(crate) fn cpuidle_dir(cpu: u32) -> String {
    format!("cpu{}/cpuidle", cpu)
}

pub(crate) fn cstate_disable_file(cpu: u32, state: u32) -> String {
    format!("cpu{}/cpuidle/state{}/disable", cpu, state)
}

fn cstate_name_file(cpu: u32, state: u32) -> String {
    format!("cpu{}/cpuidle/state{}/name", cpu, state)
}

/// Idle driver facts published by feature init.
#[derive(Debug, Clone)]
pub(crate) struct CstateInfo {
    pub driver: String,
}

/// C-states feature init: cpu0 must expose a cpuidle directory. The idle
/// driver name is informational only and never gates the feature.
pub(crate) fn init_cstates(ctx: &mut InitCtx) -> FeatureState {
    if !ctx.sysfs.exists(cpuidle_dir(0)) {
        return FeatureState::failed(
            "C-states",
            PowerError::Validation(format!(
                "C-states feature error: {:?} not present",
                ctx.sysfs.path(cpuidle_dir(0))
            )),
        );
    }

    let driver = ctx
        .sysfs
        .read_string(CPUIDLE_DRIVER_FILE)
        .unwrap_or_else(|_| "N/A".to_string());
    debug!("cpuidle driver: {}", driver);

    ctx.cstate = Some(CstateInfo {
        driver: driver.clone(),
    });
    FeatureState::ok("C-states", driver)
}

/// Scan `cpuN/cpuidle/state*` and map each state's name to its number.
pub(crate) fn discover_cpu_states(
    sysfs: &SysfsIo,
    cpu: u32,
) -> Result<BTreeMap<String, u32>, PowerError> {
    let mut states = BTreeMap::new();

    let pattern = sysfs.path(format!("cpu{}/cpuidle/state[0-9]*", cpu));
    let Some(pattern) = pattern.to_str().map(String::from) else {
        return Ok(states);
    };

    for entry in glob::glob(&pattern).into_iter().flatten().flatten() {
        let Some(dir_name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(number) = dir_name.trim_start_matches("state").parse::<u32>() else {
            continue;
        };
        let name = sysfs.read_string(cstate_name_file(cpu, number))?;
        states.insert(name, number);
    }

    debug!("cpu{}: {} idle states", cpu, states.len());
    Ok(states)
}

/// Flip the disable files named by the profile.
///
/// States the profile names but this CPU lacks are skipped; states the
/// profile does not mention keep their current value.
pub(crate) fn apply_cstates(
    sysfs: &SysfsIo,
    cpu: u32,
    available: &BTreeMap<String, u32>,
    wanted: &BTreeMap<String, bool>,
) -> Result<(), PowerError> {
    for (name, enabled) in wanted {
        let Some(&number) = available.get(name) else {
            debug!("cpu{}: no idle state named {}, skipping", cpu, name);
            continue;
        };
        let disable = if *enabled { 0 } else { 1 };
        sysfs.write_uint(cstate_disable_file(cpu, number), disable)?;
    }
    Ok(())
}

pub(crate) fn read_cstate_disable(
    sysfs: &SysfsIo,
    cpu: u32,
    state: u32,
) -> Result<u64, PowerError> {
    sysfs.read_uint(cstate_disable_file(cpu, state))
}
