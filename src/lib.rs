// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Host power management for Linux servers
//
// Groups CPUs into pools and applies power profiles (P-state limits,
// governor, EPP, C-state enablement) uniformly to every CPU in a pool,
// plus per-die uncore frequency limits with host/package/die inheritance.
// Intel uncore goes through sysfs, AMD DF P-states through an injected
// E-SMI handle.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

mod config;
mod cstate;
mod error;
mod esmi;
mod features;
mod host;
mod identity;
mod pool;
mod profile;
mod pstate;
mod sysfs;
mod topology;
mod uncore;

#[cfg(test)]
mod testutil;

pub use crate::config::{PowerConfig, DEFAULT_CPU_PATH, DEFAULT_MODULES_PATH};
pub use crate::error::PowerError;
pub use crate::esmi::{EsmiBackend, ESMI_SUCCESS};
pub use crate::features::{Feature, FeatureSet, FeatureState};
pub use crate::host::{DieView, Host, PackageView, TopologyView};
pub use crate::identity::{
    lscpu_source, CpuIdentity, IdentitySource, Vendor, VENDOR_ID_AMD, VENDOR_ID_INTEL,
};
pub use crate::pool::{Pool, PoolKind};
pub use crate::profile::PowerProfile;
pub use crate::topology::{CoreType, Cpu};
pub use crate::uncore::{normalize_uncore_freq, UncoreFreq, UNCORE_STEP_KHZ};
