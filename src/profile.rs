// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Power Profiles
//
// A profile bundles the P-state and C-state settings a pool applies to its
// CPUs. Profiles are validated on construction and immutable afterwards;
// pools share them by reference counting.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerProfile {
    name: String,
    min_freq_khz: u64,
    max_freq_khz: u64,
    governor: String,
    epp: String,
    /// Idle state name -> enabled. States a CPU lacks are skipped at apply
    /// time; states not listed keep their current value.
    cstates: BTreeMap<String, bool>,
    shared: bool,
}

impl PowerProfile {
    /// Build a profile after the host-side checks passed.
    pub(crate) fn validated(
        name: impl Into<String>,
        min_freq_khz: u64,
        max_freq_khz: u64,
        governor: impl Into<String>,
        epp: impl Into<String>,
        cstates: BTreeMap<String, bool>,
        shared: bool,
    ) -> Self {
        Self {
            name: name.into(),
            min_freq_khz,
            max_freq_khz,
            governor: governor.into(),
            epp: epp.into(),
            cstates,
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_freq_khz(&self) -> u64 {
        self.min_freq_khz
    }

    pub fn max_freq_khz(&self) -> u64 {
        self.max_freq_khz
    }

    pub fn governor(&self) -> &str {
        &self.governor
    }

    /// Empty when the scaling driver has no EPP support; apply then skips
    /// the EPP write entirely.
    pub fn epp(&self) -> &str {
        &self.epp
    }

    pub fn cstates(&self) -> &BTreeMap<String, bool> {
        &self.cstates
    }

    pub fn shared(&self) -> bool {
        self.shared
    }
}

/// The host-independent half of profile validation.
///
/// Governor acceptance beyond non-emptiness is deferred to the per-CPU
/// check against scaling_available_governors at apply time.
pub(crate) fn validate_bounds(
    min_freq_khz: u64,
    max_freq_khz: u64,
    governor: &str,
) -> Result<(), PowerError> {
    if max_freq_khz < min_freq_khz {
        return Err(PowerError::Validation(format!(
            "max frequency {} cannot be lower than min frequency {}",
            max_freq_khz, min_freq_khz
        )));
    }
    if governor.is_empty() {
        return Err(PowerError::Validation(
            "governor cannot be empty".to_string(),
        ));
    }
    Ok(())
}
