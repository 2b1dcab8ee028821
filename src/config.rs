// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Library Configuration
//
// Everything the library would otherwise read from process-wide state is
// carried here: sysfs base path, kernel modules file, core count override,
// and the injected externals (lscpu source, E-SMI handle).
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;
use crate::esmi::EsmiBackend;
use crate::identity::{lscpu_source, IdentitySource};
use log::{debug, info};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CPU_PATH: &str = "/sys/devices/system/cpu";
pub const DEFAULT_MODULES_PATH: &str = "/proc/modules";

/// Library configuration.
///
/// The serde half (paths, core count) can be loaded from a TOML file; the
/// injected externals are runtime-only and always start from their
/// defaults.
#[derive(Deserialize)]
pub struct PowerConfig {
    /// Base of the CPU sysfs tree.
    #[serde(default = "default_cpu_path")]
    pub cpu_path: PathBuf,

    /// Kernel modules list scanned for driver availability.
    #[serde(default = "default_modules_path")]
    pub modules_path: PathBuf,

    /// Trust this CPU count instead of enumerating `cpuN` directories.
    #[serde(default)]
    pub core_count: Option<u32>,

    /// Source of lscpu-style identity fields.
    #[serde(skip, default = "lscpu_source")]
    pub identity_source: IdentitySource,

    /// AMD E-SMI handle; without one the uncore feature errors on AMD.
    #[serde(skip)]
    pub esmi: Option<Arc<dyn EsmiBackend>>,
}

fn default_cpu_path() -> PathBuf {
    PathBuf::from(DEFAULT_CPU_PATH)
}

fn default_modules_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODULES_PATH)
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            cpu_path: default_cpu_path(),
            modules_path: default_modules_path(),
            core_count: None,
            identity_source: lscpu_source(),
            esmi: None,
        }
    }
}

impl fmt::Debug for PowerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerConfig")
            .field("cpu_path", &self.cpu_path)
            .field("modules_path", &self.modules_path)
            .field("core_count", &self.core_count)
            .field("esmi", &self.esmi.is_some())
            .finish()
    }
}

impl PowerConfig {
    /// Load path settings from a TOML file; missing fields keep defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, PowerError> {
        let content = fs::read_to_string(path).map_err(|e| PowerError::io(path, e))?;

        let config: PowerConfig = toml::from_str(&content).map_err(|e| {
            PowerError::Validation(format!("failed to parse config {:?}: {}", path, e))
        })?;

        info!("loaded config from {:?}", path);
        debug!("config: {:?}", config);
        Ok(config)
    }
}
