// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - CPU Identity Detection
//
// Architecture and vendor ID come from an injectable `lscpu`-like source so
// tests never depend on the machine they run on.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use log::{debug, warn};
use std::io;
use std::process::Command;

pub const VENDOR_ID_INTEL: &str = "GenuineIntel";
pub const VENDOR_ID_AMD: &str = "AuthenticAMD";

/// Callable answering `lscpu`-style field queries ("Architecture",
/// "Vendor ID"). Whitespace in the returned value is insignificant.
pub type IdentitySource = Box<dyn Fn(&str) -> io::Result<String> + Send + Sync>;

/// CPU vendor, decoded from the lscpu vendor ID string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vendor {
    Intel,
    Amd,
    Other(String),
}

impl Vendor {
    pub fn from_id(id: &str) -> Self {
        match id {
            VENDOR_ID_INTEL => Vendor::Intel,
            VENDOR_ID_AMD => Vendor::Amd,
            other => Vendor::Other(other.to_string()),
        }
    }

    /// Raw vendor ID string as reported by lscpu.
    pub fn id(&self) -> &str {
        match self {
            Vendor::Intel => VENDOR_ID_INTEL,
            Vendor::Amd => VENDOR_ID_AMD,
            Vendor::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CpuIdentity {
    pub architecture: String,
    pub vendor: Vendor,
}

impl CpuIdentity {
    /// Query architecture and vendor through the injected source.
    ///
    /// Failures are not fatal: only vendor-gated features (uncore) care, and
    /// they will report the unknown vendor on their own.
    pub fn detect(source: &IdentitySource) -> Self {
        let architecture = match source("Architecture") {
            Ok(arch) => arch,
            Err(e) => {
                warn!("failed to determine architecture: {}", e);
                "unknown".to_string()
            }
        };
        let vendor = match source("Vendor ID") {
            Ok(id) => Vendor::from_id(&id),
            Err(e) => {
                warn!("failed to determine vendor ID: {}", e);
                Vendor::Other("unknown".to_string())
            }
        };

        debug!(
            "cpu identity: architecture={}, vendor={}",
            architecture,
            vendor.id()
        );
        Self {
            architecture,
            vendor,
        }
    }
}

/// Default identity source: run `lscpu` and pick the requested field.
pub fn lscpu_source() -> IdentitySource {
    Box::new(|key: &str| {
        let output = Command::new("lscpu").output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "lscpu exited with {}",
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if line.starts_with(key)
                && let Some((_, value)) = line.split_once(':')
            {
                // lscpu pads values; collapse all whitespace like the
                // shell pipeline this replaces did
                return Ok(value.split_whitespace().collect::<String>());
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("lscpu field not found: {}", key),
        ))
    })
}
