// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Typed sysfs Accessors
//
// Thin read/write helpers rooted at a configurable base path, so the whole
// library can be pointed at a fake sysfs tree in tests.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Accessor for files below a single base directory.
///
/// No caching is done anywhere: every read reflects live kernel state.
#[derive(Debug, Clone)]
pub struct SysfsIo {
    base: PathBuf,
}

impl SysfsIo {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Full path of a file relative to the base.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.base.join(rel)
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.path(rel).exists()
    }

    /// Read a file and strip trailing whitespace (sysfs values end in '\n').
    pub fn read_string(&self, rel: impl AsRef<Path>) -> Result<String, PowerError> {
        let path = self.path(rel);
        let content = fs::read_to_string(&path).map_err(|e| PowerError::io(&path, e))?;
        Ok(content.trim_end().to_string())
    }

    pub fn read_uint(&self, rel: impl AsRef<Path>) -> Result<u64, PowerError> {
        let path = self.path(rel);
        let content = fs::read_to_string(&path).map_err(|e| PowerError::io(&path, e))?;
        content.trim().parse().map_err(|e| {
            PowerError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{}", e)),
            )
        })
    }

    pub fn write_string(&self, rel: impl AsRef<Path>, value: &str) -> Result<(), PowerError> {
        let path = self.path(rel);
        debug!("sysfs write {:?} <- {}", path, value);
        fs::write(&path, value).map_err(|e| PowerError::io(&path, e))
    }

    pub fn write_uint(&self, rel: impl AsRef<Path>, value: u64) -> Result<(), PowerError> {
        self.write_string(rel, &value.to_string())
    }
}
