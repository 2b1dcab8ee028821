// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Error Types
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// All errors produced by the library.
///
/// Variants are cheap to clone so that feature state can hold on to its
/// init error while the same error is surfaced to callers.
#[derive(Debug, Clone, Error)]
pub enum PowerError {
    /// Feature has not been initialized yet.
    #[error("feature is uninitialized")]
    Uninitialized,

    /// Feature id is not registered at all.
    #[error("feature undefined")]
    UndefinedFeature,

    /// A vendor-specific code path was hit on a vendor we do not handle.
    #[error("unsupported vendor: {0}")]
    UnsupportedVendor(String),

    /// A required kernel module is absent from the modules file.
    #[error("kernel module {0} not loaded")]
    ModuleNotLoaded(String),

    /// A profile or uncore bound check failed at construction.
    #[error("{0}")]
    Validation(String),

    /// Exclusive pool name collision.
    #[error("pool with name {0} already exists")]
    AlreadyExists(String),

    /// Underlying sysfs read/write failure, with the offending path.
    #[error("{}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Native backend (E-SMI) call failure.
    #[error("{0}")]
    Backend(String),

    /// Aggregate of per-item failures from init or diagnostic walks.
    #[error("{}", join_all(.0))]
    Multi(Vec<PowerError>),
}

impl PowerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PowerError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Collapse a list of errors into `Ok`, the single error, or a `Multi`.
    pub(crate) fn join(mut errs: Vec<PowerError>) -> Result<(), PowerError> {
        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.remove(0)),
            _ => Err(PowerError::Multi(errs)),
        }
    }

    /// True when this error, or any error inside a `Multi`, matches `pred`.
    pub fn any(&self, pred: &dyn Fn(&PowerError) -> bool) -> bool {
        match self {
            PowerError::Multi(errs) => errs.iter().any(|e| e.any(pred)),
            other => pred(other),
        }
    }
}

fn join_all(errs: &[PowerError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
