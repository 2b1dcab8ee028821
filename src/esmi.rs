// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - AMD E-SMI Backend Seam
//
// The E-SMI (HSMP) native library is x86-only and needs linking against
// libe_smi64, so it is injected behind this trait instead of being a hard
// dependency. DF P-states are package-scoped; there is no die parameter.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::error::PowerError;

/// Status code returned by every E-SMI call; zero means success.
pub const ESMI_SUCCESS: i32 = 0;

/// Injectable handle to the AMD E-SMI native library.
pub trait EsmiBackend: Send + Sync {
    /// One-time library initialization.
    fn init(&self) -> i32;

    /// Program a DF P-state range on a package.
    fn set_df_pstate_range(&self, package: u8, min: u8, max: u8) -> i32;

    /// Pin the data fabric to a single P-state (disables APB).
    fn disable_apb(&self, package: u32, pstate: u8) -> i32;

    /// Human-readable message for a status code.
    fn err_msg(&self, status: i32) -> String;
}

/// Map a non-zero E-SMI status into a backend error.
pub(crate) fn check(
    backend: &dyn EsmiBackend,
    status: i32,
    what: &str,
) -> Result<(), PowerError> {
    if status == ESMI_SUCCESS {
        Ok(())
    } else {
        Err(PowerError::Backend(format!(
            "{}: {}",
            what,
            backend.err_msg(status)
        )))
    }
}
