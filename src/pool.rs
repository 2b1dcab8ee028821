// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - CPU Pools
//
// Every CPU belongs to exactly one pool at all times. The reserved pool
// owns everything after discovery; callers carve CPUs out into the shared
// pool or named exclusive pools and attach power profiles.
//
// Locking: each pool has one mutex. Any operation touching two pools takes
// both mutexes in lexicographic order of the (immutable) pool names, so
// concurrent moves and profile changes cannot deadlock. A CPU's pool tag is
// only written while both affected pool locks are held.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::cstate;
use crate::error::PowerError;
use crate::host::Host;
use crate::profile::PowerProfile;
use crate::pstate;
use crate::topology::Cpu;
use log::debug;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

pub(crate) const RESERVED_POOL_NAME: &str = "reserved";
pub(crate) const SHARED_POOL_NAME: &str = "shared";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// System pool holding every CPU not claimed elsewhere.
    Reserved,
    /// Single pool for workloads sharing one profile.
    Shared,
    /// User-created, name-indexed pool.
    Exclusive,
}

pub(crate) struct PoolState {
    /// Owned CPU ids, ascending.
    pub cpu_ids: Vec<u32>,
    pub profile: Option<Arc<PowerProfile>>,
    pub removed: bool,
}

pub(crate) struct PoolEntry {
    /// Position in the host pool table; CPUs carry this as their pool tag.
    pub index: usize,
    pub name: String,
    pub kind: PoolKind,
    pub state: Mutex<PoolState>,
}

impl PoolEntry {
    pub(crate) fn new(index: usize, name: &str, kind: PoolKind, cpu_ids: Vec<u32>) -> Self {
        Self {
            index,
            name: name.to_string(),
            kind,
            state: Mutex::new(PoolState {
                cpu_ids,
                profile: None,
                removed: false,
            }),
        }
    }
}

/// Handle to one pool of a host.
#[derive(Clone)]
pub struct Pool<'h> {
    pub(crate) host: &'h Host,
    pub(crate) entry: Arc<PoolEntry>,
}

impl<'h> std::fmt::Debug for Pool<'h> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.entry.name)
            .field("kind", &self.entry.kind)
            .field("index", &self.entry.index)
            .finish()
    }
}

impl<'h> Pool<'h> {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn kind(&self) -> PoolKind {
        self.entry.kind
    }

    /// Snapshot of the owned CPU ids, ascending.
    pub fn cpu_ids(&self) -> Vec<u32> {
        self.entry.state.lock().unwrap().cpu_ids.clone()
    }

    pub fn cpus(&self) -> Vec<&'h Cpu> {
        let host = self.host;
        self.cpu_ids()
            .iter()
            .filter_map(|&id| host.cpu(id))
            .collect()
    }

    pub fn power_profile(&self) -> Option<Arc<PowerProfile>> {
        self.entry.state.lock().unwrap().profile.clone()
    }

    /// Attach a profile and push it down to every owned CPU, in ascending
    /// CPU-id order. `None` detaches without touching sysfs; CPUs pick up
    /// their next settings on a later apply.
    ///
    /// The first per-CPU failure aborts the walk. Earlier writes stay in
    /// place (sysfs has no transaction); callers re-apply after fixing the
    /// cause.
    pub fn set_power_profile(&self, profile: Option<Arc<PowerProfile>>) -> Result<(), PowerError> {
        let state = self.entry.state.lock().unwrap();
        if state.removed {
            return Err(PowerError::Validation(format!(
                "pool {} has been removed",
                self.entry.name
            )));
        }

        // hold the pool lock for the whole apply so a concurrent move sees
        // either the old or the fully applied new profile
        let mut state = state;
        state.profile = profile.clone();

        let Some(profile) = profile else {
            debug!("pool {}: profile detached", self.entry.name);
            return Ok(());
        };

        debug!(
            "pool {}: applying profile {} to {} cpus",
            self.entry.name,
            profile.name(),
            state.cpu_ids.len()
        );
        for &id in &state.cpu_ids {
            if let Some(cpu) = self.host.cpu(id) {
                self.host.apply_profile_to_cpu(cpu, &profile)?;
            }
        }
        Ok(())
    }

    /// Move the given CPUs into this pool, whatever pool each currently
    /// belongs to. Each CPU transfers atomically and is retagged with this
    /// pool's profile; moving a CPU already here is a no-op.
    pub fn move_cpus<'c>(&self, cpus: impl IntoIterator<Item = &'c Cpu>) -> Result<(), PowerError> {
        for cpu in cpus {
            self.move_in(cpu)?;
        }
        Ok(())
    }

    /// [`Pool::move_cpus`] by id. Unknown ids are dropped silently, which
    /// keeps arbitrary (fuzzed) id lists safe to pass through.
    pub fn move_cpu_ids(&self, ids: &[u32]) -> Result<(), PowerError> {
        for &id in ids {
            match self.host.cpu(id) {
                Some(cpu) => self.move_in(cpu)?,
                None => debug!("pool {}: ignoring unknown cpu id {}", self.entry.name, id),
            }
        }
        Ok(())
    }

    /// Remove an exclusive pool: its CPUs return to the shared pool, the
    /// profile detaches and the name becomes free again. The reserved and
    /// shared pools cannot be removed.
    pub fn remove(&self) -> Result<(), PowerError> {
        if self.entry.kind != PoolKind::Exclusive {
            return Err(PowerError::Validation(format!(
                "cannot remove the {} pool",
                self.entry.name
            )));
        }

        let ids = self.cpu_ids();
        self.host.shared_pool().move_cpu_ids(&ids)?;

        let mut state = self.entry.state.lock().unwrap();
        state.profile = None;
        state.removed = true;
        debug!("pool {} removed", self.entry.name);
        Ok(())
    }

    fn move_in(&self, cpu: &Cpu) -> Result<(), PowerError> {
        let dest = &self.entry;
        loop {
            let src_index = cpu.pool.load(Ordering::Acquire);
            if src_index == dest.index {
                return Ok(());
            }

            let src = self.host.pool_entry(src_index);

            // both locks, lexicographic by name; names are unique and never
            // change, so the order is globally consistent
            let src_first = src.name <= dest.name;
            let (a, b) = if src_first {
                (&src, dest)
            } else {
                (dest, &src)
            };
            let guard_a = a.state.lock().unwrap();
            let guard_b = b.state.lock().unwrap();
            let (mut src_state, mut dst_state) = if src_first {
                (guard_a, guard_b)
            } else {
                (guard_b, guard_a)
            };

            // a concurrent move may have re-homed the CPU between the tag
            // read and the lock acquisition
            if cpu.pool.load(Ordering::Acquire) != src_index {
                continue;
            }
            if dst_state.removed {
                return Err(PowerError::Validation(format!(
                    "pool {} has been removed",
                    dest.name
                )));
            }

            // revoke the old membership before granting the new one
            if let Ok(pos) = src_state.cpu_ids.binary_search(&cpu.id()) {
                src_state.cpu_ids.remove(pos);
            }
            if let Err(pos) = dst_state.cpu_ids.binary_search(&cpu.id()) {
                dst_state.cpu_ids.insert(pos, cpu.id());
            }
            cpu.pool.store(dest.index, Ordering::Release);

            // retag with the destination profile while the locks are held,
            // so this CPU cannot miss a concurrent set_power_profile
            let result = match dst_state.profile.clone() {
                Some(profile) => self.host.apply_profile_to_cpu(cpu, &profile),
                None => Ok(()),
            };

            debug!(
                "cpu{}: {} -> {}",
                cpu.id(),
                src.name,
                dest.name
            );
            return result;
        }
    }
}

impl Host {
    /// Land every setting of a profile on one CPU: governor, EPP (when the
    /// profile carries one), the scaling range, then idle states.
    pub(crate) fn apply_profile_to_cpu(
        &self,
        cpu: &Cpu,
        profile: &PowerProfile,
    ) -> Result<(), PowerError> {
        let sysfs = self.sysfs();
        pstate::set_governor(sysfs, cpu.id(), profile.governor())?;
        if !profile.epp().is_empty() {
            pstate::set_epp(sysfs, cpu.id(), profile.epp())?;
        }
        pstate::set_freq_range(
            sysfs,
            cpu.id(),
            profile.min_freq_khz(),
            profile.max_freq_khz(),
        )?;
        cstate::apply_cstates(sysfs, cpu.id(), &cpu.cstates, profile.cstates())
    }
}
