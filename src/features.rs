// SPDX-License-Identifier: GPL-2.0
//
// GhostPower - Feature Registry
//
// Each optional subsystem (P-states, C-states, uncore) registers an
// initializer; the registry runs them in id order and keeps per-feature
// error state so a host can come up with a subset of features working.
//
// Copyright (C) 2025-2026 ghostkellz <ckelley@ghostkellz.sh>

use crate::config::PowerConfig;
use crate::cstate::CstateInfo;
use crate::error::PowerError;
use crate::identity::CpuIdentity;
use crate::pstate::PstateInfo;
use crate::sysfs::SysfsIo;
use crate::uncore::UncoreSetup;
use log::debug;
use std::collections::BTreeMap;

/// Identifiers of the optional subsystems, in initialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    PStates,
    CStates,
    Uncore,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::PStates, Feature::CStates, Feature::Uncore];

    pub fn label(self) -> &'static str {
        match self {
            Feature::PStates => "P-states",
            Feature::CStates => "C-states",
            Feature::Uncore => "Uncore frequency",
        }
    }
}

/// Result of running one feature initializer.
#[derive(Debug, Clone)]
pub struct FeatureState {
    pub name: &'static str,
    /// Kernel driver backing the feature, or "N/A".
    pub driver: String,
    /// `None` means the feature is usable.
    pub error: Option<PowerError>,
}

impl FeatureState {
    pub(crate) fn ok(name: &'static str, driver: impl Into<String>) -> Self {
        Self {
            name,
            driver: driver.into(),
            error: None,
        }
    }

    pub(crate) fn failed(name: &'static str, error: PowerError) -> Self {
        Self {
            name,
            driver: "N/A".to_string(),
            error: Some(error),
        }
    }
}

/// Scratch state handed to feature initializers.
///
/// Initializers read the configuration half and publish their results into
/// the output half, which the host picks up after `init`.
pub(crate) struct InitCtx<'a> {
    pub cfg: &'a PowerConfig,
    pub sysfs: &'a SysfsIo,
    pub identity: &'a CpuIdentity,

    pub pstate: Option<PstateInfo>,
    pub cstate: Option<CstateInfo>,
    pub uncore: Option<UncoreSetup>,
}

impl<'a> InitCtx<'a> {
    pub(crate) fn new(cfg: &'a PowerConfig, sysfs: &'a SysfsIo, identity: &'a CpuIdentity) -> Self {
        Self {
            cfg,
            sysfs,
            identity,
            pstate: None,
            cstate: None,
            uncore: None,
        }
    }
}

pub(crate) type FeatureInit = fn(&mut InitCtx) -> FeatureState;

struct Slot {
    init: Option<FeatureInit>,
    state: FeatureState,
}

/// Ordered collection of feature slots, keyed by feature id.
pub struct FeatureSet {
    slots: BTreeMap<Feature, Slot>,
}

impl FeatureSet {
    pub(crate) fn empty() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    /// The production registry: all three subsystems.
    pub(crate) fn builtin() -> Self {
        let mut set = Self::empty();
        set.register(Feature::PStates, crate::pstate::init_pstates);
        set.register(Feature::CStates, crate::cstate::init_cstates);
        set.register(Feature::Uncore, crate::uncore::init_uncore);
        set
    }

    /// Register a slot; its state starts as the uninitialized sentinel.
    pub(crate) fn register(&mut self, feature: Feature, init: FeatureInit) {
        self.slots.insert(
            feature,
            Slot {
                init: Some(init),
                state: FeatureState::failed(feature.label(), PowerError::Uninitialized),
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn register_without_init(&mut self, feature: Feature) {
        self.slots.insert(
            feature,
            Slot {
                init: None,
                state: FeatureState::failed(feature.label(), PowerError::Uninitialized),
            },
        );
    }

    /// Run every initializer in ascending id order.
    ///
    /// Failing slots keep their error and all failures come back joined, so
    /// the host can still be built around the working subset. Running this
    /// twice is fine; each run overwrites prior slot state. A registered
    /// slot without an initializer is a programming error and panics.
    pub(crate) fn init(&mut self, ctx: &mut InitCtx) -> Result<(), PowerError> {
        if self.slots.is_empty() {
            return Err(PowerError::Validation(
                "no features registered".to_string(),
            ));
        }

        let mut errors = Vec::new();
        for (feature, slot) in self.slots.iter_mut() {
            let init = slot
                .init
                .unwrap_or_else(|| panic!("feature {:?} registered without initializer", feature));
            slot.state = init(ctx);
            debug!(
                "feature {:?}: driver={}, usable={}",
                feature,
                slot.state.driver,
                slot.state.error.is_none()
            );
            if let Some(err) = &slot.state.error {
                errors.push(err.clone());
            }
        }
        PowerError::join(errors)
    }

    /// True when at least one feature initialized cleanly.
    pub fn any_supported(&self) -> bool {
        self.slots.values().any(|s| s.state.error.is_none())
    }

    pub fn is_supported(&self, feature: Feature) -> bool {
        self.slots
            .get(&feature)
            .is_some_and(|s| s.state.error.is_none())
    }

    /// `None` means supported; unregistered features report the undefined
    /// sentinel.
    pub fn error(&self, feature: Feature) -> Option<PowerError> {
        match self.slots.get(&feature) {
            None => Some(PowerError::UndefinedFeature),
            Some(slot) => slot.state.error.clone(),
        }
    }

    pub fn state(&self, feature: Feature) -> Option<&FeatureState> {
        self.slots.get(&feature).map(|s| &s.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, &FeatureState)> {
        self.slots.iter().map(|(f, s)| (*f, &s.state))
    }

    /// Test hook: forget init results, back to the uninitialized sentinel.
    #[cfg(test)]
    pub(crate) fn reset(&mut self) {
        for (feature, slot) in self.slots.iter_mut() {
            slot.state = FeatureState::failed(feature.label(), PowerError::Uninitialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CpuIdentity, Vendor};

    fn test_ctx_parts() -> (PowerConfig, SysfsIo, CpuIdentity) {
        let cfg = PowerConfig::default();
        let sysfs = SysfsIo::new("/nonexistent");
        let identity = CpuIdentity {
            architecture: "x86_64".to_string(),
            vendor: Vendor::Intel,
        };
        (cfg, sysfs, identity)
    }

    fn ok_init(_ctx: &mut InitCtx) -> FeatureState {
        FeatureState::ok("P-states", "intel_pstate")
    }

    fn failing_init(_ctx: &mut InitCtx) -> FeatureState {
        FeatureState::failed(
            "Uncore frequency",
            PowerError::ModuleNotLoaded("intel_uncore_frequency".to_string()),
        )
    }

    #[test]
    fn test_empty_set_init_errors() {
        let (cfg, sysfs, identity) = test_ctx_parts();
        let mut ctx = InitCtx::new(&cfg, &sysfs, &identity);
        assert!(FeatureSet::empty().init(&mut ctx).is_err());
    }

    #[test]
    #[should_panic(expected = "without initializer")]
    fn test_slot_without_init_panics() {
        let (cfg, sysfs, identity) = test_ctx_parts();
        let mut ctx = InitCtx::new(&cfg, &sysfs, &identity);
        let mut set = FeatureSet::empty();
        set.register_without_init(Feature::PStates);
        let _ = set.init(&mut ctx);
    }

    #[test]
    fn test_init_success_and_failure_mix() {
        let (cfg, sysfs, identity) = test_ctx_parts();
        let mut ctx = InitCtx::new(&cfg, &sysfs, &identity);

        let mut set = FeatureSet::empty();
        set.register(Feature::PStates, ok_init);
        set.register(Feature::Uncore, failing_init);

        let err = set.init(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("not loaded"));

        assert!(set.is_supported(Feature::PStates));
        assert!(!set.is_supported(Feature::Uncore));
        assert!(set.any_supported());
        assert!(set.error(Feature::PStates).is_none());
        assert!(matches!(
            set.error(Feature::Uncore),
            Some(PowerError::ModuleNotLoaded(_))
        ));
    }

    #[test]
    fn test_unregistered_feature_is_undefined() {
        let set = FeatureSet::empty();
        assert!(!set.is_supported(Feature::CStates));
        assert!(matches!(
            set.error(Feature::CStates),
            Some(PowerError::UndefinedFeature)
        ));
    }

    #[test]
    fn test_initial_state_is_uninitialized() {
        let mut set = FeatureSet::empty();
        set.register(Feature::PStates, ok_init);
        assert!(!set.any_supported());
        assert!(matches!(
            set.error(Feature::PStates),
            Some(PowerError::Uninitialized)
        ));
    }

    #[test]
    fn test_reinit_overwrites_state() {
        let (cfg, sysfs, identity) = test_ctx_parts();
        let mut ctx = InitCtx::new(&cfg, &sysfs, &identity);

        let mut set = FeatureSet::empty();
        set.register(Feature::PStates, ok_init);
        set.init(&mut ctx).unwrap();
        assert!(set.is_supported(Feature::PStates));

        set.reset();
        assert!(!set.is_supported(Feature::PStates));

        set.init(&mut ctx).unwrap();
        assert!(set.is_supported(Feature::PStates));
    }
}
