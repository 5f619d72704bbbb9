//! Device arbitration on active-endpoint changes.
//!
//! Classifies each reported endpoint against the configured pair. The safe
//! target gets its volume re-asserted; the hijacker is repelled with a forced
//! switch back; anything else is only observed.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use wardenconf::PairConfig;

use crate::clamp::ClampLoop;
use crate::ports::{ConfigStore, Ports, SwitchOutcome};
use crate::safeguard::VolumeSafeguard;

/// Identifier reported when an event carries no endpoint.
pub const NO_ENDPOINT: &str = "none";

/// Arbitration state, reset at daemon start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbitrationState {
    pub is_safe_device_active: bool,
    /// `None` until the first hijack; never inside the danger window.
    pub last_hijack_at: Option<Instant>,
}

/// Which side of the pair a reported endpoint is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointClass {
    SafeTarget,
    Hijacker,
    Other(String),
    NoEndpoint,
}

/// Classify a reported endpoint. The safe target wins if both identifiers match.
pub fn classify(reported: Option<&str>, pair: &PairConfig) -> EndpointClass {
    let reported = reported.map(str::trim).unwrap_or(NO_ENDPOINT);
    if reported.is_empty() || reported.eq_ignore_ascii_case(NO_ENDPOINT) {
        return EndpointClass::NoEndpoint;
    }
    if reported.eq_ignore_ascii_case(pair.safe_target.trim()) {
        EndpointClass::SafeTarget
    } else if reported.eq_ignore_ascii_case(pair.hijacker.trim()) {
        EndpointClass::Hijacker
    } else {
        EndpointClass::Other(reported.to_string())
    }
}

/// What an endpoint-change event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arbitration {
    /// Pair missing or unreadable; nothing done.
    Unconfigured,
    SafeTargetActive,
    Hijacked { switch: Option<SwitchOutcome> },
    Observed(String),
    NoEndpoint,
}

pub struct DeviceArbitrator {
    config: Arc<dyn ConfigStore>,
    state: ArbitrationState,
}

impl DeviceArbitrator {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            state: ArbitrationState::default(),
        }
    }

    pub fn state(&self) -> &ArbitrationState {
        &self.state
    }

    /// Fresh snapshot of the pair, or `None` when unusable.
    pub fn load_pair(&self, ports: &Ports) -> Option<PairConfig> {
        match self.config.load() {
            Ok(pair) if pair.is_configured() => Some(pair),
            Ok(_) => {
                ports.note("❌ SETUP REQUIRED: hijacker and safe target are not configured");
                None
            }
            Err(e) => {
                ports.alert(format!("❌ Configuration unavailable: {}", e));
                None
            }
        }
    }

    pub fn on_active_endpoint_changed(
        &mut self,
        reported: Option<&str>,
        safeguard: &mut VolumeSafeguard,
        clamp: &mut ClampLoop,
        ports: &Ports,
    ) -> Arbitration {
        let Some(pair) = self.load_pair(ports) else {
            // No safe target to protect until the pair is filled in again
            self.state.is_safe_device_active = false;
            if clamp.stop() {
                debug!("clamp session cancelled, pair no longer configured");
            }
            return Arbitration::Unconfigured;
        };
        let class = classify(reported, &pair);
        debug!(?class, "active endpoint changed");

        // State first, then action
        self.state.is_safe_device_active = class == EndpointClass::SafeTarget;

        match class {
            EndpointClass::SafeTarget => {
                // A late volume command often follows the handoff
                clamp.start(safeguard.baseline(), ports);

                if let Some(baseline) = safeguard.baseline() {
                    safeguard.enforce(clamp, ports);
                    ports.note(format!(
                        "✅ Audio stabilized on safe target. Enforcing Vol: {}",
                        baseline
                    ));
                } else {
                    match safeguard.learn(ports) {
                        Some(level) => ports.note(format!(
                            "✅ Audio stabilized on safe target. Initial Vol: {}",
                            level
                        )),
                        None => ports.note("✅ Audio stabilized on safe target."),
                    }
                }
                Arbitration::SafeTargetActive
            }
            EndpointClass::Hijacker => {
                self.state.last_hijack_at = Some(ports.now());
                ports.note(format!(
                    "⚠️ Hijack detected ({}). Force switch!",
                    reported.unwrap_or(NO_ENDPOINT)
                ));
                clamp.start(safeguard.baseline(), ports);
                let switch = self.switch_to_safe_target(&pair, safeguard, clamp, ports);
                Arbitration::Hijacked { switch }
            }
            EndpointClass::Other(id) => {
                ports.note(format!("ℹ️ Active: {} (Not safe target)", id));
                Arbitration::Observed(id)
            }
            EndpointClass::NoEndpoint => Arbitration::NoEndpoint,
        }
    }

    /// Reload the pair and force the safe target active.
    pub fn force_safe_target(
        &mut self,
        safeguard: &mut VolumeSafeguard,
        clamp: &mut ClampLoop,
        ports: &Ports,
    ) -> Option<SwitchOutcome> {
        let pair = self.load_pair(ports)?;
        self.switch_to_safe_target(&pair, safeguard, clamp, ports)
    }

    fn switch_to_safe_target(
        &mut self,
        pair: &PairConfig,
        safeguard: &mut VolumeSafeguard,
        clamp: &mut ClampLoop,
        ports: &Ports,
    ) -> Option<SwitchOutcome> {
        match ports.switcher.force_active(&pair.safe_target) {
            Ok(SwitchOutcome::Switched) => {
                safeguard.enforce(clamp, ports);
                ports.note("🚀 Switched audio to safe target");
                Some(SwitchOutcome::Switched)
            }
            Ok(SwitchOutcome::NotConnected) => {
                ports.note(format!("⚠️ Safe target {} not connected", pair.safe_target));
                Some(SwitchOutcome::NotConnected)
            }
            Err(e) => {
                ports.alert(format!("❌ Switch failed: {}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Rig, HIJACKER, SAFE};
    use std::time::Duration;

    struct Parts {
        arbitrator: DeviceArbitrator,
        safeguard: VolumeSafeguard,
        clamp: ClampLoop,
    }

    fn parts(rig: &Rig) -> Parts {
        Parts {
            arbitrator: DeviceArbitrator::new(rig.config.clone()),
            safeguard: VolumeSafeguard::new(Duration::from_secs(60), 3),
            clamp: ClampLoop::new(Duration::from_secs(10), Duration::from_millis(10)),
        }
    }

    impl Parts {
        fn report(&mut self, rig: &Rig, id: Option<&str>) -> Arbitration {
            self.arbitrator.on_active_endpoint_changed(
                id,
                &mut self.safeguard,
                &mut self.clamp,
                &rig.ports,
            )
        }
    }

    #[test]
    fn test_classify() {
        let pair = PairConfig::new(HIJACKER, SAFE);
        assert_eq!(classify(Some(SAFE), &pair), EndpointClass::SafeTarget);
        assert_eq!(
            classify(Some(SAFE.to_lowercase().as_str()), &pair),
            EndpointClass::SafeTarget
        );
        assert_eq!(classify(Some(HIJACKER), &pair), EndpointClass::Hijacker);
        assert_eq!(
            classify(Some("12:34:56:78:9A:BC"), &pair),
            EndpointClass::Other("12:34:56:78:9A:BC".to_string())
        );
        assert_eq!(classify(None, &pair), EndpointClass::NoEndpoint);
        assert_eq!(classify(Some(""), &pair), EndpointClass::NoEndpoint);
        assert_eq!(classify(Some("NONE"), &pair), EndpointClass::NoEndpoint);
    }

    #[test]
    fn test_identical_ids_resolve_to_safe_target() {
        let pair = PairConfig::new("same", "SAME");
        assert_eq!(classify(Some("same"), &pair), EndpointClass::SafeTarget);
    }

    #[test]
    fn test_safe_target_without_baseline_learns() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);

        let outcome = parts.report(&rig, Some(SAFE.to_lowercase().as_str()));

        assert_eq!(outcome, Arbitration::SafeTargetActive);
        assert!(parts.arbitrator.state().is_safe_device_active);
        assert_eq!(parts.safeguard.baseline(), Some(8));
        // Clamping needs a baseline, which did not exist when the event arrived
        assert!(!parts.clamp.is_active());
        assert!(rig.logged("Initial Vol: 8"));
    }

    #[test]
    fn test_safe_target_with_baseline_enforces() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        parts.report(&rig, Some(SAFE));

        rig.audio.inject(13);
        let outcome = parts.report(&rig, Some(SAFE));

        assert_eq!(outcome, Arbitration::SafeTargetActive);
        assert_eq!(rig.audio.level(), 8);
        assert!(parts.clamp.is_active());
        assert!(rig.logged("Enforcing Vol: 8"));
    }

    #[test]
    fn test_hijacker_is_repelled() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        parts.report(&rig, Some(SAFE));

        rig.clock.advance(Duration::from_secs(3));
        let outcome = parts.report(&rig, Some(HIJACKER));

        assert_eq!(
            outcome,
            Arbitration::Hijacked {
                switch: Some(SwitchOutcome::Switched)
            }
        );
        let state = parts.arbitrator.state();
        assert!(!state.is_safe_device_active);
        assert_eq!(state.last_hijack_at, Some(rig.ports.now()));
        assert_eq!(rig.switcher.calls(), vec![SAFE.to_string()]);
        assert!(parts.clamp.is_active());
        assert!(rig.logged("Hijack detected"));
        assert!(rig.logged("Switched audio to safe target"));
    }

    #[test]
    fn test_hijack_with_safe_target_disconnected() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        rig.switcher.set_connected(false);

        let outcome = parts.report(&rig, Some(HIJACKER));

        assert_eq!(
            outcome,
            Arbitration::Hijacked {
                switch: Some(SwitchOutcome::NotConnected)
            }
        );
        assert!(rig.logged("not connected"));
        assert!(parts.arbitrator.state().last_hijack_at.is_some());
    }

    #[test]
    fn test_switch_failure_is_contained() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        rig.switcher.set_failing(true);

        let outcome = parts.report(&rig, Some(HIJACKER));

        assert_eq!(outcome, Arbitration::Hijacked { switch: None });
        assert!(rig.logged("Switch failed"));
    }

    #[test]
    fn test_other_endpoint_is_only_observed() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        parts.report(&rig, Some(SAFE));

        let outcome = parts.report(&rig, Some("headset"));

        assert_eq!(outcome, Arbitration::Observed("headset".to_string()));
        assert!(!parts.arbitrator.state().is_safe_device_active);
        assert!(rig.switcher.calls().is_empty());
        assert!(rig.logged("Active: headset (Not safe target)"));
    }

    #[test]
    fn test_no_endpoint_clears_safe_flag() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        parts.report(&rig, Some(SAFE));
        let before = rig.log.len();

        assert_eq!(parts.report(&rig, None), Arbitration::NoEndpoint);
        assert!(!parts.arbitrator.state().is_safe_device_active);
        assert_eq!(rig.log.len(), before);
    }

    #[test]
    fn test_unconfigured_pair_touches_nothing() {
        let rig = Rig::new(8);
        rig.config.replace(PairConfig::new(HIJACKER, ""));
        let mut parts = parts(&rig);

        for id in [Some(SAFE), Some(HIJACKER), Some("other"), None] {
            assert_eq!(parts.report(&rig, id), Arbitration::Unconfigured);
        }

        assert!(rig.switcher.calls().is_empty());
        assert!(rig.audio.sets().is_empty());
        assert_eq!(rig.audio.reads(), 0);
        assert!(rig.logged("SETUP REQUIRED"));
        assert_eq!(*parts.arbitrator.state(), ArbitrationState::default());
    }

    #[test]
    fn test_config_is_reloaded_per_event() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);

        rig.config.replace(PairConfig::new(HIJACKER, "new-dac"));
        assert_eq!(parts.report(&rig, Some(SAFE)), Arbitration::Observed(SAFE.to_string()));
        assert_eq!(parts.report(&rig, Some("new-dac")), Arbitration::SafeTargetActive);
    }

    #[test]
    fn test_force_safe_target_enforces_after_switch() {
        let rig = Rig::new(8);
        let mut parts = parts(&rig);
        parts.report(&rig, Some(SAFE));
        rig.audio.inject(11);

        let outcome = parts.arbitrator.force_safe_target(
            &mut parts.safeguard,
            &mut parts.clamp,
            &rig.ports,
        );

        assert_eq!(outcome, Some(SwitchOutcome::Switched));
        assert_eq!(rig.audio.level(), 8);
    }
}
