//! The enforcement state machine as a single serialized unit.
//!
//! [`Enforcer`] owns the arbitration state, the safeguard and the clamp
//! session. Every input (endpoint change, volume change, clamp tick) goes
//! through `&mut self`, so handlers never interleave.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use wardenconf::EnforcementConfig;

use crate::arbitrator::{Arbitration, ArbitrationState, DeviceArbitrator};
use crate::clamp::{ClampLoop, ClampTick};
use crate::ports::{ConfigStore, Ports, SwitchOutcome};
use crate::safeguard::{VolumeSafeguard, VolumeVerdict};

/// An input from the platform event streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WardenEvent {
    EndpointChanged(Option<String>),
    VolumeChanged(i32),
}

/// Result of handling one [`WardenEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Endpoint(Arbitration),
    Volume(VolumeVerdict),
}

pub struct Enforcer {
    arbitrator: DeviceArbitrator,
    safeguard: VolumeSafeguard,
    clamp: ClampLoop,
    ports: Ports,
}

impl Enforcer {
    pub fn new(config: Arc<dyn ConfigStore>, tuning: &EnforcementConfig, ports: Ports) -> Self {
        Self {
            arbitrator: DeviceArbitrator::new(config),
            safeguard: VolumeSafeguard::new(tuning.danger_window(), tuning.spike_threshold),
            clamp: ClampLoop::new(tuning.clamp_duration(), tuning.clamp_interval()),
            ports,
        }
    }

    pub fn state(&self) -> &ArbitrationState {
        self.arbitrator.state()
    }

    pub fn baseline(&self) -> Option<i32> {
        self.safeguard.baseline()
    }

    pub fn is_clamping(&self) -> bool {
        self.clamp.is_active()
    }

    pub fn clamp_deadline(&self) -> Option<Instant> {
        self.clamp.deadline()
    }

    pub fn clamp_interval(&self) -> Duration {
        self.clamp.interval()
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn handle(&mut self, event: WardenEvent) -> Handled {
        debug!(?event, "handling event");
        match event {
            WardenEvent::EndpointChanged(id) => Handled::Endpoint(
                self.arbitrator.on_active_endpoint_changed(
                    id.as_deref(),
                    &mut self.safeguard,
                    &mut self.clamp,
                    &self.ports,
                ),
            ),
            WardenEvent::VolumeChanged(level) => Handled::Volume(self.safeguard.on_volume_observed(
                level,
                self.arbitrator.state(),
                &mut self.clamp,
                &self.ports,
            )),
        }
    }

    pub fn clamp_tick(&mut self) -> ClampTick {
        self.clamp.tick(self.safeguard.baseline(), &self.ports)
    }

    pub fn expire_clamp(&mut self) -> bool {
        self.clamp.expire(&self.ports)
    }

    /// Log the startup banner. Returns whether the pair is usable.
    pub fn announce(&self) -> bool {
        match self.arbitrator.load_pair(&self.ports) {
            Some(pair) => {
                self.ports.note(format!(
                    "Started. Block: {} -> Target: {}",
                    pair.hijacker, pair.safe_target
                ));
                true
            }
            None => false,
        }
    }

    pub fn force_safe_target(&mut self) -> Option<SwitchOutcome> {
        self.arbitrator
            .force_safe_target(&mut self.safeguard, &mut self.clamp, &self.ports)
    }

    /// Cancel any running clamp session.
    pub fn shutdown(&mut self) {
        if self.clamp.stop() {
            debug!("clamp session cancelled on shutdown");
        }
    }
}
