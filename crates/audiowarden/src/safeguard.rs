//! Volume safeguard for the safe target.
//!
//! Holds the trusted baseline volume and decides, for every observed level,
//! whether it is a hijack-induced spike, a manual change, or noise. Spike
//! suspicion is tied to how recently a hijack happened: the same jump is
//! adversarial seconds after a hijack and legitimate an hour later.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::arbitrator::ArbitrationState;
use crate::clamp::{ClampLoop, ClampTick};
use crate::ports::Ports;

/// How an observed volume level was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeVerdict {
    /// Safe target not active; observation dropped.
    Ignored,
    /// First observation, adopted as the baseline.
    Adopted(i32),
    /// Same as the baseline.
    Unchanged,
    /// Accepted as a user change; the baseline moved.
    Manual { from: i32, to: i32 },
    /// Rejected as a hijack spike; the baseline stays.
    Spike { baseline: i32, observed: i32 },
    /// Clamp session running; the loop is the only corrector.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct VolumeSafeguard {
    baseline: Option<i32>,
    danger_window: Duration,
    spike_threshold: i32,
}

impl VolumeSafeguard {
    pub fn new(danger_window: Duration, spike_threshold: i32) -> Self {
        Self {
            baseline: None,
            danger_window,
            spike_threshold,
        }
    }

    pub fn baseline(&self) -> Option<i32> {
        self.baseline
    }

    /// True when `now` is inside the danger window of the last hijack.
    pub fn in_danger_window(&self, last_hijack_at: Option<Instant>, now: Instant) -> bool {
        last_hijack_at
            .is_some_and(|hijack| now.saturating_duration_since(hijack) < self.danger_window)
    }

    /// Spike rule: recent hijack and a jump of more than the threshold.
    pub fn is_spike(&self, observed: i32, last_hijack_at: Option<Instant>, now: Instant) -> bool {
        let Some(baseline) = self.baseline else {
            return false;
        };
        self.in_danger_window(last_hijack_at, now)
            && observed.saturating_sub(baseline) > self.spike_threshold
    }

    /// Handle a volume level reported by the platform.
    pub fn on_volume_observed(
        &mut self,
        current: i32,
        arbitration: &ArbitrationState,
        clamp: &mut ClampLoop,
        ports: &Ports,
    ) -> VolumeVerdict {
        if !arbitration.is_safe_device_active {
            debug!("volume {} observed off the safe target, ignoring", current);
            return VolumeVerdict::Ignored;
        }

        let Some(baseline) = self.baseline else {
            return match self.adopt(current, ports) {
                Some(level) => VolumeVerdict::Adopted(level),
                None => VolumeVerdict::Ignored,
            };
        };

        if self.is_spike(current, arbitration.last_hijack_at, ports.now()) {
            if clamp.is_active() {
                ports.note(format!(
                    "🛡️ BLOCKED Spike: {} -> {}. Clamp extended.",
                    baseline, current
                ));
                clamp.start(Some(baseline), ports);
                if let ClampTick::Failed = clamp.tick(Some(baseline), ports) {
                    ports.alert(format!("❌ Could not revert spike to {}", baseline));
                }
            } else {
                ports.note(format!(
                    "🛡️ BLOCKED Spike: {} -> {}. Reverting & Clamping...",
                    baseline, current
                ));
                clamp.start(Some(baseline), ports);
                if let Err(e) = ports.audio.set_volume(baseline) {
                    ports.alert(format!("❌ Could not revert spike to {}: {}", baseline, e));
                }
            }
            return VolumeVerdict::Spike {
                baseline,
                observed: current,
            };
        }

        if clamp.is_active() {
            debug!("volume {} observed during clamp, deferring to clamp loop", current);
            return VolumeVerdict::Deferred;
        }

        if current == baseline {
            return VolumeVerdict::Unchanged;
        }

        match self.adopt(current, ports) {
            Some(level) => {
                ports.note(format!("🔊 Probably manual change: {} -> {}", baseline, level));
                VolumeVerdict::Manual {
                    from: baseline,
                    to: level,
                }
            }
            None => VolumeVerdict::Unchanged,
        }
    }

    /// Adopt the current platform volume as the baseline.
    pub fn learn(&mut self, ports: &Ports) -> Option<i32> {
        match ports.audio.volume() {
            Ok(level) => self.adopt(level, ports),
            Err(e) => {
                ports.alert(format!("❌ Could not read volume: {}", e));
                None
            }
        }
    }

    /// Re-apply the baseline if the platform volume moved away from it.
    ///
    /// A volume pinned at the platform maximum while the baseline is below it
    /// is the hijacker's signature, so it also starts or extends a clamp.
    /// Returns whether a revert was issued.
    pub fn enforce(&mut self, clamp: &mut ClampLoop, ports: &Ports) -> bool {
        let Some(baseline) = self.baseline else {
            return false;
        };

        let current = match ports.audio.volume() {
            Ok(level) => level,
            Err(e) => {
                ports.alert(format!("❌ Could not read volume: {}", e));
                return false;
            }
        };
        if current == baseline {
            return false;
        }

        match ports.audio.max_volume() {
            Ok(max) if current == max && baseline != max => {
                ports.note("👮 Gotcha! Volume spike (MAX) detected. Fixing...");
                clamp.start(Some(baseline), ports);
            }
            Ok(_) => {}
            Err(e) => debug!("max volume unavailable: {}", e),
        }

        match ports.audio.set_volume(baseline) {
            Ok(()) => true,
            Err(e) => {
                ports.alert(format!("❌ Could not restore volume {}: {}", baseline, e));
                false
            }
        }
    }

    /// Store `level` as the baseline, held inside `[0, max]`.
    fn adopt(&mut self, level: i32, ports: &Ports) -> Option<i32> {
        let max = match ports.audio.max_volume() {
            Ok(max) => max.max(0),
            Err(e) => {
                ports.alert(format!("❌ Could not read max volume: {}", e));
                return None;
            }
        };
        let level = level.clamp(0, max);
        self.baseline = Some(level);
        Some(level)
    }
}
