//! Bounded volume clamp.
//!
//! A clamp session hammers the volume back to the baseline on every tick
//! until its deadline passes. Triggers while a session is running push the
//! deadline out instead of restarting it, so sustained contention keeps the
//! defence up continuously.
//!
//! The loop owns no timer. The daemon's event loop reads [`ClampLoop::deadline`]
//! and [`ClampLoop::interval`] to schedule [`ClampLoop::tick`] and
//! [`ClampLoop::expire`], which keeps ticks on the same queue as events.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::ports::Ports;

/// What a call to [`ClampLoop::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampStart {
    /// No baseline learned yet, nothing to clamp to.
    Skipped,
    Started,
    Extended,
}

/// What one clamp tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampTick {
    /// No session running.
    Idle,
    /// The deadline passed; the session is over.
    Expired,
    /// Volume already at the baseline.
    Holding,
    Corrected { from: i32, to: i32 },
    /// The volume primitive failed; retried on the next tick.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ClampLoop {
    duration: Duration,
    interval: Duration,
    deadline: Option<Instant>,
}

impl ClampLoop {
    pub fn new(duration: Duration, interval: Duration) -> Self {
        Self {
            duration,
            interval,
            deadline: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether a session covers `now`. False at and after the deadline.
    #[cfg(test)]
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start a session, or extend the running one to `now + duration`.
    pub fn start(&mut self, baseline: Option<i32>, ports: &Ports) -> ClampStart {
        if baseline.is_none() {
            debug!("clamp requested without a baseline, skipping");
            return ClampStart::Skipped;
        }

        let Some(extended_to) = ports.now().checked_add(self.duration) else {
            ports.alert(format!("❌ Clamp duration {:?} is out of range", self.duration));
            return ClampStart::Skipped;
        };
        match self.deadline {
            Some(current) => {
                self.deadline = Some(current.max(extended_to));
                ports.note("🛡️ Clamping continued.");
                ClampStart::Extended
            }
            None => {
                self.deadline = Some(extended_to);
                ports.note("🛡️ Clamping started.");
                ClampStart::Started
            }
        }
    }

    /// Cancel the session immediately. Returns whether one was running.
    pub fn stop(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// End the session if its deadline has passed.
    pub fn expire(&mut self, ports: &Ports) -> bool {
        match self.deadline {
            Some(deadline) if ports.now() >= deadline => {
                self.deadline = None;
                ports.note("🛡️ Clamping finished.");
                true
            }
            _ => false,
        }
    }

    /// One correction pass: force the volume back to `baseline` if it drifted.
    pub fn tick(&mut self, baseline: Option<i32>, ports: &Ports) -> ClampTick {
        if self.deadline.is_none() {
            return ClampTick::Idle;
        }
        if self.expire(ports) {
            return ClampTick::Expired;
        }
        let Some(target) = baseline else {
            return ClampTick::Holding;
        };

        let current = match ports.audio.volume() {
            Ok(level) => level,
            Err(e) => {
                debug!("clamp tick could not read volume: {}", e);
                return ClampTick::Failed;
            }
        };
        if current == target {
            return ClampTick::Holding;
        }

        ports.note(format!("🔨 CLAMP HIT: Detected {}. Forcing {}.", current, target));
        match ports.audio.set_volume(target) {
            Ok(()) => ClampTick::Corrected {
                from: current,
                to: target,
            },
            Err(e) => {
                debug!("clamp tick could not set volume: {}", e);
                ClampTick::Failed
            }
        }
    }
}
