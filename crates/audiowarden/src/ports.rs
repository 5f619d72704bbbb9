//! Interfaces to the collaborators the enforcement core depends on.
//!
//! The core never talks to the platform directly. Everything it needs -
//! configuration, volume control, endpoint switching, event streams, the
//! user-facing log and the clock - comes in through these traits.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{info, warn};
use wardenconf::{ConfigError, PairConfig};

use crate::error::PlatformResult;

/// Source of the endpoint pair, re-read on every endpoint-change event.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<PairConfig, ConfigError>;
}

/// Volume primitives of the active output.
pub trait AudioControl: Send + Sync {
    fn volume(&self) -> PlatformResult<i32>;
    fn set_volume(&self, level: i32) -> PlatformResult<()>;
    fn max_volume(&self) -> PlatformResult<i32>;
}

/// Result of asking the platform to activate an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The target is not currently connected. Expected, not an error.
    NotConnected,
}

/// Forces a specific endpoint to become the active output.
pub trait EndpointSwitch: Send + Sync {
    fn force_active(&self, target_id: &str) -> PlatformResult<SwitchOutcome>;
}

/// Handler for active-endpoint changes. `None` means no endpoint was reported.
pub type EndpointHandler = Box<dyn Fn(Option<String>) + Send + Sync>;

/// Handler for observed volume levels.
pub type VolumeHandler = Box<dyn Fn(i32) + Send + Sync>;

/// Stream of active-endpoint-change events.
pub trait EndpointEvents: Send + Sync {
    fn subscribe(&self, handler: EndpointHandler) -> PlatformResult<Subscription>;
}

/// Stream of volume-change events.
pub trait VolumeEvents: Send + Sync {
    fn subscribe(&self, handler: VolumeHandler) -> PlatformResult<Subscription>;
}

/// Append-only user-facing log. Fire-and-forget.
pub trait LogSink: Send + Sync {
    fn append(&self, timestamp: DateTime<Local>, message: String);
}

/// Time source. Monotonic for decisions, wall clock for log stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn wall_time(&self) -> DateTime<Local>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Live event subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The collaborators the state machine calls while handling an event.
#[derive(Clone)]
pub struct Ports {
    pub audio: Arc<dyn AudioControl>,
    pub switcher: Arc<dyn EndpointSwitch>,
    pub log: Arc<dyn LogSink>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    /// Record a user-facing event, mirrored to tracing.
    pub fn note(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.log.append(self.clock.wall_time(), message);
    }

    /// Record a user-facing problem, mirrored to tracing as a warning.
    pub fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.log.append(self.clock.wall_time(), message);
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}
