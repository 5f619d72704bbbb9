//! Audiowarden: Audio Endpoint Arbitration Daemon
//!
//! Keeps a chosen output device (the safe target) active and its volume
//! stable while a competing device (the hijacker) tries to grab audio focus
//! and push the volume to maximum.
//!
//! - **DeviceArbitrator**: classifies endpoint changes, forces the safe target back
//! - **VolumeSafeguard**: trusted baseline, spike detection inside the danger window
//! - **ClampLoop**: bounded period of repeated volume correction
//! - **EnforcementDaemon**: serializes platform events onto one task
//!
//! The platform is reached only through the traits in [`ports`]; [`pulse`]
//! implements them over `pactl`.

pub mod arbitrator;
pub mod clamp;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod journal;
pub mod ports;
pub mod pulse;
pub mod safeguard;
pub mod store;

#[cfg(test)]
mod testing;

pub use arbitrator::{classify, Arbitration, ArbitrationState, DeviceArbitrator, EndpointClass};
pub use clamp::{ClampLoop, ClampStart, ClampTick};
pub use daemon::{Collaborators, DaemonHandle, EnforcementDaemon};
pub use engine::{Enforcer, Handled, WardenEvent};
pub use error::{PlatformError, PlatformResult};
pub use journal::{LogBuffer, LogEntry};
pub use ports::{
    AudioControl, Clock, ConfigStore, EndpointEvents, EndpointHandler, EndpointSwitch, LogSink,
    Ports, Subscription, SwitchOutcome, SystemClock, VolumeEvents, VolumeHandler,
};
pub use pulse::{Pactl, PactlEvents};
pub use safeguard::{VolumeSafeguard, VolumeVerdict};
pub use store::FileConfigStore;
