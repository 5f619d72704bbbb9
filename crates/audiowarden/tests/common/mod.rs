//! Shared fake platform for daemon integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audiowarden::{
    AudioControl, Collaborators, ConfigStore, EndpointEvents, EndpointHandler, EndpointSwitch,
    LogBuffer, PlatformError, PlatformResult, Subscription, SwitchOutcome, SystemClock,
    VolumeEvents, VolumeHandler,
};
use wardenconf::{ConfigError, EnforcementConfig, PairConfig};

pub const HIJACKER: &str = "00:11:22:33:44:55";
pub const SAFE: &str = "AA:BB:CC:DD:EE:FF";

/// One object standing in for every platform collaborator.
pub struct FakePlatform {
    volume: Mutex<i32>,
    max: i32,
    sets: Mutex<Vec<i32>>,
    switches: Mutex<Vec<String>>,
    pair: Mutex<PairConfig>,
    endpoint_handler: Arc<Mutex<Option<EndpointHandler>>>,
    volume_handler: Arc<Mutex<Option<VolumeHandler>>>,
    unsubscribed: Arc<AtomicUsize>,
    volume_events_broken: AtomicBool,
}

impl FakePlatform {
    pub fn new(volume: i32, pair: PairConfig) -> Arc<Self> {
        Arc::new(Self {
            volume: Mutex::new(volume),
            max: 15,
            sets: Mutex::new(Vec::new()),
            switches: Mutex::new(Vec::new()),
            pair: Mutex::new(pair),
            endpoint_handler: Arc::new(Mutex::new(None)),
            volume_handler: Arc::new(Mutex::new(None)),
            unsubscribed: Arc::new(AtomicUsize::new(0)),
            volume_events_broken: AtomicBool::new(false),
        })
    }

    pub fn configured(volume: i32) -> Arc<Self> {
        Self::new(volume, PairConfig::new(HIJACKER, SAFE))
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            config: self.clone(),
            audio: self.clone(),
            switcher: self.clone(),
            endpoint_events: self.clone(),
            volume_events: self.clone(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn break_volume_events(&self) {
        self.volume_events_broken.store(true, Ordering::SeqCst);
    }

    /// Change the level without going through the daemon.
    pub fn inject(&self, level: i32) {
        *self.volume.lock().unwrap() = level;
    }

    pub fn level(&self) -> i32 {
        *self.volume.lock().unwrap()
    }

    pub fn sets(&self) -> Vec<i32> {
        self.sets.lock().unwrap().clone()
    }

    pub fn switches(&self) -> Vec<String> {
        self.switches.lock().unwrap().clone()
    }

    pub fn unsubscribed(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    pub fn has_endpoint_subscriber(&self) -> bool {
        self.endpoint_handler.lock().unwrap().is_some()
    }

    pub fn emit_endpoint(&self, id: Option<&str>) {
        if let Some(handler) = self.endpoint_handler.lock().unwrap().as_ref() {
            handler(id.map(str::to_string));
        }
    }

    pub fn emit_volume(&self, level: i32) {
        if let Some(handler) = self.volume_handler.lock().unwrap().as_ref() {
            handler(level);
        }
    }
}

impl ConfigStore for FakePlatform {
    fn load(&self) -> Result<PairConfig, ConfigError> {
        Ok(self.pair.lock().unwrap().clone())
    }
}

impl AudioControl for FakePlatform {
    fn volume(&self) -> PlatformResult<i32> {
        Ok(self.level())
    }

    fn set_volume(&self, level: i32) -> PlatformResult<()> {
        self.sets.lock().unwrap().push(level);
        self.inject(level);
        Ok(())
    }

    fn max_volume(&self) -> PlatformResult<i32> {
        Ok(self.max)
    }
}

impl EndpointSwitch for FakePlatform {
    fn force_active(&self, target_id: &str) -> PlatformResult<SwitchOutcome> {
        self.switches.lock().unwrap().push(target_id.to_string());
        Ok(SwitchOutcome::Switched)
    }
}

impl EndpointEvents for FakePlatform {
    fn subscribe(&self, handler: EndpointHandler) -> PlatformResult<Subscription> {
        *self.endpoint_handler.lock().unwrap() = Some(handler);
        let slot = self.endpoint_handler.clone();
        let unsubscribed = self.unsubscribed.clone();
        Ok(Subscription::new(move || {
            slot.lock().unwrap().take();
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

impl VolumeEvents for FakePlatform {
    fn subscribe(&self, handler: VolumeHandler) -> PlatformResult<Subscription> {
        if self.volume_events_broken.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("no volume stream".to_string()));
        }
        *self.volume_handler.lock().unwrap() = Some(handler);
        let slot = self.volume_handler.clone();
        let unsubscribed = self.unsubscribed.clone();
        Ok(Subscription::new(move || {
            slot.lock().unwrap().take();
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Defaults with the spike threshold in the fake's 15-step unit.
pub fn tuning() -> EnforcementConfig {
    EnforcementConfig {
        spike_threshold: 3,
        ..EnforcementConfig::default()
    }
}

/// Short clamp so expiry is observable in tests.
pub fn fast_tuning() -> EnforcementConfig {
    EnforcementConfig {
        clamp_duration_ms: 300,
        ..tuning()
    }
}

pub fn log_has(log: &LogBuffer, needle: &str) -> bool {
    log.entries().iter().any(|e| e.message.contains(needle))
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
