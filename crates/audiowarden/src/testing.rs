//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use wardenconf::{ConfigError, PairConfig};

use crate::error::{PlatformError, PlatformResult};
use crate::journal::LogBuffer;
use crate::ports::{AudioControl, Clock, ConfigStore, EndpointSwitch, Ports, SwitchOutcome};

pub const HIJACKER: &str = "00:11:22:33:44:55";
pub const SAFE: &str = "AA:BB:CC:DD:EE:FF";

pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    fn wall_time(&self) -> DateTime<Local> {
        Local::now()
    }
}

pub struct FakeAudio {
    volume: Mutex<i32>,
    max: i32,
    sets: Mutex<Vec<i32>>,
    reads: Mutex<usize>,
    failing: AtomicBool,
}

impl FakeAudio {
    pub fn new(volume: i32, max: i32) -> Self {
        Self {
            volume: Mutex::new(volume),
            max,
            sets: Mutex::new(Vec::new()),
            reads: Mutex::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Change the level as if something outside the daemon did it.
    pub fn inject(&self, level: i32) {
        *self.volume.lock().unwrap() = level;
    }

    pub fn level(&self) -> i32 {
        *self.volume.lock().unwrap()
    }

    pub fn sets(&self) -> Vec<i32> {
        self.sets.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> PlatformResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PlatformError::PermissionDenied("volume control".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AudioControl for FakeAudio {
    fn volume(&self) -> PlatformResult<i32> {
        self.check()?;
        *self.reads.lock().unwrap() += 1;
        Ok(self.level())
    }

    fn set_volume(&self, level: i32) -> PlatformResult<()> {
        self.check()?;
        self.sets.lock().unwrap().push(level);
        self.inject(level);
        Ok(())
    }

    fn max_volume(&self) -> PlatformResult<i32> {
        self.check()?;
        Ok(self.max)
    }
}

pub struct FakeSwitch {
    calls: Mutex<Vec<String>>,
    connected: AtomicBool,
    failing: AtomicBool,
}

impl FakeSwitch {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EndpointSwitch for FakeSwitch {
    fn force_active(&self, target_id: &str) -> PlatformResult<SwitchOutcome> {
        self.calls.lock().unwrap().push(target_id.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("a2dp proxy gone".to_string()));
        }
        if self.connected.load(Ordering::SeqCst) {
            Ok(SwitchOutcome::Switched)
        } else {
            Ok(SwitchOutcome::NotConnected)
        }
    }
}

pub struct StaticConfig {
    pair: Mutex<PairConfig>,
}

impl StaticConfig {
    pub fn new(pair: PairConfig) -> Self {
        Self {
            pair: Mutex::new(pair),
        }
    }

    pub fn replace(&self, pair: PairConfig) {
        *self.pair.lock().unwrap() = pair;
    }
}

impl ConfigStore for StaticConfig {
    fn load(&self) -> Result<PairConfig, ConfigError> {
        Ok(self.pair.lock().unwrap().clone())
    }
}

/// Everything a unit test needs to drive the state machine and inspect it.
pub struct Rig {
    pub audio: Arc<FakeAudio>,
    pub switcher: Arc<FakeSwitch>,
    pub log: Arc<LogBuffer>,
    pub clock: Arc<ManualClock>,
    pub config: Arc<StaticConfig>,
    pub ports: Ports,
}

impl Rig {
    pub fn new(volume: i32) -> Self {
        let audio = Arc::new(FakeAudio::new(volume, 15));
        let switcher = Arc::new(FakeSwitch::new());
        let log = Arc::new(LogBuffer::new(64 * 1024));
        let clock = Arc::new(ManualClock::new());
        let config = Arc::new(StaticConfig::new(PairConfig::new(HIJACKER, SAFE)));
        let ports = Ports {
            audio: audio.clone(),
            switcher: switcher.clone(),
            log: log.clone(),
            clock: clock.clone(),
        };
        Self {
            audio,
            switcher,
            log,
            clock,
            config,
            ports,
        }
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.log.entries().iter().any(|e| e.message.contains(needle))
    }
}
