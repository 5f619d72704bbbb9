//! EnforcementDaemon - wires the event streams to the enforcement core
//!
//! One tokio task owns the [`Enforcer`] and serializes everything onto it:
//! - endpoint and volume events, pushed by the platform handlers onto a queue
//! - clamp ticks, from an interval armed only while a session runs
//! - clamp expiry, from a sleep on the session deadline
//! - shutdown, from a cancellation token

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wardenconf::EnforcementConfig;

use crate::engine::{Enforcer, WardenEvent};
use crate::journal::{LogBuffer, LogEntry};
use crate::ports::{
    AudioControl, Clock, ConfigStore, EndpointEvents, EndpointSwitch, Ports, Subscription,
    VolumeEvents,
};

/// Sleep target used while no clamp session is running. The branch is
/// disabled then, but its future is still built every iteration.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Everything the daemon needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigStore>,
    pub audio: Arc<dyn AudioControl>,
    pub switcher: Arc<dyn EndpointSwitch>,
    pub endpoint_events: Arc<dyn EndpointEvents>,
    pub volume_events: Arc<dyn VolumeEvents>,
    pub clock: Arc<dyn Clock>,
}

pub struct EnforcementDaemon;

impl EnforcementDaemon {
    /// Subscribe to both event streams and spawn the event loop.
    ///
    /// Must be called from within a tokio runtime. A stream that cannot be
    /// subscribed is logged and the daemon runs without it.
    pub fn start(
        collaborators: Collaborators,
        tuning: EnforcementConfig,
        log: Arc<LogBuffer>,
    ) -> DaemonHandle {
        let ports = Ports {
            audio: collaborators.audio.clone(),
            switcher: collaborators.switcher.clone(),
            log: log.clone(),
            clock: collaborators.clock.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscriptions = Vec::with_capacity(2);

        let endpoint_tx = tx.clone();
        match collaborators.endpoint_events.subscribe(Box::new(move |id| {
            let _ = endpoint_tx.send(WardenEvent::EndpointChanged(id));
        })) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(e) => ports.alert(format!("❌ Endpoint events unavailable: {}", e)),
        }

        let volume_tx = tx;
        match collaborators.volume_events.subscribe(Box::new(move |level| {
            let _ = volume_tx.send(WardenEvent::VolumeChanged(level));
        })) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(e) => ports.alert(format!("❌ Volume events unavailable: {}", e)),
        }

        let enforcer = Enforcer::new(collaborators.config, &tuning, ports);
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_loop(enforcer, rx, cancel.clone()));

        info!("enforcement daemon started");
        DaemonHandle {
            running,
            cancel,
            task: Some(task),
            subscriptions,
            log,
        }
    }
}

async fn run_loop(
    mut enforcer: Enforcer,
    mut events: mpsc::UnboundedReceiver<WardenEvent>,
    cancel: CancellationToken,
) {
    if enforcer.announce() {
        enforcer.force_safe_target();
    }

    let mut ticker = tokio::time::interval(enforcer.clamp_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let deadline = enforcer.clamp_deadline();
        let clamping = deadline.is_some();
        let wake = deadline
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + IDLE_WAKE);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                break;
            }
            Some(event) = events.recv() => {
                enforcer.handle(event);
            }
            _ = tokio::time::sleep_until(wake), if clamping => {
                enforcer.expire_clamp();
            }
            _ = ticker.tick(), if clamping => {
                enforcer.clamp_tick();
            }
        }
    }

    enforcer.shutdown();
    enforcer.ports().note("Stopped.");
}

/// Handle to a running daemon.
pub struct DaemonHandle {
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    subscriptions: Vec<Subscription>,
    log: Arc<LogBuffer>,
}

impl DaemonHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared flag for a presence/notification collaborator.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn log(&self) -> &Arc<LogBuffer> {
        &self.log
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log.subscribe()
    }

    /// Cancel the loop, wait for it, then unsubscribe from both streams.
    /// Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("event loop ended abnormally: {}", e);
            }
        }
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        if self.running.swap(false, Ordering::SeqCst) {
            info!("enforcement daemon stopped");
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.running.store(false, Ordering::SeqCst);
    }
}
