//! PulseAudio adapter driven through `pactl`.
//!
//! Works against PulseAudio and PipeWire's pulse server alike. Bluetooth sinks
//! are named `bluez_output.AA_BB_CC_DD_EE_FF.1`; they are reported by device
//! address so the configured pair can hold plain addresses.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::runtime::RuntimeFlavor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wardenconf::PulseConfig;

use crate::error::{PlatformError, PlatformResult};
use crate::ports::{
    AudioControl, EndpointEvents, EndpointHandler, EndpointSwitch, Subscription, SwitchOutcome,
    VolumeEvents, VolumeHandler,
};

const DEFAULT_SINK: &str = "@DEFAULT_SINK@";
const BLUEZ_PREFIXES: [&str; 2] = ["bluez_output.", "bluez_sink."];
const RESPAWN_BACKOFF_MIN: Duration = Duration::from_millis(250);
const RESPAWN_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// One row of `pactl list short sinks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRow {
    pub index: u32,
    pub name: String,
    pub state: String,
}

/// What a `pactl subscribe` line is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseEvent {
    /// Server properties changed, including the default sink.
    Server,
    /// A sink changed, appeared or went away.
    Sink,
}

/// First percentage in `pactl get-sink-volume` output.
pub fn parse_volume_percent(output: &str) -> PlatformResult<i32> {
    output
        .split_whitespace()
        .find_map(|word| word.strip_suffix('%')?.parse::<i32>().ok())
        .ok_or_else(|| PlatformError::Parse(format!("no volume in {:?}", output.trim())))
}

pub fn parse_short_sinks(output: &str) -> Vec<SinkRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let index = cols.next()?.trim().parse().ok()?;
            let name = cols.next()?.trim().to_string();
            let state = cols.nth(2).unwrap_or("").trim().to_string();
            Some(SinkRow { index, name, state })
        })
        .collect()
}

/// Parse one `pactl subscribe` line, e.g. `Event 'change' on sink #52`.
pub fn parse_event_line(line: &str) -> Option<PulseEvent> {
    let rest = line.trim().strip_prefix("Event '")?;
    let (_kind, rest) = rest.split_once("' on ")?;
    let facility = rest.split_whitespace().next()?;
    match facility {
        "server" => Some(PulseEvent::Server),
        "sink" => Some(PulseEvent::Sink),
        _ => None,
    }
}

/// Identifier reported for a sink: the device address for Bluetooth sinks,
/// the sink name otherwise.
pub fn endpoint_id(sink_name: &str) -> String {
    BLUEZ_PREFIXES
        .iter()
        .find_map(|prefix| sink_name.strip_prefix(prefix))
        .and_then(|rest| rest.split('.').next())
        .map(|address| address.replace('_', ":"))
        .unwrap_or_else(|| sink_name.to_string())
}

/// Whether `sink_name` is the endpoint called `target`, ignoring case.
pub fn sink_matches(sink_name: &str, target: &str) -> bool {
    let target = target.trim();
    !target.is_empty()
        && (sink_name.eq_ignore_ascii_case(target)
            || endpoint_id(sink_name).eq_ignore_ascii_case(target))
}

/// Volume and switching primitives over `pactl`.
#[derive(Debug, Clone)]
pub struct Pactl {
    binary: String,
    max_volume: i32,
}

impl Pactl {
    pub fn new(config: &PulseConfig) -> Self {
        Self {
            binary: config.pactl.clone(),
            max_volume: config.max_volume,
        }
    }

    fn run(&self, args: &[&str]) -> PlatformResult<String> {
        let output = off_worker(|| {
            std::process::Command::new(&self.binary)
                .args(args)
                .stdin(Stdio::null())
                .output()
        })?;
        finish(&self.binary, args, output)
    }

    async fn run_async(&self, args: &[&str]) -> PlatformResult<String> {
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        finish(&self.binary, args, output)
    }

    pub fn sinks(&self) -> PlatformResult<Vec<SinkRow>> {
        self.run(&["list", "short", "sinks"])
            .map(|out| parse_short_sinks(&out))
    }

    async fn default_endpoint(&self) -> PlatformResult<Option<String>> {
        let name = self.run_async(&["get-default-sink"]).await?;
        let name = name.trim();
        Ok((!name.is_empty()).then(|| endpoint_id(name)))
    }

    async fn default_volume(&self) -> PlatformResult<i32> {
        let out = self.run_async(&["get-sink-volume", DEFAULT_SINK]).await?;
        parse_volume_percent(&out)
    }
}

/// Run a blocking call without stalling the async worker it was issued from.
///
/// On the multi-threaded runtime the current task moves to a blocking thread
/// via `block_in_place`, so the caller still sees a plain synchronous call and
/// event order is kept. Elsewhere the call runs inline.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn finish(binary: &str, args: &[&str], output: std::process::Output) -> PlatformResult<String> {
    let command = format!("{} {}", binary, args.join(" "));
    if output.status.success() {
        return String::from_utf8(output.stdout)
            .map_err(|e| PlatformError::Parse(format!("{}: {}", command, e)));
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("Access denied") {
        Err(PlatformError::PermissionDenied(command))
    } else if stderr.contains("Connection refused") || stderr.contains("Connection failure") {
        Err(PlatformError::Unavailable(stderr))
    } else {
        Err(PlatformError::CommandFailed {
            command,
            message: stderr,
        })
    }
}

impl AudioControl for Pactl {
    fn volume(&self) -> PlatformResult<i32> {
        let out = self.run(&["get-sink-volume", DEFAULT_SINK])?;
        parse_volume_percent(&out)
    }

    fn set_volume(&self, level: i32) -> PlatformResult<()> {
        let percent = format!("{}%", level.clamp(0, self.max_volume));
        self.run(&["set-sink-volume", DEFAULT_SINK, &percent])?;
        Ok(())
    }

    fn max_volume(&self) -> PlatformResult<i32> {
        Ok(self.max_volume)
    }
}

impl EndpointSwitch for Pactl {
    fn force_active(&self, target_id: &str) -> PlatformResult<SwitchOutcome> {
        let Some(sink) = self
            .sinks()?
            .into_iter()
            .find(|sink| sink_matches(&sink.name, target_id))
        else {
            return Ok(SwitchOutcome::NotConnected);
        };

        self.run(&["set-default-sink", &sink.name])?;
        debug!("default sink set to {}", sink.name);
        Ok(SwitchOutcome::Switched)
    }
}

/// Event sources backed by a `pactl subscribe` child per subscription.
#[derive(Debug, Clone)]
pub struct PactlEvents {
    pactl: Arc<Pactl>,
}

impl PactlEvents {
    pub fn new(pactl: Arc<Pactl>) -> Self {
        Self { pactl }
    }

    /// Run `pactl subscribe` and call `on_event` for every relevant line
    /// until the returned subscription is dropped. A child that exits (for
    /// example on a sound server restart) is respawned with backoff.
    fn watch<F, Fut>(&self, on_event: F) -> PlatformResult<Subscription>
    where
        F: Fn(Arc<Pactl>, PulseEvent) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::runtime::Handle::try_current()
            .map_err(|e| PlatformError::Unavailable(format!("no async runtime: {}", e)))?;

        // The first spawn fails the subscription; later ones are retried
        let first = spawn_subscriber(&self.pactl.binary)?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let pactl = self.pactl.clone();

        tokio::spawn(async move {
            let mut next = Some(first);
            let mut backoff = RESPAWN_BACKOFF_MIN;

            loop {
                let spawned = match next.take() {
                    Some(spawned) => Ok(spawned),
                    None => spawn_subscriber(&pactl.binary),
                };

                match spawned {
                    Ok((child, stdout)) => {
                        let mut lines = BufReader::new(stdout).lines();
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                line = lines.next_line() => match line {
                                    Ok(Some(line)) => {
                                        backoff = RESPAWN_BACKOFF_MIN;
                                        if let Some(event) = parse_event_line(&line) {
                                            on_event(pactl.clone(), event).await;
                                        }
                                    }
                                    Ok(None) => {
                                        warn!("pactl subscribe exited, restarting in {:?}", backoff);
                                        break;
                                    }
                                    Err(e) => {
                                        warn!("pactl subscribe read failed: {}, restarting in {:?}", e, backoff);
                                        break;
                                    }
                                }
                            }
                        }
                        // kill_on_drop reaps the child
                        drop(child);
                    }
                    Err(e) => warn!("pactl subscribe respawn failed: {}, retrying in {:?}", e, backoff),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(RESPAWN_BACKOFF_MAX);
            }
            debug!("pactl subscribe watcher stopped");
        });

        Ok(Subscription::new(move || cancel.cancel()))
    }
}

fn spawn_subscriber(binary: &str) -> PlatformResult<(Child, ChildStdout)> {
    let mut child = tokio::process::Command::new(binary)
        .arg("subscribe")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PlatformError::Unavailable("pactl subscribe has no stdout".into()))?;
    Ok((child, stdout))
}

impl EndpointEvents for PactlEvents {
    fn subscribe(&self, handler: EndpointHandler) -> PlatformResult<Subscription> {
        let handler = Arc::new(handler);
        let last = Arc::new(Mutex::new(None::<Option<String>>));

        self.watch(move |pactl, event| {
            let handler = handler.clone();
            let last = last.clone();
            async move {
                if event != PulseEvent::Server {
                    return;
                }
                let endpoint = match pactl.default_endpoint().await {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        debug!("default sink query failed: {}", e);
                        return;
                    }
                };
                {
                    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                    if last.as_ref() == Some(&endpoint) {
                        return;
                    }
                    *last = Some(endpoint.clone());
                }
                handler(endpoint);
            }
        })
    }
}

impl VolumeEvents for PactlEvents {
    fn subscribe(&self, handler: VolumeHandler) -> PlatformResult<Subscription> {
        let handler = Arc::new(handler);
        let last = Arc::new(Mutex::new(None::<i32>));

        self.watch(move |pactl, event| {
            let handler = handler.clone();
            let last = last.clone();
            async move {
                if event != PulseEvent::Sink {
                    return;
                }
                let level = match pactl.default_volume().await {
                    Ok(level) => level,
                    Err(e) => {
                        debug!("volume query failed: {}", e);
                        return;
                    }
                };
                {
                    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                    if *last == Some(level) {
                        return;
                    }
                    *last = Some(level);
                }
                handler(level);
            }
        })
    }
}
