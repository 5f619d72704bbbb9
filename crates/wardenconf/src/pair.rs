//! The endpoint pair - which output is fought and which one is protected.

use serde::{Deserialize, Serialize};

/// Identifiers of the two arbitrated endpoints.
///
/// Both default to empty, which is the "setup required" state: the daemon
/// keeps running but takes no corrective action until both are filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    /// Endpoint that seizes audio focus unexpectedly (e.g. a car head unit).
    #[serde(default)]
    pub hijacker: String,

    /// Endpoint the user wants active; its volume is protected.
    #[serde(default)]
    pub safe_target: String,
}

impl PairConfig {
    pub fn new(hijacker: impl Into<String>, safe_target: impl Into<String>) -> Self {
        Self {
            hijacker: hijacker.into(),
            safe_target: safe_target.into(),
        }
    }

    /// True when both identifiers are present.
    pub fn is_configured(&self) -> bool {
        !self.hijacker.trim().is_empty() && !self.safe_target.trim().is_empty()
    }
}
