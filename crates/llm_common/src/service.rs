//! Managed service identities and observed states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of services the daemon manages.
///
/// Names are matched exactly; the set never changes while the daemon runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    /// NLLB translation service
    Nllb,
    /// Ollama summarization service
    Ollama,
}

impl ServiceName {
    pub const ALL: [ServiceName; 2] = [ServiceName::Nllb, ServiceName::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Nllb => "nllb",
            ServiceName::Ollama => "ollama",
        }
    }

    /// Human-readable description used in logs and CLI output
    pub fn description(&self) -> &'static str {
        match self {
            ServiceName::Nllb => "NLLB Translation",
            ServiceName::Ollama => "Ollama Summarization",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name is outside the managed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid service: {0}")]
pub struct UnknownService(pub String);

impl FromStr for ServiceName {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownService(s.to_string()))
    }
}

/// Observed state of a service after reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Running,
    /// Not yet reconciled since daemon start
    #[default]
    Unknown,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A lifecycle operation that mutates a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOp {
    Start,
    Stop,
    Restart,
}

impl LifecycleOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOp::Start => "start",
            LifecycleOp::Stop => "stop",
            LifecycleOp::Restart => "restart",
        }
    }

    /// Transient phase name reported while the operation is in flight
    pub fn phase(&self) -> &'static str {
        match self {
            LifecycleOp::Start => "starting",
            LifecycleOp::Stop => "stopping",
            LifecycleOp::Restart => "restarting",
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
