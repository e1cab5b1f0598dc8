//! HTTP payloads exchanged between llmd and its clients.

use crate::service::{LifecycleOp, ServiceName, ServiceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Status
// ============================================================================

/// Reconciled view of one service, as returned by the status routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: ServiceState,
    pub pid: Option<u32>,
    pub healthy: bool,
    pub port: u16,
    pub endpoint: String,
    /// Lifecycle operation in flight when the status was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<LifecycleOp>,
}

/// Response for `GET /services/status`, keyed by service name
pub type ServicesStatusResponse = BTreeMap<ServiceName, ServiceStatus>;

/// Last-known registry entry, served without reconciling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub status: ServiceState,
    pub pid: Option<u32>,
    pub last_transition: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<LifecycleOp>,
}

/// Response for `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub services: BTreeMap<ServiceName, ServiceSnapshot>,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Successful start/stop/restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub success: bool,
    pub message: String,
    pub service: ServiceName,
    pub status: ServiceState,
    pub pid: Option<u32>,
    pub healthy: bool,
    pub port: u16,
    pub endpoint: String,
    #[serde(default)]
    pub stdout: String,
}

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    StartScriptError,
    StopScriptError,
    StartTimeoutError,
    StopIncompleteError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::StartScriptError => "start_script_error",
            ErrorKind::StopScriptError => "stop_script_error",
            ErrorKind::StartTimeoutError => "start_timeout_error",
            ErrorKind::StopIncompleteError => "stop_incomplete_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// Body of every 4xx/5xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}
